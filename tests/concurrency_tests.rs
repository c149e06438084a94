//! Concurrency guarantees: per-domain advisory locking for foreground
//! operations and lock-skipping in the reconciliation scheduler.

mod common;

use chrono::{Duration, Utc};
use common::{harness, host, provisioned_domain};
use registrar_core::config::{ReconciliationConfig, RetryConfig};
use registrar_core::domain::model::PendingOperation;
use registrar_core::domain::store::DomainStore;
use registrar_core::errors::LifecycleError;
use registrar_core::reconcile::scheduler::ReconciliationScheduler;
use registrar_core::registry::mock::InjectedFailure;

#[tokio::test(start_paused = true)]
async fn concurrent_nameserver_changes_apply_exactly_once() {
    let h = harness();
    provisioned_domain(&h, "city.gov").await;

    // The first operation stalls inside its registry exchange, holding the
    // domain lock across the await point.
    h.registry
        .inject_failure_for("domain-update", InjectedFailure::Delay(200));

    let first = h.engine.set_nameservers(
        "city.gov",
        vec![host("ns1.example.net"), host("ns2.example.net")],
    );
    let second = h.engine.set_nameservers(
        "city.gov",
        vec![host("ns3.example.net"), host("ns4.example.net")],
    );

    let (first, second) = tokio::join!(first, second);

    // Exactly one applied change and one concurrency rejection.
    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(LifecycleError::Concurrency { .. })
    ));

    let remote = h.registry.domain("city.gov").unwrap();
    let mut nameservers = remote.nameservers.clone();
    nameservers.sort();
    assert_eq!(
        nameservers,
        vec!["ns1.example.net".to_string(), "ns2.example.net".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn operations_on_different_domains_do_not_contend() {
    let h = harness();
    provisioned_domain(&h, "alpha.gov").await;
    provisioned_domain(&h, "beta.gov").await;

    h.registry
        .inject_failure_for("domain-update", InjectedFailure::Delay(200));

    let first = h.engine.set_nameservers(
        "alpha.gov",
        vec![host("ns1.example.net"), host("ns2.example.net")],
    );
    let second = h.engine.set_nameservers(
        "beta.gov",
        vec![host("ns1.example.net"), host("ns2.example.net")],
    );

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert!(second.is_ok());
}

#[tokio::test(start_paused = true)]
async fn concurrent_delete_and_nameserver_change_never_interleave() {
    let h = harness();
    provisioned_domain(&h, "city.gov").await;

    h.registry
        .inject_failure_for("domain-delete", InjectedFailure::Delay(200));

    let delete = h.engine.delete("city.gov");
    let update = h.engine.set_nameservers(
        "city.gov",
        vec![host("ns1.example.net"), host("ns2.example.net")],
    );

    let (delete, update) = tokio::join!(delete, update);
    assert!(delete.is_ok());
    assert!(matches!(update, Err(LifecycleError::Concurrency { .. })));
    assert!(h.registry.domain("city.gov").is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduler_skips_domains_held_by_foreground_operations() {
    let h = harness();
    provisioned_domain(&h, "city.gov").await;

    // Leave a due retry on the books, then hold the domain's lock with a
    // slow foreground operation while a pass runs.
    let mut domain = h.store.get("city.gov").await.unwrap();
    domain.sync.pending = Some(PendingOperation::Renew { years: 1 });
    domain.sync.next_retry_at = Some(Utc::now() - Duration::seconds(1));
    h.store.update(domain).await.unwrap();

    let scheduler = ReconciliationScheduler::new(
        h.engine.clone(),
        h.store.clone(),
        ReconciliationConfig {
            interval_seconds: 300,
            max_items_per_run: 50,
            expiring_window_days: 30,
            retry: RetryConfig {
                max_attempts: 8,
                base_delay_ms: 0,
                max_delay_ms: 0,
                jitter: false,
            },
        },
    );

    h.registry
        .inject_failure_for("domain-update", InjectedFailure::Delay(500));
    let foreground = h.engine.set_nameservers(
        "city.gov",
        vec![host("ns1.example.net"), host("ns2.example.net")],
    );
    let pass = scheduler.run_once();

    let (foreground, pass) = tokio::join!(foreground, pass);
    assert!(foreground.is_ok());
    let report = pass.unwrap();
    // The pass skipped the held domain instead of blocking on it.
    assert!(report.skipped_locked >= 1);
}

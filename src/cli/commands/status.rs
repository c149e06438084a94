use anyhow::Result;

use crate::config::RegistrarConfig;

pub struct StatusCommand;

impl StatusCommand {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, config: &RegistrarConfig) -> Result<()> {
        println!("REGISTRAR STATUS");
        println!("================");
        println!();
        println!("Registry endpoint:   {}:{}", config.registry.host, config.registry.port);
        println!("Client id:           {}", config.registry.client_id);
        println!(
            "Credentials:         password {}, client certificate {}",
            if config.registry.password.is_some() { "set" } else { "MISSING" },
            config.registry.tls.certificate_path,
        );
        println!(
            "Reconciliation:      every {}s, max {} items/pass, expiring window {} days",
            config.reconciliation.interval_seconds,
            config.reconciliation.max_items_per_run,
            config.reconciliation.expiring_window_days,
        );
        println!(
            "Retry backoff:       base {}ms, cap {}ms, {} attempts{}",
            config.reconciliation.retry.base_delay_ms,
            config.reconciliation.retry.max_delay_ms,
            config.reconciliation.retry.max_attempts,
            if config.reconciliation.retry.jitter { ", jittered" } else { "" },
        );
        println!();

        print!("Registry session:    ");
        match super::build_client(config) {
            Ok(client) => match client.keepalive().await {
                Ok(server_id) => {
                    println!("✅ connected ({server_id})");
                    client.logout().await.ok();
                }
                Err(err) => println!("❌ {err}"),
            },
            Err(err) => println!("❌ {err}"),
        }
        Ok(())
    }
}

impl Default for StatusCommand {
    fn default() -> Self {
        Self::new()
    }
}

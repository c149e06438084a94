use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the registrar core
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrarConfig {
    /// Registry connection and session settings
    pub registry: RegistryConfig,
    /// Reconciliation scheduler settings
    pub reconciliation: ReconciliationConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Registry hostname
    pub host: String,
    /// Registry TLS port
    pub port: u16,
    /// Registrar client identifier used at login and for sponsorship checks
    pub client_id: String,
    /// Login password (can be set via env var)
    pub password: Option<String>,
    /// TLS client credential settings
    pub tls: TlsSettings,
    /// Per-command timeout in seconds
    pub command_timeout_seconds: u64,
    /// How long a caller waits for the shared session before giving up
    pub session_acquire_timeout_seconds: u64,
    /// Default registration period for new domains, in years
    pub default_period_years: u8,
    /// Command pacing settings
    pub rate_limit: RateLimitConfig,
    /// TTL for cached availability (check) responses, in seconds
    pub check_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Path to the PEM-encoded client certificate chain
    pub certificate_path: String,
    /// Path to the PEM-encoded private key (may be encrypted)
    pub private_key_path: String,
    /// Passphrase for an encrypted private key (set via env var)
    pub key_passphrase: Option<String>,
    /// Path to the registry-supplied CA bundle used to verify the server
    pub ca_certificate_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained commands per second issued to the registry
    pub commands_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    /// Seconds between scheduler passes
    pub interval_seconds: u64,
    /// Maximum domains examined per pass
    pub max_items_per_run: u32,
    /// Days before expiration at which domain.expiring is emitted
    pub expiring_window_days: i64,
    /// Retry backoff for transiently failed registry operations
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts before a domain is parked for operator attention
    pub max_attempts: u32,
    /// Base delay in milliseconds
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Apply full jitter to computed delays
    pub jitter: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Enable tracing output
    pub tracing_enabled: bool,
    /// OTLP endpoint for traces (if different from stdout)
    pub otlp_endpoint: Option<String>,
    /// Log level
    pub log_level: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 500,
            max_delay_ms: 900_000, // 15 minutes
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig {
                host: "epp.registry.example".to_string(),
                port: 700,
                client_id: "govreg".to_string(),
                password: None, // Read from REGISTRAR_REGISTRY_PASSWORD
                tls: TlsSettings {
                    certificate_path: ".registrar/credentials/client.crt".to_string(),
                    private_key_path: ".registrar/credentials/client.key".to_string(),
                    key_passphrase: None,
                    ca_certificate_path: ".registrar/credentials/registry-ca.pem".to_string(),
                },
                command_timeout_seconds: 30,
                session_acquire_timeout_seconds: 60,
                default_period_years: 1,
                rate_limit: RateLimitConfig {
                    commands_per_second: 5,
                    burst_capacity: 10,
                },
                check_cache_ttl_seconds: 30,
            },
            reconciliation: ReconciliationConfig {
                interval_seconds: 300,
                max_items_per_run: 50,
                expiring_window_days: 30,
                retry: RetryConfig::default(),
            },
            observability: ObservabilityConfig {
                tracing_enabled: true,
                otlp_endpoint: None, // Defaults to stdout
                log_level: "info".to_string(),
            },
        }
    }
}

impl RegistrarConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (registrar.toml)
    /// 3. Environment variables (prefixed with REGISTRAR_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("registrar.toml").exists() {
            builder = builder.add_source(File::with_name("registrar"));
        }

        builder = builder.add_source(
            Environment::with_prefix("REGISTRAR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;

        let mut registrar_config: RegistrarConfig = Config::builder()
            .add_source(config::Config::try_from(&RegistrarConfig::default())?)
            .add_source(config)
            .build()?
            .try_deserialize()?;

        // Credentials come from the environment, never from the config file
        if registrar_config.registry.password.is_none() {
            if let Ok(password) = std::env::var("REGISTRAR_REGISTRY_PASSWORD") {
                registrar_config.registry.password = Some(password);
            }
        }
        if registrar_config.registry.tls.key_passphrase.is_none() {
            if let Ok(passphrase) = std::env::var("REGISTRAR_KEY_PASSPHRASE") {
                registrar_config.registry.tls.key_passphrase = Some(passphrase);
            }
        }

        Ok(registrar_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Strip secrets before anything touches disk
        let mut scrubbed = self.clone();
        scrubbed.registry.password = None;
        scrubbed.registry.tls.key_passphrase = None;
        let toml_content = toml::to_string_pretty(&scrubbed)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

use anyhow::Result;

use crate::config::RegistrarConfig;
use crate::registry::client::RegistryOps;

pub struct CheckCommand {
    pub domain: String,
}

impl CheckCommand {
    pub fn new(domain: String) -> Self {
        Self { domain }
    }

    pub async fn execute(&self, config: &RegistrarConfig) -> Result<()> {
        let name: crate::domain::model::DomainName = self.domain.parse()?;
        let client = super::build_client(config)?;

        let result = client.check_domain(name.as_str()).await?;
        if result.available {
            println!("✅ {} is available", result.name);
        } else {
            println!(
                "❌ {} is not available{}",
                result.name,
                result
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Domain lifecycle core for the .gov registrar")]
#[command(long_about = "Runs the domain lifecycle service: registry provisioning, \
                       nameserver and DNSSEC management, and the reconciliation \
                       scheduler that repairs divergence from the registry. Start \
                       with 'registrar serve' or probe the registry with \
                       'registrar check <domain>'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the lifecycle service: reconciliation scheduler plus session keepalive
    Serve {
        /// Run exactly one reconciliation pass and exit
        #[arg(long, help = "Run a single reconciliation pass instead of the service loop")]
        once: bool,
    },
    /// Ask the registry whether a domain is available
    Check {
        /// Fully-qualified domain name to check
        domain: String,
    },
    /// Show configuration and registry session health
    Status,
}

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tipster", about = "Autonomous multi-agent prediction-market trading engine")]
pub struct Cli {
    /// Optional configuration file (TOML); env vars override it
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server plus the periodic order monitor
    Serve {
        /// Port override for the API server
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one full daily cycle and exit
    RunCycle,
    /// Run one order-monitor pass and exit
    MonitorOrders,
    /// Create the five firm portfolios if they are absent
    InitPortfolios,
    /// Run reconciliation against the venue and exit
    Reconcile,
}

use clap::Parser;
use tipster::api::{self, ApiState};
use tipster::cli::{Cli, Commands};
use tipster::engine::cycle::initialize_portfolios;
use tipster::engine::monitor::{FirmReviser, OrderMonitor};
use tipster::engine::{CycleRunner, Reconciler};
use tipster::error::Result;
use tipster::{AppConfig, AppContext};

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("fatal: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = AppContext::bootstrap(config).await?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(ctx, port).await,
        Commands::RunCycle => {
            ctx.venue.enable_trading().await?;
            let record = CycleRunner::new(ctx).run().await?;
            info!(
                "cycle finished: {} (executed {} / approved {})",
                record.status, record.bets_executed, record.bets_approved
            );
            Ok(())
        }
        Commands::MonitorOrders => {
            ctx.venue.enable_trading().await?;
            let monitor = build_monitor(&ctx);
            let report = monitor.run_pass(Utc::now()).await?;
            info!(
                "monitor finished: reviewed={} cancelled={}",
                report.reviewed, report.cancelled
            );
            Ok(())
        }
        Commands::InitPortfolios => {
            let created = initialize_portfolios(&ctx).await?;
            info!("portfolios ready ({} created)", created);
            Ok(())
        }
        Commands::Reconcile => {
            let report = Reconciler::new(&ctx.store, ctx.venue.as_ref(), ctx.config.venue.fee_rate)
                .run()
                .await?;
            info!(
                "reconcile finished: fills={} resolutions={}",
                report.fills_applied, report.resolutions_applied
            );
            Ok(())
        }
    }
}

async fn serve(ctx: Arc<AppContext>, port: Option<u16>) -> Result<()> {
    // trading must be enabled once before any order flow; failure is fatal
    ctx.venue.enable_trading().await?;

    initialize_portfolios(&ctx).await?;

    let secret = &ctx.config.server.monitor_secret;
    if secret.is_empty() {
        warn!("ORDER_MONITOR_SECRET not set; /admin/monitor-orders is disabled");
    } else {
        info!(
            "monitor endpoint armed (secret fingerprint {})",
            tipster::api::auth::secret_fingerprint(secret)
        );
    }

    // periodic order-monitor pass alongside the API server
    let monitor = Arc::new(build_monitor(&ctx));
    let interval_secs = ctx.config.monitor.interval_secs;
    tokio::spawn({
        let monitor = monitor.clone();
        async move {
            let mut tick =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs.max(60)));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(err) = monitor.run_pass(Utc::now()).await {
                    warn!("periodic monitor pass failed: {}", err);
                }
            }
        }
    });

    let port = port.unwrap_or(ctx.config.server.port);
    api::serve(ApiState::new(ctx), port).await
}

fn build_monitor(ctx: &Arc<AppContext>) -> OrderMonitor {
    let reviser = FirmReviser {
        venue: ctx.venue.clone(),
        assembler: ctx.assembler.clone(),
        models: ctx.models.clone(),
        firms: ctx.firms.clone(),
    };
    OrderMonitor::new(
        ctx.store.clone(),
        ctx.venue.clone(),
        Some(Arc::new(reviser)),
        ctx.config.monitor.clone(),
    )
}

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use nodeup::config::{Args, NodeConfig};
use nodeup::{logging, phase};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(&args.log_format, &args.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        build_date = env!("BUILD_DATE"),
        "Starting node bootstrap"
    );

    if let Err(e) = run(&args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Bootstrap complete");
}

async fn run(args: &Args) -> Result<()> {
    let mut cfg = NodeConfig::from_args(args);
    cfg.validate()?;
    cfg.display();

    phase::run_all(&mut cfg, args.strict).await
}

use std::path::PathBuf;
use std::process;

use clap::Parser;
use monji_broker::{BrokerConfig, CliOverrides};

#[derive(Parser)]
#[command(name = "monji-broker", version, about = "Grant-checked access to shared database connections")]
struct BrokerArgs {
    /// Config file (TOML or JSON)
    #[arg(long, env = "MONJI_CONFIG")]
    config: Option<PathBuf>,
    /// Override bind address
    #[arg(long)]
    bind: Option<String>,
    /// Override database url (`memory` for the in-process store)
    #[arg(long)]
    database_url: Option<String>,
    /// Print the resolved configuration before starting
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("broker exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = BrokerArgs::parse();
    monji_broker::telemetry::init()?;

    let overrides = CliOverrides {
        config_path: args.config,
        bind_address: args.bind,
        database_url: args.database_url,
    };
    let config = BrokerConfig::resolve(&overrides)?;
    if args.verbose {
        println!("config loaded: {config:?}");
    }

    monji_broker::run(config).await
}

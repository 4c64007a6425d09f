use apirunner::app::App;
use apirunner::config::{EngineConfig, StoreKind};
use apirunner::server::RpcServer;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apirunner")]
#[command(about = "Dynamic endpoint execution engine over stdio JSON-RPC", version)]
struct Cli {
    /// Record store backend: memory or sqlite
    #[arg(long)]
    store: Option<String>,
    /// SQLite database file
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Key file for credential encryption
    #[arg(long)]
    key_path: Option<PathBuf>,
    /// OpenAI-compatible base URL for parameter and insight generation
    #[arg(long)]
    llm_base_url: Option<String>,
    #[arg(long)]
    default_model: Option<String>,
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(store) = self.store {
            config.store = StoreKind::parse(&store);
        }
        if let Some(path) = self.db_path {
            config.db_path = path;
        }
        if let Some(path) = self.key_path {
            config.key_path = path;
        }
        if let Some(url) = self.llm_base_url {
            config.llm_base_url = Some(url);
        }
        if let Some(model) = self.default_model {
            config.default_model_key = model;
        }
        if let Some(level) = self.log_level {
            config.log_level = Some(level);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let config = Cli::parse().apply(EngineConfig::from_env());
    let app = match App::initialize(config) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("apirunner: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = RpcServer::new(app.engine.clone()).run_stdio().await {
        eprintln!("apirunner: {}", err);
        std::process::exit(1);
    }
}

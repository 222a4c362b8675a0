use std::path::Path;

use devstack::StackConfig;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<StackConfig> {
    match std::env::args().nth(1) {
        Some(path) => StackConfig::load(Path::new(&path)),
        None => {
            let default_path = Path::new("devstack.toml");
            if default_path.exists() {
                StackConfig::load(default_path)
            } else {
                Ok(StackConfig::default())
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("devstack: {e}");
            std::process::exit(2);
        }
    };

    let code = devstack::launcher::run(config).await;
    std::process::exit(code);
}

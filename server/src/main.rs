use log::{error, info};
use server::config::RelayConfig;
use server::error::ConfigError;
use server::network::RelayServer;
use server::relay::SupervisorPolicy;
use std::process;

/// Main-method of the relay.
/// Parses command-line arguments, then runs the relay until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            eprint!("{}", RelayConfig::usage());
            process::exit(1);
        }
        Err(ConfigError::Arguments(e)) => {
            eprint!("{}", e);
            eprintln!("use --help to display available options");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("use --help to display available options");
            process::exit(1);
        }
    };

    let policy = SupervisorPolicy::from_flag(config.immortal);
    if policy == SupervisorPolicy::Immortal {
        eprintln!(
            "immortal mode - exceptions will be ignored (use during critical performances, not during development/practice)"
        );
    }
    policy.install_panic_hook();

    let server = RelayServer::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("relay server stopped: {}", e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

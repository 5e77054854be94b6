use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use moula_server::config::MoulaConfig;
use moula_server::error::Result;
use moula_server::server::{run_server, ServerState};
use moula_server::utils::{global_metrics, init_logging, init_metrics};
use tracing::{error, info};

/// Server for the MOULa-family legacy game protocol.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file; MOULA_* variables override it. Without one,
    /// settings come from the environment alone.
    config: Option<PathBuf>,
    /// Print an example configuration and exit
    #[arg(long)]
    example_config: bool,
}

fn load_config(args: &Args) -> Result<MoulaConfig> {
    match &args.config {
        Some(path) => {
            let mut config = MoulaConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => MoulaConfig::from_env(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.example_config {
        println!("{}", MoulaConfig::example_config());
        return Ok(());
    }

    let config = load_config(&args)?;
    let log = init_logging(&config.logging)?;
    config.validate_strict()?;
    init_metrics();

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let state = Arc::new(ServerState::new(config)?.with_log_handle(log));

    let outcome = runtime.block_on(run_server(state));
    global_metrics().log_metrics();

    match outcome {
        Ok(address) => {
            info!(address = %address, "Server stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_path_is_positional() {
        let args = Args::try_parse_from(["moula-server", "shard.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("shard.toml")));
        assert!(!args.example_config);
    }

    #[test]
    fn test_example_config_flag() {
        let args = Args::try_parse_from(["moula-server", "--example-config"]).unwrap();
        assert!(args.example_config);
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_environment_only() {
        let args = Args::try_parse_from(["moula-server"]).unwrap();
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Args::try_parse_from(["moula-server", "--port", "14617"]).is_err());
        assert!(Args::try_parse_from(["moula-server", "a.toml", "b.toml"]).is_err());
    }
}

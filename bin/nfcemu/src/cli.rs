use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Scripted contactless card emulator")]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.nfcemu/nfcemu.toml)
    #[arg(short, long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Trace level output
    #[arg(short, long)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the local command server and, if configured, the remote client
    Serve {
        /// Port for the local command server, overriding the config
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,

        /// Remote controller as HOST:PORT, overriding the config
        #[arg(short, long, value_name = "HOST:PORT")]
        remote: Option<String>,

        /// Remote polling interval in milliseconds
        #[arg(short, long, value_name = "MS")]
        interval: Option<u64>,
    },

    /// Feed hex APDUs from stdin to the emulated card
    Shell,
}

/// Split `HOST:PORT`, keeping bracketed IPv6 hosts intact
pub(crate) fn parse_remote(remote: &str) -> eyre::Result<(String, u16)> {
    let (host, port) = remote
        .rsplit_once(':')
        .ok_or_else(|| eyre::eyre!("expected HOST:PORT, got {remote}"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        eyre::bail!("missing host in {remote}");
    }
    Ok((host.to_string(), port.parse()?))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["nfcemu", "-v", "serve", "--port", "9000", "-r", "10.0.0.2:81"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Serve { port, remote, interval } => {
                assert_eq!(port, Some(9000));
                assert_eq!(remote.as_deref(), Some("10.0.0.2:81"));
                assert_eq!(interval, None);
            }
            Commands::Shell => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_remote() {
        assert_eq!(parse_remote("10.0.0.2:8081").unwrap(), ("10.0.0.2".to_string(), 8081));
        assert_eq!(parse_remote("[::1]:80").unwrap(), ("::1".to_string(), 80));
        assert!(parse_remote("10.0.0.2").is_err());
        assert!(parse_remote(":80").is_err());
        assert!(parse_remote("host:http").is_err());
    }
}

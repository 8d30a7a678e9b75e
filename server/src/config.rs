//! Command-line configuration for the relay server

use crate::auth::Secret;
use crate::error::ConfigError;
use clap::{ArgAction, CommandFactory, Parser};
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_TCP_PORT: u16 = 8002;
pub const DEFAULT_STATIC_DIR: &str = "Estuary.jsexe";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Raw command-line arguments
///
/// `--help` is declared by hand: the relay prints usage to stderr and exits
/// with status 1 rather than clap's default behavior.
#[derive(Parser, Debug)]
#[command(
    name = "estuary",
    author,
    about = "Real-time collaboration relay with a shared tempo grid",
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Args {
    /// Password to authenticate messages to the server (required)
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// TCP port for plain HTTP and WebSocket connections
    #[arg(short = 't', long = "tcp-port", default_value_t = DEFAULT_TCP_PORT)]
    pub tcp_port: u16,

    /// For use in performance with tested code (exceptions are logged and ignored)
    #[arg(short = 'i', long)]
    pub immortal: bool,

    /// This help message
    #[arg(short = 'h', long, action = ArgAction::SetTrue)]
    pub help: bool,

    /// Address to bind to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Directory of static front-end assets served to plain HTTP requests
    #[arg(long, default_value = DEFAULT_STATIC_DIR)]
    pub static_dir: PathBuf,

    /// Frames buffered per client before broadcasts to it are dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

/// Validated server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub secret: Secret,
    pub listen_addr: SocketAddr,
    pub immortal: bool,
    pub static_dir: PathBuf,
    pub queue_capacity: usize,
}

impl RelayConfig {
    /// Configuration with defaults for everything but the secret and address
    pub fn new(secret: Secret, listen_addr: SocketAddr) -> Self {
        Self {
            secret,
            listen_addr,
            immortal: false,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Parses and validates the process arguments
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse_from(std::env::args_os())
    }

    pub fn parse_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args)?;
        if args.help {
            return Err(ConfigError::HelpRequested);
        }
        Self::from_args(args)
    }

    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let password = args.password.ok_or(ConfigError::MissingPassword)?;
        if password == "true" {
            return Err(ConfigError::PasswordIsTrue);
        }
        if password.starts_with('-') {
            return Err(ConfigError::PasswordStartsWithDash);
        }
        if args.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        Ok(Self {
            secret: Secret::new(password),
            listen_addr: SocketAddr::new(args.host, args.tcp_port),
            immortal: args.immortal,
            static_dir: args.static_dir,
            queue_capacity: args.queue_capacity,
        })
    }

    /// Usage text printed for `--help`
    pub fn usage() -> String {
        Args::command().render_help().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RelayConfig, ConfigError> {
        RelayConfig::parse_from(std::iter::once("estuary").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--password", "secret"]).unwrap();
        assert_eq!(config.secret, Secret::new("secret"));
        assert_eq!(config.listen_addr, "0.0.0.0:8002".parse().unwrap());
        assert!(!config.immortal);
        assert_eq!(config.static_dir, PathBuf::from("Estuary.jsexe"));
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn test_short_flags() {
        let config = parse(&["-p", "secret", "-t", "9000", "-i"]).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert!(config.immortal);
    }

    #[test]
    fn test_host_and_static_dir() {
        let config = parse(&[
            "-p",
            "secret",
            "--host",
            "127.0.0.1",
            "--static-dir",
            "/srv/estuary",
            "--queue-capacity",
            "8",
        ])
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8002".parse().unwrap());
        assert_eq!(config.static_dir, PathBuf::from("/srv/estuary"));
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_missing_password() {
        assert!(matches!(parse(&[]), Err(ConfigError::MissingPassword)));
    }

    #[test]
    fn test_password_true_is_rejected() {
        assert!(matches!(
            parse(&["-p", "true"]),
            Err(ConfigError::PasswordIsTrue)
        ));
    }

    #[test]
    fn test_password_with_dash_is_rejected() {
        assert!(matches!(
            parse(&["--password=-oops"]),
            Err(ConfigError::PasswordStartsWithDash)
        ));
        assert!(matches!(
            parse(&["-p", "-t"]),
            Err(ConfigError::Arguments(_))
        ));
    }

    #[test]
    fn test_help_flag() {
        assert!(matches!(parse(&["-h"]), Err(ConfigError::HelpRequested)));
        assert!(matches!(
            parse(&["--help", "-p", "secret"]),
            Err(ConfigError::HelpRequested)
        ));
    }

    #[test]
    fn test_no_version_flag() {
        for flag in ["--version", "-V"] {
            match parse(&["-p", "secret", flag]) {
                Err(ConfigError::Arguments(e)) => {
                    assert_eq!(e.kind(), clap::error::ErrorKind::UnknownArgument)
                }
                other => panic!("expected an argument error for {}, got {:?}", flag, other),
            }
        }
    }

    #[test]
    fn test_bad_port() {
        assert!(matches!(
            parse(&["-p", "secret", "-t", "eighty"]),
            Err(ConfigError::Arguments(_))
        ));
    }

    #[test]
    fn test_zero_queue_capacity() {
        assert!(matches!(
            parse(&["-p", "secret", "--queue-capacity", "0"]),
            Err(ConfigError::ZeroQueueCapacity)
        ));
    }

    #[test]
    fn test_usage_mentions_options() {
        let usage = RelayConfig::usage();
        assert!(usage.contains("--password"));
        assert!(usage.contains("--tcp-port"));
        assert!(usage.contains("--immortal"));
        assert!(usage.contains("--help"));
    }
}

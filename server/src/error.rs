use crate::session_registry::SessionId;
use thiserror::Error;

/// Failures inside the running relay. None of these stop the server.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to encode broadcast payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("outbound queue of {0} is full")]
    QueueFull(SessionId),
    #[error("{0} no longer accepts frames")]
    SessionClosed(SessionId),
    #[error("relay event loop has stopped")]
    EventLoopClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Startup configuration problems; the binary exits with status 1 on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--password option is not optional!")]
    MissingPassword,
    #[error("--password option is not optional (nor can it be the text 'true')!")]
    PasswordIsTrue,
    #[error("--password cannot begin with a dash (to avoid confusion with other options)")]
    PasswordStartsWithDash,
    #[error("--queue-capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("{0}")]
    Arguments(#[from] clap::Error),
    #[error("help requested")]
    HelpRequested,
}

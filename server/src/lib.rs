//! # Estuary Relay Server
//!
//! This library implements a real-time collaboration relay. Clients (code
//! editors and a tempo-aware performance tool) connect over WebSocket,
//! send password-authenticated messages, and the server rebroadcasts every
//! accepted message to all connected clients. The server also owns a single
//! tempo grid, a shared mapping from wall-clock time to beats, that clients
//! use to stay rhythmically in sync.
//!
//! ## Architecture
//!
//! ### Single Relay Event Loop
//! Connection tasks forward what happens on their sockets (connect, frame,
//! close) to one event-loop task over a channel. That task owns the session
//! registry and the tempo clock and handles each event to completion before
//! taking the next, so no locking is needed and a tempo change is never
//! observed half-applied.
//!
//! ### Fire-and-Forget Broadcast
//! Every session has a bounded outbound queue drained by its own writer
//! task. A broadcast serializes the payload once and hands it to each queue
//! without waiting, so a slow or broken client never delays the others.
//!
//! ### Silent Rejection
//! Malformed frames, unknown tags and wrong passwords are logged and
//! dropped. Nothing is sent back to the client that sent them.
//!
//! ## Module Organization
//!
//! - `auth`: shared-secret check
//! - `broadcast`: serialize-once, per-recipient delivery
//! - `config`: command-line options and validation
//! - `error`: relay and startup error types
//! - `network`: axum transport (WebSocket sessions and static assets)
//! - `relay`: the event loop and its supervisor policy
//! - `router`: decode, authenticate and dispatch one inbound frame
//! - `session_registry`: live sessions and their outbound queues
//! - `tempo_clock`: owner of the tempo grid
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::Secret;
//! use server::config::RelayConfig;
//! use server::network::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::new(Secret::new("secret"), "0.0.0.0:8002".parse()?);
//!     let server = RelayServer::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod network;
pub mod relay;
pub mod router;
pub mod session_registry;
pub mod tempo_clock;
pub mod utils;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::{json, Value};
use shared::encode_inbound;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Sends at most one message to a running relay and prints every broadcast
/// received while listening.
#[derive(Parser, Debug)]
#[command(author, version, about = "Diagnostic client for the estuary relay", long_about = None)]
struct Args {
    /// Relay WebSocket URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8002")]
    url: String,

    /// Relay password
    #[arg(short = 'p', long, default_value = "")]
    password: String,

    /// Send a TextEdit carrying this code
    #[arg(long, group = "message")]
    text_edit: Option<String>,

    /// Send a TextEval carrying this code
    #[arg(long, group = "message")]
    text_eval: Option<String>,

    /// Request a tempo change, in cycles per second
    #[arg(long, group = "message", allow_negative_numbers = true)]
    tempo: Option<f64>,

    /// Seconds to keep printing broadcasts
    #[arg(short = 'l', long, default_value = "2")]
    listen_secs: u64,
}

impl Args {
    fn document(&self) -> Option<Value> {
        if let Some(code) = &self.text_edit {
            return Some(json!({"password": self.password, "TextEdit": true, "code": code}));
        }
        if let Some(code) = &self.text_eval {
            return Some(json!({"password": self.password, "TextEval": true, "code": code}));
        }
        self.tempo
            .map(|cps| json!({"password": self.password, "TempoChange": cps}))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (socket, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut write, mut read) = socket.split();

    if let Some(document) = args.document() {
        let frame = encode_inbound(&document)?;
        info!("Sending {}", frame);
        write.send(Message::Text(frame)).await?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.listen_secs);
    loop {
        match timeout_at(deadline, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => println!("{}", text),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                info!("Relay closed the connection");
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                warn!("Error reading from relay: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    write.send(Message::Close(None)).await.ok();
    Ok(())
}

//! Simple WebSocket client.
//!
//! Run the echo server first: cargo run --example echo_server
//! Then run: cargo run --example client [ws://host:port/path]

use std::error::Error;

use syncws::{Config, Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:9001/";

fn main() -> Result<(), Box<dyn Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let mut conn = syncws::connect(&url, Config::client())?;
    tracing::info!(%url, "connected");

    for text in ["Hello, WebSocket!", "Hello WebSockets"] {
        conn.send(Message::text(text))?;
        match conn.receive()? {
            Some(reply) => tracing::info!(?reply, "echo"),
            None => break,
        }
    }

    conn.ping(b"still there?".to_vec())?;
    conn.send(Message::binary(vec![1, 2, 3, 4]))?;
    if let Some(reply) = conn.receive()? {
        tracing::info!(?reply, "echo");
    }

    let peer = conn.close(1000, "bye")?;
    tracing::info!(?peer, status = ?conn.close_status(), "closed");
    Ok(())
}

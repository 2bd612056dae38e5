//! Simple WebSocket echo server.
//!
//! Run with: cargo run --example echo_server
//! Then connect with: cargo run --example client
//!
//! Set `RUST_LOG=syncws=trace` to see every frame.

use std::error::Error;
use std::net::TcpStream;
use std::thread;

use syncws::{Config, Connection, Message, Server};

const ADDR: &str = "127.0.0.1:9001";

fn main() -> Result<(), Box<dyn Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = Server::bind(ADDR, Config::server().with_timeout(None))?;
    tracing::info!(addr = ADDR, "echo server listening");

    for conn in server.incoming() {
        match conn {
            Ok(conn) => {
                thread::spawn(move || handle_connection(conn));
            }
            Err(err) => tracing::warn!(error = %err, "handshake failed"),
        }
    }
    Ok(())
}

fn handle_connection(mut conn: Connection<TcpStream>) {
    tracing::info!(path = conn.path().unwrap_or("/"), "client connected");

    loop {
        match conn.receive() {
            Ok(Some(Message::Text(text))) => {
                tracing::info!(%text, "received text");
                if let Err(err) = conn.send(Message::text(text)) {
                    tracing::warn!(error = %err, "send failed");
                    break;
                }
            }
            Ok(Some(msg)) => {
                if let Err(err) = conn.send(msg) {
                    tracing::warn!(error = %err, "send failed");
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(status = ?conn.close_status(), "client closed");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "connection error");
                break;
            }
        }
    }
}

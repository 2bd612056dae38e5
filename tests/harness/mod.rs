//! Loopback echo server shared by the integration tests.

#![allow(dead_code)]

use std::net::TcpStream;
use std::thread::{self, JoinHandle};

use syncws::{Config, Connection, Server};

/// What the server saw on one connection.
#[derive(Debug, Default)]
pub struct ServerRecord {
    pub path: Option<String>,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub custom: Option<String>,
    pub messages: usize,
    pub close_status: Option<u16>,
    pub handshake_error: Option<syncws::Error>,
}

/// Echo server on an ephemeral port, serving a fixed number of connections.
pub struct EchoServer {
    port: u16,
    handle: JoinHandle<Vec<ServerRecord>>,
}

impl EchoServer {
    /// Accept `connections` clients, echoing every message on its own thread.
    pub fn spawn(config: Config, connections: usize) -> Self {
        let server = Server::bind("127.0.0.1:0", config).unwrap();
        let port = server.port();

        let handle = thread::spawn(move || {
            let workers: Vec<_> = (0..connections)
                .map(|_| match server.accept() {
                    Ok(conn) => thread::spawn(move || echo(conn)),
                    Err(err) => thread::spawn(move || ServerRecord {
                        handshake_error: Some(err),
                        ..ServerRecord::default()
                    }),
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        Self { port, handle }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, path)
    }

    /// Wait for every connection to finish.
    pub fn join(self) -> Vec<ServerRecord> {
        self.handle.join().unwrap()
    }
}

fn echo(mut conn: Connection<TcpStream>) -> ServerRecord {
    let request = conn.request().cloned();
    let mut record = ServerRecord {
        path: conn.path().map(str::to_string),
        query: request.as_ref().and_then(|r| r.query.clone()),
        authorization: conn.header("authorization").map(str::to_string),
        user_agent: conn.header("user-agent").map(str::to_string),
        custom: conn.header("x-custom").map(str::to_string),
        ..ServerRecord::default()
    };

    while let Ok(Some(msg)) = conn.receive() {
        record.messages += 1;
        if conn.send(msg).is_err() {
            break;
        }
    }

    record.close_status = conn.close_status();
    record
}

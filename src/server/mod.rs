//! TCP command server.
//!
//! One tokio task per accepted connection. Each connection loops: read one
//! command, reply, wait for the next, until the peer closes or an I/O error
//! ends it. A panicking command handler yields an `Error:` reply and the
//! connection stays open.

pub mod command;

pub use command::{Command, Dispatcher, UNKNOWN_COMMAND_REPLY};

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::ProtocolError;

/// Largest command accepted in a single read.
pub const MAX_COMMAND_BYTES: usize = 1024;

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let accepted = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    handle_connection(stream, peer, dispatcher).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>) {
    tracing::info!(%peer, "Connection opened");
    let mut buf = [0u8; MAX_COMMAND_BYTES];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Read failed");
                break;
            }
        };

        let command = String::from_utf8_lossy(&buf[..n]);
        let command = command.trim();
        if command.is_empty() {
            break;
        }
        tracing::info!(%peer, command = %command, "Command received");

        let reply = match AssertUnwindSafe(dispatcher.handle(command)).catch_unwind().await {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!(%peer, command = %command, "Command handler panicked");
                format!("Error: {}", ProtocolError::HandlerPanicked)
            }
        };
        if let Err(e) = stream.write_all(reply.as_bytes()).await {
            tracing::warn!(%peer, error = %e, "Write failed");
            break;
        }
    }
    tracing::info!(%peer, "Connection closed");
}

//! Command-line client: send one command to the scheduler and print the reply.

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Parser)]
#[command(name = "inbox-client", about = "Talk to a running inbox-scheduler")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Command to send
    #[arg(default_value = "get_emails")]
    command: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("could not connect to {addr}"))?;
    stream
        .write_all(args.command.as_bytes())
        .await
        .context("failed to send command")?;

    // Half-close so the server ends the session after replying.
    stream.shutdown().await.context("failed to finish request")?;

    let mut reply = Vec::new();
    stream
        .read_to_end(&mut reply)
        .await
        .context("failed to read reply")?;
    println!("Received:\n{}", String::from_utf8_lossy(&reply));
    Ok(())
}

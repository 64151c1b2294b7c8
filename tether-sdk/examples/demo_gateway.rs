//! Demo gateway speaking the tether line protocol.
//!
//! Usage:
//!   cargo run --example demo_gateway -- --port 25565
//!   cargo run -p tether-cli -- --port 25565
//!
//! Every client is logged in and spawned right away. Chat is echoed back as
//! `<username> text`. Saying `kick me` or `ban me` ends the session the
//! way a real server would.

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser)]
#[command(name = "demo-gateway", about = "Line-protocol test server for tether")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
    #[arg(long, default_value_t = 25565)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let listener = TcpListener::bind((args.bind.as_str(), args.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            match serve(stream).await {
                Ok(()) => tracing::info!(%peer, "Client left"),
                Err(e) => tracing::warn!(%peer, error = %e, "Client session failed"),
            }
        });
    }
}

async fn serve(stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut username = String::from("?");

    while let Some(line) = lines.next_line().await? {
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            tracing::debug!(%line, "Ignoring malformed line");
            continue;
        };
        match msg["op"].as_str() {
            Some("login") => {
                username = msg["username"].as_str().unwrap_or("?").to_string();
                tracing::info!(%username, version = %msg["version"], "Login");
                send(&mut writer, json!({"event": "login"})).await?;
                send(&mut writer, json!({"event": "spawn"})).await?;
            }
            Some("chat") => {
                let text = msg["text"].as_str().unwrap_or_default();
                match text {
                    "kick me" => {
                        send(&mut writer, json!({"event": "kick", "reason": {"text": "You asked for it"}})).await?;
                        return Ok(());
                    }
                    "ban me" => {
                        let reason = json!({
                            "translate": "multiplayer.disconnect.banned",
                            "with": ["Requested by player"]
                        });
                        send(&mut writer, json!({"event": "kick", "reason": reason})).await?;
                        return Ok(());
                    }
                    _ => {
                        let echo = format!("<{username}> {text}");
                        send(&mut writer, json!({"event": "message", "text": echo})).await?;
                    }
                }
            }
            Some("quit") => return Ok(()),
            _ => tracing::debug!(%line, "Ignoring unknown op"),
        }
    }
    Ok(())
}

async fn send(writer: &mut tokio::net::tcp::OwnedWriteHalf, value: Value) -> Result<()> {
    let mut line = value.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

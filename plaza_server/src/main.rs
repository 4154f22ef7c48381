//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p plaza_server -- [--config plaza.json] [--addr 0.0.0.0:8000] [--spawn 600,380]
//!
//! The server accepts client connections, keeps the authoritative world and
//! the sheet store, and broadcasts a full snapshot after every change.
//!
//! Console commands:
//!   status       - Show sessions and stored sheets
//!   kick <sid>   - Drop a session
//!   quit         - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use plaza_server::GameServer;
use plaza_shared::{config::PlazaConfig, math::IVec2};
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_spawn(s: &str) -> Option<IVec2> {
    let (x, y) = s.split_once(',')?;
    Some(IVec2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn parse_args() -> anyhow::Result<PlazaConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            PlazaConfig::from_json_str(&text).context("parse config")?
        }
        _ => PlazaConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--spawn" if i + 1 < args.len() => {
                match parse_spawn(&args[i + 1]) {
                    Some(spawn) => cfg.spawn = spawn,
                    None => warn!(value = %args[i + 1], "ignoring bad --spawn, expected x,y"),
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, spawn_x = cfg.spawn.x, spawn_y = cfg.spawn.y, "Starting server");

    let mut server = GameServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'kick <sid>' to drop a player, 'quit' to exit.");
    println!();

    server.run().await
}

//! Standalone headless client.
//!
//! Usage:
//!   cargo run -p plaza_client -- [--config plaza.json] [--addr 127.0.0.1:8000]
//!       [--name Ann] [--color #ff8800] [--sheet walk.png]
//!
//! The client connects (or plays offline when the server does not answer in
//! time), wanders around the plaza on a fixed script, and keeps its view of
//! everyone else in sync.
//!
//! Console input:
//!   status       - Show connection and remote entities
//!   quit         - Exit client
//!   anything else is sent as chat

use std::env;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Context;
use plaza_client::{
    input::{Wander, LOCAL_SPEED},
    link,
    local::{build_handshake, load_own_sheet, Avatar, LocalEntity},
    ClientSynchronizer,
};
use plaza_shared::{
    config::{PlazaConfig, SheetSource},
    math::IVec2,
    render::{draw_all, Camera, Drawable, NullRenderer},
};
use tokio::sync::mpsc;
use tracing::info;

/// Ticks between world summaries in the log.
const SUMMARY_EVERY: u64 = 300;

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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--color" if i + 1 < args.len() => {
                cfg.player_color = args[i + 1].clone();
                i += 2;
            }
            "--sheet" if i + 1 < args.len() => {
                let meta = cfg.sheet.as_ref().map(|s| s.meta).unwrap_or_default();
                cfg.sheet = Some(SheetSource {
                    path: args[i + 1].clone(),
                    meta,
                });
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

fn status(sync: &ClientSynchronizer, me: &Avatar) -> Vec<String> {
    let mut out = vec![format!(
        "{} as {} at ({}, {}), {} remote",
        if sync.is_connected() { "Online" } else { "Offline" },
        sync.self_id().map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        me.position().x,
        me.position().y,
        sync.remote_count()
    )];
    for e in sync.remote_entities() {
        out.push(format!(
            "  {} {} ({}, {}) {} frame={}{}",
            e.sid,
            e.name,
            e.pos().x,
            e.pos().y,
            e.animator().state().as_str(),
            e.animator().frame(),
            if e.pending_hash().is_some() { " (loading sheet)" } else { "" }
        ));
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut me = Avatar::new(&cfg);
    let own = load_own_sheet(me.sheet_source());
    if let Some(own) = &own {
        me.set_frames(own.frames.clone());
    }

    let hello = build_handshake(&cfg, me.position(), own.as_ref());
    let mut sync = match link::connect_or_offline(&cfg, hello).await {
        Some(link) => ClientSynchronizer::connected(link, own, cfg.emit_interval()),
        None => ClientSynchronizer::offline(own, cfg.emit_interval()),
    };

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("> ");
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

    println!("Type to chat, 'status' for info, 'quit' to exit.");
    println!();

    let mut ticker = tokio::time::interval(cfg.tick_interval());
    let mut wander = Wander::default();
    let mut renderer = NullRenderer;
    let mut was_connected = sync.is_connected();
    let mut remote_seen = 0;
    let mut chat_seen = 0;
    let mut tick: u64 = 0;

    'main: loop {
        ticker.tick().await;
        tick += 1;

        while let Ok(line) = console_rx.try_recv() {
            match line.as_str() {
                "quit" | "exit" => break 'main,
                "status" => {
                    for out in status(&sync, &me) {
                        println!("{out}");
                    }
                }
                text => {
                    sync.send_chat(text);
                }
            }
        }

        me.step(wander.next_input().delta(LOCAL_SPEED));
        sync.tick(&mut me, Instant::now());

        for line in sync.chat_since(chat_seen) {
            println!("{line}");
        }
        chat_seen = sync.chat_total();

        if sync.remote_count() != remote_seen {
            remote_seen = sync.remote_count();
            info!(remote = remote_seen, "World changed");
        }
        if tick % SUMMARY_EVERY == 0 {
            info!(
                x = me.position().x,
                y = me.position().y,
                remote = sync.remote_count(),
                "Position"
            );
        }

        let camera = Camera {
            center: me.position(),
            half_extent: IVec2::new(640, 360),
        };
        draw_all(
            &mut renderer,
            &camera,
            sync.drawables().chain(std::iter::once(&me as &dyn Drawable)),
        );

        if was_connected && !sync.is_connected() {
            println!("Disconnected from server.");
            break;
        }
        was_connected = sync.is_connected();
    }

    Ok(())
}

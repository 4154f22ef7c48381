//! Server implementation.
//!
//! One cooperative event loop owns the [`SessionHandler`]. Every connection
//! gets a reader task and a writer task; the readers funnel decoded frames
//! into a single bounded queue and the loop handles each event to completion,
//! broadcast included, before taking the next. Nothing else touches the
//! world table or the asset store, so neither needs a lock.
//!
//! Outbound delivery is fire-and-forget: a full per-session outbox drops the
//! message for that session rather than stalling everyone else.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use anyhow::Context;
use bytes::Bytes;
use plaza_shared::{
    config::PlazaConfig,
    net::{encode_to_bytes, ReliableConn, ReliableListener},
    protocol::{ClientMsg, SessionId},
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::handler::{Dispatch, SessionHandler};

/// Queued events from all readers.
pub const EVENT_QUEUE: usize = 1024;
/// Queued outbound frames per session.
pub const OUTBOX_CAPACITY: usize = 256;

/// What a connection task reports to the loop.
#[derive(Debug)]
pub enum ServerEvent {
    Frame { sid: SessionId, msg: ClientMsg },
    Closed { sid: SessionId },
}

/// Transport side of one session.
struct Link {
    peer: SocketAddr,
    outbox: mpsc::Sender<Bytes>,
    reader: JoinHandle<()>,
}

/// Plaza server.
pub struct GameServer {
    pub cfg: PlazaConfig,
    handler: SessionHandler,
    links: HashMap<SessionId, Link>,

    listener: ReliableListener,
    events_tx: mpsc::Sender<ServerEvent>,
    events_rx: mpsc::Receiver<ServerEvent>,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    shutdown: bool,
}

impl GameServer {
    /// Binds the listener from `cfg.server_addr`.
    pub async fn bind(cfg: PlazaConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        Ok(Self {
            handler: SessionHandler::new(cfg.spawn),
            cfg,
            links: HashMap::new(),
            listener,
            events_tx,
            events_rx,
            console_rx: None,
            shutdown: false,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> &SessionHandler {
        &self.handler
    }

    /// Runs until `quit` is entered on the console.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        while !self.shutdown {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, peer)) => self.spawn_session(conn, peer),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                line = next_console_line(&mut self.console_rx) => match line {
                    Some(line) => {
                        for out in self.exec_console(&line) {
                            println!("{out}");
                        }
                    }
                    None => self.console_rx = None,
                },
            }
        }
        info!("server loop stopped");
        Ok(())
    }

    fn spawn_session(&mut self, conn: ReliableConn, peer: SocketAddr) {
        let sid = SessionId::new_unique();
        let (mut reader, mut writer) = conn.into_split();
        let (outbox, mut outbox_rx) = mpsc::channel::<Bytes>(OUTBOX_CAPACITY);

        let writer_sid = sid.clone();
        tokio::spawn(async move {
            while let Some(payload) = outbox_rx.recv().await {
                if let Err(e) = writer.send_encoded(&payload).await {
                    debug!(sid = %writer_sid, error = %e, "write failed");
                    break;
                }
            }
        });

        let events = self.events_tx.clone();
        let reader_sid = sid.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv::<ClientMsg>().await {
                    Ok(msg) => {
                        let event = ServerEvent::Frame {
                            sid: reader_sid.clone(),
                            msg,
                        };
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!(sid = %reader_sid, error = %e, "read ended");
                        break;
                    }
                }
            }
            let _ = events.send(ServerEvent::Closed { sid: reader_sid }).await;
        });

        info!(%sid, %peer, "connection accepted");
        self.handler.on_open(sid.clone());
        self.links.insert(
            sid,
            Link {
                peer,
                outbox,
                reader: reader_task,
            },
        );
    }

    /// Handles one queued event, broadcast included.
    pub fn handle_event(&mut self, event: ServerEvent) {
        let out = match event {
            ServerEvent::Frame { sid, msg } => self.handler.on_frame(&sid, msg),
            ServerEvent::Closed { sid } => {
                self.links.remove(&sid);
                self.handler.on_close(&sid)
            }
        };
        self.route(out);
    }

    fn route(&self, out: Vec<Dispatch>) {
        for dispatch in out {
            match dispatch {
                Dispatch::Unicast(sid, msg) => match encode_to_bytes(&msg) {
                    Ok(payload) => self.deliver(&sid, payload),
                    Err(e) => warn!(error = %e, "encode failed"),
                },
                Dispatch::Broadcast(msg) => {
                    let payload = match encode_to_bytes(&msg) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "encode failed");
                            continue;
                        }
                    };
                    for sid in self.handler.active_ids() {
                        self.deliver(sid, payload.clone());
                    }
                }
            }
        }
    }

    fn deliver(&self, sid: &SessionId, payload: Bytes) {
        let Some(link) = self.links.get(sid) else {
            return;
        };
        match link.outbox.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!(%sid, "outbox full, message dropped"),
            Err(TrySendError::Closed(_)) => debug!(%sid, "outbox closed"),
        }
    }

    /// Drops a session as if its transport had closed.
    pub fn kick(&mut self, sid: &SessionId) -> bool {
        let Some(link) = self.links.remove(sid) else {
            return false;
        };
        link.reader.abort();
        let out = self.handler.on_close(sid);
        self.route(out);
        info!(%sid, peer = %link.peer, "session kicked");
        true
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(cmd) = tokens.first() else {
            return Vec::new();
        };

        match *cmd {
            "status" => {
                let mut out = Vec::new();
                out.push(format!(
                    "Sessions: {} active, {} open",
                    self.handler.active_count(),
                    self.links.len()
                ));
                for (sid, entry) in self.handler.world().iter() {
                    let peer = self
                        .links
                        .get(sid)
                        .map(|l| l.peer.to_string())
                        .unwrap_or_default();
                    out.push(format!(
                        "  {sid} {} {} ({}, {}) sheet={} {peer}",
                        entry.name,
                        entry.color,
                        entry.pos.x,
                        entry.pos.y,
                        if entry.appearance.hash.is_empty() {
                            "default"
                        } else {
                            entry.appearance.hash.as_str()
                        },
                    ));
                }
                let assets = self.handler.assets();
                out.push(format!(
                    "Sheets: {} ({} bytes)",
                    assets.len(),
                    assets.total_bytes()
                ));
                out
            }
            "kick" => match tokens.get(1) {
                Some(id) => {
                    if self.kick(&SessionId::from(*id)) {
                        vec![format!("Kicked {id}")]
                    } else {
                        vec![format!("No session {id}")]
                    }
                }
                None => vec!["Usage: kick <sid>".to_string()],
            },
            "quit" | "exit" => {
                info!("Server shutting down");
                self.shutdown = true;
                vec!["Bye".to_string()]
            }
            other => vec![format!("Unknown command '{other}'")],
        }
    }
}

async fn next_console_line(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral() -> anyhow::Result<(GameServer, PlazaConfig)> {
    let cfg = PlazaConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..Default::default()
    };
    let server = GameServer::bind(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.server_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}

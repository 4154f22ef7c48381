//! Network link to the server.
//!
//! Connect, send `hello`, wait for `welcome`, all inside the configured
//! budget. After that a reader task feeds a bounded inbound queue (drained by
//! the synchronizer once per tick) and a writer task drains a bounded
//! outbound queue. Missing the budget means offline play.

use std::net::SocketAddr;

use anyhow::Context;
use plaza_shared::{
    config::PlazaConfig,
    net::ReliableConn,
    protocol::{ClientMsg, Handshake, ServerMsg, SessionId},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Inbound messages buffered between ticks.
pub const INBOUND_QUEUE: usize = 256;
/// Outbound messages buffered for the writer task.
pub const OUTBOUND_QUEUE: usize = 64;

/// What the reader task hands to the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Server(ServerMsg),
    Disconnected,
}

/// A confirmed connection.
#[derive(Debug)]
pub struct ClientLink {
    /// Id from the handshake reply.
    pub sid: SessionId,
    pub inbound: mpsc::Receiver<Inbound>,
    pub outbound: mpsc::Sender<ClientMsg>,
}

/// Connects and performs the handshake within `cfg.connect_timeout()`.
pub async fn connect(cfg: &PlazaConfig, hello: Handshake) -> anyhow::Result<ClientLink> {
    let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
    info!(server = %addr, "Connecting to server");

    let (conn, sid) = tokio::time::timeout(cfg.connect_timeout(), handshake(addr, hello))
        .await
        .with_context(|| format!("no welcome within {:?}", cfg.connect_timeout()))??;

    let (mut reader, mut writer) = conn.into_split();
    let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
    let (outbound, mut outbound_rx) = mpsc::channel::<ClientMsg>(OUTBOUND_QUEUE);

    // The synchronizer confirms its id by draining this.
    inbound_tx
        .send(Inbound::Server(ServerMsg::Welcome { sid: sid.clone() }))
        .await
        .context("queue welcome")?;

    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = writer.send(&msg).await {
                debug!(error = %e, "write failed");
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match reader.recv::<ServerMsg>().await {
                Ok(msg) => {
                    if inbound_tx.send(Inbound::Server(msg)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "read ended");
                    break;
                }
            }
        }
        let _ = inbound_tx.send(Inbound::Disconnected).await;
    });

    info!(%sid, "Connected to server");
    Ok(ClientLink {
        sid,
        inbound,
        outbound,
    })
}

async fn handshake(addr: SocketAddr, hello: Handshake) -> anyhow::Result<(ReliableConn, SessionId)> {
    let mut conn = ReliableConn::connect(addr).await?;
    conn.send(&ClientMsg::Hello(hello)).await?;
    match conn.recv::<ServerMsg>().await? {
        ServerMsg::Welcome { sid } => Ok((conn, sid)),
        other => anyhow::bail!("expected welcome, got {}", other.event_name()),
    }
}

/// Like [`connect`], but a failure just means playing offline.
pub async fn connect_or_offline(cfg: &PlazaConfig, hello: Handshake) -> Option<ClientLink> {
    match connect(cfg, hello).await {
        Ok(link) => Some(link),
        Err(e) => {
            warn!(server = %cfg.server_addr, error = %e, "server unreachable, playing offline");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_shared::net::ReliableListener;

    #[tokio::test]
    async fn silent_server_times_out_to_offline() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let cfg = PlazaConfig {
            server_addr: listener.local_addr()?.to_string(),
            connect_timeout_ms: 100,
            ..Default::default()
        };
        // Accepts but never answers the hello.
        let _hold = tokio::spawn(async move {
            let conn = listener.accept().await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(conn);
        });
        let started = std::time::Instant::now();
        assert!(connect_or_offline(&cfg, Handshake::default()).await.is_none());
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        Ok(())
    }

    #[tokio::test]
    async fn handshake_queues_welcome_first() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let cfg = PlazaConfig {
            server_addr: listener.local_addr()?.to_string(),
            ..Default::default()
        };
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await?;
            let hello: ClientMsg = conn.recv().await?;
            conn.send(&ServerMsg::Welcome { sid: "abc".into() }).await?;
            let next: ClientMsg = conn.recv().await?;
            Ok::<_, anyhow::Error>((hello, next))
        });

        let mut link = connect(&cfg, Handshake::default()).await?;
        assert_eq!(link.sid, SessionId::from("abc"));
        assert_eq!(
            link.inbound.recv().await,
            Some(Inbound::Server(ServerMsg::Welcome { sid: "abc".into() }))
        );
        link.outbound
            .send(ClientMsg::Move { dx: 1, dy: 0 })
            .await?;

        let (hello, next) = server.await??;
        assert_eq!(hello.event_name(), "hello");
        assert_eq!(next, ClientMsg::Move { dx: 1, dy: 0 });

        // Server task ended and dropped the socket.
        assert_eq!(link.inbound.recv().await, Some(Inbound::Disconnected));
        Ok(())
    }
}

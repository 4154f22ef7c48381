//! Networking primitives.
//!
//! Goals:
//! - One reliable channel per session (TCP, length-prefixed JSON frames).
//! - Halves that can live in separate reader / writer tasks.
//! - Oversized or undecodable frames are skipped, never fatal to the stream.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

/// Largest frame accepted. A base64 sheet at the 512 KiB cap fits with room.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Serializes a message once so it can be fanned out to many sessions.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one frame. `Ok(None)` means an oversized frame was read and thrown away.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Option<Bytes>> {
    let len = r.read_u32().await.context("tcp read len")? as usize;
    if len > MAX_FRAME_BYTES {
        let mut rest = (&mut *r).take(len as u64);
        let skipped = tokio::io::copy(&mut rest, &mut tokio::io::sink())
            .await
            .context("tcp skip oversized frame")?;
        anyhow::ensure!(skipped == len as u64, "stream ended inside oversized frame");
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Some(Bytes::from(payload)))
}

/// Receiving half of a session stream.
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    /// Next decodable message. Oversized and malformed frames are skipped.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        loop {
            let Some(frame) = read_frame(&mut self.half).await? else {
                tracing::debug!("dropped oversized frame");
                continue;
            };
            match decode_from_bytes(&frame) {
                Ok(msg) => return Ok(msg),
                Err(e) => tracing::debug!(error = %e, "dropped malformed frame"),
            }
        }
    }
}

/// Sending half of a session stream.
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        write_frame(&mut self.half, &payload).await
    }

    /// Sends a payload produced by [`encode_to_bytes`].
    pub async fn send_encoded(&mut self, payload: &Bytes) -> anyhow::Result<()> {
        write_frame(&mut self.half, payload).await
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        write_frame(&mut self.stream, &payload).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        loop {
            let Some(frame) = read_frame(&mut self.stream).await? else {
                continue;
            };
            if let Ok(msg) = decode_from_bytes(&frame) {
                return Ok(msg);
            }
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into halves for a reader task and a writer task.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { half: read }, FrameWriter { half: write })
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMsg, ServerMsg, SessionId};

    #[tokio::test]
    async fn frames_survive_oversized_and_malformed_neighbours() {
        let (mut a, mut b) = tokio::io::duplex(4 * MAX_FRAME_BYTES);

        write_frame(&mut a, b"{not json").await.unwrap();
        write_frame(&mut a, &vec![b' '; MAX_FRAME_BYTES + 1]).await.unwrap();
        let ok = encode_to_bytes(&ClientMsg::Chat { text: "hi".into() }).unwrap();
        write_frame(&mut a, &ok).await.unwrap();

        let first = read_frame(&mut b).await.unwrap().unwrap();
        assert!(decode_from_bytes::<ClientMsg>(&first).is_err());
        assert!(read_frame(&mut b).await.unwrap().is_none());
        let third = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(
            decode_from_bytes::<ClientMsg>(&third).unwrap(),
            ClientMsg::Chat { text: "hi".into() }
        );
    }

    #[tokio::test]
    async fn split_halves_talk_over_loopback() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;

        let client = tokio::spawn(async move {
            let mut conn = ReliableConn::connect(addr).await?;
            conn.send(&ClientMsg::SheetGet { hash: "h".into() }).await?;
            conn.recv::<ServerMsg>().await
        });

        let (conn, _peer) = listener.accept().await?;
        let (mut reader, mut writer) = conn.into_split();
        let got: ClientMsg = reader.recv().await?;
        assert_eq!(got, ClientMsg::SheetGet { hash: "h".into() });

        let welcome = ServerMsg::Welcome {
            sid: SessionId::from("s1"),
        };
        writer.send_encoded(&encode_to_bytes(&welcome)?).await?;
        assert_eq!(client.await??, welcome);
        Ok(())
    }
}

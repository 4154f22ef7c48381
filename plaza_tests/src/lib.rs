//! Helpers shared by the socket-level tests.

use std::{
    io::Cursor,
    net::SocketAddr,
    time::{Duration, Instant},
};

use image::{ImageFormat, Rgba, RgbaImage};
use plaza_client::{
    link,
    local::{build_handshake, Avatar, LocalEntity, OwnSheet},
    ClientSynchronizer,
};
use plaza_server::server::bind_ephemeral;
use plaza_shared::{appearance::SheetMeta, config::PlazaConfig};
use tokio::{sync::mpsc, task::JoinHandle};

/// Installs a test-friendly subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A 9-frame walk sheet, one 8x8 cell per frame in a single row.
pub fn walk_sheet_png() -> anyhow::Result<Vec<u8>> {
    let img = RgbaImage::from_fn(9 * 8, 8, |x, y| Rgba([(x / 8 * 28) as u8, y as u8, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn walk_meta() -> SheetMeta {
    SheetMeta {
        count: 9,
        cols: 9,
        ..Default::default()
    }
}

/// Cell size of the padded sheet.
pub const PADDED_CELL: u32 = 16;

/// A 9-frame sheet with a 1 px transparent gutter between cells. Cells are
/// opaque noise so the PNG stays near 10 KiB.
pub fn padded_sheet_png() -> anyhow::Result<Vec<u8>> {
    let stride = PADDED_CELL + 1;
    let img = RgbaImage::from_fn(9 * stride - 1, PADDED_CELL, |x, y| {
        if x % stride == PADDED_CELL {
            return Rgba([0, 0, 0, 0]);
        }
        let [r, g, b, _] = noise(x, y).to_le_bytes();
        Rgba([r, g, b, 255])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn padded_meta() -> SheetMeta {
    SheetMeta {
        count: 9,
        cols: 9,
        pad: 1,
        scale: 1.0,
    }
}

fn noise(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^ (h >> 12)
}

/// A running server on an ephemeral port. Send `quit` to stop it.
pub struct TestServer {
    pub cfg: PlazaConfig,
    pub addr: SocketAddr,
    pub console: mpsc::Sender<String>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let (mut server, cfg) = bind_ephemeral().await?;
        let addr = server.local_addr()?;
        let (console, rx) = mpsc::channel(8);
        server.set_console_input(rx);
        let task = tokio::spawn(async move { server.run().await });
        Ok(Self {
            cfg,
            addr,
            console,
            task,
        })
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.console.send("quit".to_string()).await?;
        tokio::time::timeout(Duration::from_secs(2), self.task).await???;
        Ok(())
    }
}

/// One connected client: the local avatar plus its synchronizer.
pub struct TestPlayer {
    pub me: Avatar,
    pub sync: ClientSynchronizer,
}

impl TestPlayer {
    pub async fn join(server_cfg: &PlazaConfig, name: &str, own: Option<OwnSheet>) -> anyhow::Result<Self> {
        let cfg = PlazaConfig {
            player_name: name.to_string(),
            ..server_cfg.clone()
        };
        let me = Avatar::new(&cfg);
        let hello = build_handshake(&cfg, me.position(), own.as_ref());
        let link = link::connect(&cfg, hello).await?;
        Ok(Self {
            me,
            sync: ClientSynchronizer::connected(link, own, cfg.emit_interval()),
        })
    }

    pub fn tick(&mut self) {
        self.sync.tick(&mut self.me, Instant::now());
    }
}

/// Ticks every player until `done` holds or the deadline passes.
pub async fn pump_until<F>(players: &mut [&mut TestPlayer], mut done: F) -> bool
where
    F: FnMut(&[&mut TestPlayer]) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        for p in players.iter_mut() {
            p.tick();
        }
        if done(players) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

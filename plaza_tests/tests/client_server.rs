//! Full socket-based integration tests for client ↔ server communication.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use plaza_client::{
    link,
    local::{build_handshake, Avatar, LocalEntity, OwnSheet},
    ClientSynchronizer,
};
use plaza_shared::{
    config::PlazaConfig,
    math::IVec2,
    net::{decode_from_bytes, encode_to_bytes},
    protocol::{ClientMsg, ServerMsg, SessionId},
    sheet::MAX_SHEET_BYTES,
};
use plaza_tests::{
    init_tracing, padded_meta, padded_sheet_png, pump_until, walk_meta, walk_sheet_png, TestPlayer,
    TestServer, PADDED_CELL,
};
use tokio::sync::mpsc;

/// Wire envelope is `{"event", "data"}` with snake_case names.
#[test]
fn envelope_names_match_the_wire() -> anyhow::Result<()> {
    let bytes = encode_to_bytes(&ClientMsg::SheetGet { hash: "ab".into() })?;
    let json: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(json["event"], "sheet_get");
    assert_eq!(json["data"]["hash"], "ab");

    let welcome = ServerMsg::Welcome { sid: "x".into() };
    assert_eq!(decode_from_bytes::<ServerMsg>(&encode_to_bytes(&welcome)?)?, welcome);
    Ok(())
}

/// Joins with `sheet_get` traffic counted on the way out.
async fn join_counting_gets(
    cfg: &PlazaConfig,
    name: &str,
) -> anyhow::Result<(TestPlayer, Arc<AtomicUsize>)> {
    let cfg = PlazaConfig {
        player_name: name.to_string(),
        ..cfg.clone()
    };
    let me = Avatar::new(&cfg);
    let link = link::connect(&cfg, build_handshake(&cfg, me.position(), None)).await?;

    let gets = Arc::new(AtomicUsize::new(0));
    let (tap, mut tapped) = mpsc::channel::<ClientMsg>(64);
    let out = link.outbound.clone();
    let counter = Arc::clone(&gets);
    tokio::spawn(async move {
        while let Some(msg) = tapped.recv().await {
            if matches!(msg, ClientMsg::SheetGet { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            if out.send(msg).await.is_err() {
                break;
            }
        }
    });

    let sync = ClientSynchronizer::with_channels(
        Some(link.sid),
        link.inbound,
        tap,
        None,
        cfg.emit_interval(),
    );
    Ok((TestPlayer { me, sync }, gets))
}

fn proxy_frames(p: &TestPlayer, sid: &SessionId) -> usize {
    p.sync
        .proxy(sid)
        .and_then(|e| e.frames())
        .map(|f| f.len())
        .unwrap_or(0)
}

/// Full integration: sheet upload, one fetch per hash, movement, chat, leave.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_share_sheets_moves_and_chat() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start().await?;

    let own = OwnSheet::from_bytes(walk_sheet_png()?, walk_meta())?;
    let mut ann = TestPlayer::join(&server.cfg, "Ann", Some(own)).await?;
    let ann_id = ann.sync.self_id().cloned().expect("ann id");

    let (mut bob, bob_gets) = join_counting_gets(&server.cfg, "Bob").await?;
    let bob_id = bob.sync.self_id().cloned().expect("bob id");

    let ok = pump_until(&mut [&mut ann, &mut bob], |ps| {
        proxy_frames(&ps[1], &ann_id) == 9 && ps[0].sync.proxy(&bob_id).is_some()
    })
    .await;
    assert!(ok, "bob never resolved ann's sheet");
    assert_eq!(bob_gets.load(Ordering::SeqCst), 1);
    assert!(ann.sync.proxy(&ann_id).is_none());
    assert!(bob.sync.proxy(&bob_id).is_none());

    // Ann walks left; Bob sees the move and a mirrored walk.
    let start = ann.me.position();
    for _ in 0..4 {
        ann.me.step(IVec2::new(-8, 0));
        ann.tick();
        bob.tick();
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    let ok = pump_until(&mut [&mut ann, &mut bob], |ps| {
        ps[1]
            .sync
            .proxy(&ann_id)
            .is_some_and(|e| e.pos().x < start.x && e.pos().y == start.y)
    })
    .await;
    assert!(ok, "move never reached bob");
    assert!(bob.sync.proxy(&ann_id).expect("proxy").animator().flip_x());

    // Chat relay carries the sender's name.
    assert!(bob.sync.send_chat("hello plaza"));
    let ok = pump_until(&mut [&mut ann, &mut bob], |ps| {
        ps[0]
            .sync
            .chat_log()
            .iter()
            .any(|l| l.from == "Bob" && l.text == "hello plaza" && l.sid == bob_id)
    })
    .await;
    assert!(ok, "chat never reached ann");

    // A third client with the same sheet costs Bob nothing.
    let again = OwnSheet::from_bytes(walk_sheet_png()?, walk_meta())?;
    let mut cat = TestPlayer::join(&server.cfg, "Cat", Some(again)).await?;
    let cat_id = cat.sync.self_id().cloned().expect("cat id");
    let ok = pump_until(&mut [&mut ann, &mut bob, &mut cat], |ps| {
        proxy_frames(&ps[1], &cat_id) == 9
    })
    .await;
    assert!(ok, "bob never showed cat");
    assert_eq!(bob_gets.load(Ordering::SeqCst), 1);

    // Ann leaves; both others drop her proxy.
    drop(ann);
    let ok = pump_until(&mut [&mut bob, &mut cat], |ps| {
        ps.iter().all(|p| p.sync.proxy(&ann_id).is_none())
    })
    .await;
    assert!(ok, "ann's proxy outlived her session");
    assert_eq!(bob.sync.remote_count(), 1);

    server.stop().await
}

/// A padded sheet of about 10 KiB crosses the server and slices into 9 clean cells.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn padded_sheet_is_sliced_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start().await?;

    let png = padded_sheet_png()?;
    assert!(
        (4 * 1024..=MAX_SHEET_BYTES).contains(&png.len()),
        "sheet is {} bytes",
        png.len()
    );
    let own = OwnSheet::from_bytes(png, padded_meta())?;
    let mut ann = TestPlayer::join(&server.cfg, "Ann", Some(own)).await?;
    let ann_id = ann.sync.self_id().cloned().expect("ann id");
    let mut bob = TestPlayer::join(&server.cfg, "Bob", None).await?;

    let ok = pump_until(&mut [&mut ann, &mut bob], |ps| proxy_frames(&ps[1], &ann_id) == 9).await;
    assert!(ok, "bob never resolved the padded sheet");

    let frames = bob
        .sync
        .proxy(&ann_id)
        .and_then(|e| e.frames())
        .cloned()
        .expect("frames");
    for frame in frames.iter() {
        assert_eq!(frame.dimensions(), (PADDED_CELL, PADDED_CELL));
        assert!(frame.pixels().all(|p| p[3] == 255), "gutter pixels in a frame");
    }

    server.stop().await
}

/// Local movement accumulates on the server and comes back in snapshots.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn moves_accumulate_on_the_server() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start().await?;
    let mut ann = TestPlayer::join(&server.cfg, "Ann", None).await?;
    let me = ann.sync.self_id().cloned().expect("id");
    let spawn = ann.me.position();

    for _ in 0..5 {
        ann.me.step(IVec2::new(8, 8));
        ann.tick();
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    let ok = pump_until(&mut [&mut ann], |ps| {
        ps[0].sync.registry().get(&me).is_some_and(|v| {
            let held = IVec2::new(v.x, v.y);
            held != spawn && held == ps[0].me.position()
        })
    })
    .await;
    assert!(ok, "server never caught up with local movement");
    assert_eq!(ann.sync.remote_count(), 0);

    server.stop().await
}

//! Client synchronizer.
//!
//! Runs on the render thread once per tick. It drains everything the reader
//! task queued since the last tick, reconciles the local world with each
//! snapshot, resolves sprite sheets for remote entities, and emits throttled
//! movement deltas. Every structure in here is touched only from `tick`.
//!
//! Sheet resolution: a hash is requested with `sheet_get` at most once while
//! the request is outstanding. Every proxy that needs an unresolved hash is
//! parked in the pending map and gets the frames when `sheet_bytes` lands.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use plaza_shared::{
    appearance::AppearancePatch,
    math::IVec2,
    protocol::{clamp_chat, ChatRelay, ClientMsg, ServerMsg, SessionId, SessionView, WorldSnapshot},
    render::Drawable,
    sheet::{validate, SheetPayload},
    sprite::{frames_from_png, FrameSet},
};
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tracing::{debug, info, warn};

use crate::{
    link::{ClientLink, Inbound},
    local::{LocalEntity, OwnSheet},
    remote::RemoteEntity,
};

/// Chat lines kept for display.
pub const CHAT_LOG_CAPACITY: usize = 100;

/// Rate limiter for outbound movement.
#[derive(Debug, Clone)]
pub struct MoveThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_sent: Option<IVec2>,
}

impl MoveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_sent: None,
        }
    }

    /// Position the server is believed to hold.
    pub fn baseline(&self) -> Option<IVec2> {
        self.last_sent
    }

    /// Realigns the baseline after the server overwrote our position.
    pub fn rebase(&mut self, pos: IVec2) {
        self.last_sent = Some(pos);
    }

    /// Delta to emit now, if any. The first call only records a baseline.
    pub fn poll(&mut self, pos: IVec2, now: Instant) -> Option<IVec2> {
        let Some(last) = self.last_sent else {
            self.last_sent = Some(pos);
            return None;
        };
        if let Some(at) = self.last_emit {
            if now.saturating_duration_since(at) < self.interval {
                return None;
            }
        }
        let delta = pos - last;
        if delta.is_zero() {
            return None;
        }
        self.last_sent = Some(pos);
        self.last_emit = Some(now);
        Some(delta)
    }
}

/// One received chat line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub at: DateTime<Local>,
    pub from: String,
    pub sid: SessionId,
    pub text: String,
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.at.format("%H:%M:%S"), self.from, self.text)
    }
}

/// Keeps the client's view of the plaza in line with the server.
pub struct ClientSynchronizer {
    /// Id returned by the handshake.
    handshake_sid: Option<SessionId>,
    /// Id confirmed by a drained `welcome`.
    confirmed_sid: Option<SessionId>,

    registry: WorldSnapshot,
    proxies: BTreeMap<SessionId, RemoteEntity>,
    sheet_cache: HashMap<String, FrameSet>,
    /// Hashes with a `sheet_get` outstanding.
    requested: HashSet<String>,
    /// Hashes whose bytes failed to decode; never asked for again.
    unusable: HashSet<String>,
    /// Proxies waiting on a hash.
    pending: HashMap<SessionId, String>,

    own: Option<OwnSheet>,
    own_uploaded: bool,
    throttle: MoveThrottle,

    inbound: Option<mpsc::Receiver<Inbound>>,
    outbound: Option<mpsc::Sender<ClientMsg>>,

    chat_log: VecDeque<ChatLine>,
    chat_total: u64,
}

impl ClientSynchronizer {
    /// Synchronizer fed by raw queues.
    pub fn with_channels(
        handshake_sid: Option<SessionId>,
        inbound: mpsc::Receiver<Inbound>,
        outbound: mpsc::Sender<ClientMsg>,
        own: Option<OwnSheet>,
        emit_interval: Duration,
    ) -> Self {
        let mut sync = Self::offline(own, emit_interval);
        sync.handshake_sid = handshake_sid;
        sync.inbound = Some(inbound);
        sync.outbound = Some(outbound);
        sync
    }

    pub fn connected(link: ClientLink, own: Option<OwnSheet>, emit_interval: Duration) -> Self {
        Self::with_channels(
            Some(link.sid),
            link.inbound,
            link.outbound,
            own,
            emit_interval,
        )
    }

    /// No server: no remote entities, no asset requests.
    pub fn offline(own: Option<OwnSheet>, emit_interval: Duration) -> Self {
        let mut sheet_cache = HashMap::new();
        if let Some(own) = &own {
            sheet_cache.insert(own.hash.clone(), own.frames.clone());
        }
        Self {
            handshake_sid: None,
            confirmed_sid: None,
            registry: WorldSnapshot::new(),
            proxies: BTreeMap::new(),
            sheet_cache,
            requested: HashSet::new(),
            unusable: HashSet::new(),
            pending: HashMap::new(),
            own,
            own_uploaded: false,
            throttle: MoveThrottle::new(emit_interval),
            inbound: None,
            outbound: None,
            chat_log: VecDeque::new(),
            chat_total: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    /// Our own id, once known.
    pub fn self_id(&self) -> Option<&SessionId> {
        self.confirmed_sid.as_ref().or(self.handshake_sid.as_ref())
    }

    fn is_self(&self, sid: &SessionId) -> bool {
        self.handshake_sid.as_ref() == Some(sid) || self.confirmed_sid.as_ref() == Some(sid)
    }

    /// Name/color/position of every session in the last snapshot.
    pub fn registry(&self) -> &WorldSnapshot {
        &self.registry
    }

    pub fn proxy(&self, sid: &SessionId) -> Option<&RemoteEntity> {
        self.proxies.get(sid)
    }

    pub fn remote_entities(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.proxies.values()
    }

    pub fn drawables(&self) -> impl Iterator<Item = &dyn Drawable> {
        self.proxies.values().map(|p| p as &dyn Drawable)
    }

    pub fn remote_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_sheet(&self, hash: &str) -> bool {
        self.sheet_cache.contains_key(&hash.to_ascii_lowercase())
    }

    pub fn own_sheet(&self) -> Option<&OwnSheet> {
        self.own.as_ref()
    }

    pub fn chat_log(&self) -> &VecDeque<ChatLine> {
        &self.chat_log
    }

    /// Lines received after the first `seen`, as far as the log still holds them.
    pub fn chat_since(&self, seen: u64) -> impl Iterator<Item = &ChatLine> {
        let fresh = self.chat_total.saturating_sub(seen).min(self.chat_log.len() as u64);
        self.chat_log.iter().skip(self.chat_log.len() - fresh as usize)
    }

    /// Chat lines received so far.
    pub fn chat_total(&self) -> u64 {
        self.chat_total
    }

    /// Sends a chat line. Returns false when nothing was sent.
    pub fn send_chat(&mut self, text: &str) -> bool {
        match clamp_chat(text) {
            Some(text) => self.send(ClientMsg::Chat { text }),
            None => false,
        }
    }

    /// One render tick: drain inbound, then emit movement.
    pub fn tick<L: LocalEntity + ?Sized>(&mut self, local: &mut L, now: Instant) {
        self.drain_inbound(local);
        self.emit_movement(local, now);
    }

    fn drain_inbound<L: LocalEntity + ?Sized>(&mut self, local: &mut L) {
        loop {
            let Some(rx) = self.inbound.as_mut() else {
                return;
            };
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => Inbound::Disconnected,
            };
            match event {
                Inbound::Server(msg) => self.handle_message(local, msg),
                Inbound::Disconnected => {
                    self.disconnect();
                    return;
                }
            }
        }
    }

    /// Applies one server message.
    pub fn handle_message<L: LocalEntity + ?Sized>(&mut self, local: &mut L, msg: ServerMsg) {
        match msg {
            ServerMsg::Welcome { sid } => self.on_welcome(sid),
            ServerMsg::World(snapshot) => self.apply_snapshot(local, snapshot),
            ServerMsg::Chat(relay) => self.on_chat(relay),
            ServerMsg::SheetBytes(payload) => self.on_sheet_bytes(payload),
        }
    }

    fn disconnect(&mut self) {
        if self.outbound.take().is_some() {
            info!(sid = ?self.self_id(), "Disconnected from server");
        }
        self.inbound = None;
        self.requested.clear();
    }

    fn on_welcome(&mut self, sid: SessionId) {
        debug!(%sid, "welcome");
        self.confirmed_sid = Some(sid);
        if self.own_uploaded {
            return;
        }
        let Some(own) = &self.own else {
            return;
        };
        let register = ClientMsg::SheetRegister(own.payload());
        let nudge = ClientMsg::SetAppearance(AppearancePatch::hash_only(own.hash.clone()));
        let hash = own.hash.clone();
        if self.send(register) && self.send(nudge) {
            self.own_uploaded = true;
            info!(%hash, "sheet uploaded");
        }
    }

    fn apply_snapshot<L: LocalEntity + ?Sized>(&mut self, local: &mut L, snapshot: WorldSnapshot) {
        if let Some(view) = snapshot.iter().find(|(sid, _)| self.is_self(sid)).map(|(_, v)| v) {
            let pos = IVec2::new(view.x, view.y);
            local.set_position(pos);
            self.throttle.rebase(pos);
        }

        let gone: Vec<SessionId> = self
            .proxies
            .keys()
            .filter(|sid| !snapshot.contains_key(*sid) || self.is_self(sid))
            .cloned()
            .collect();
        for sid in gone {
            self.proxies.remove(&sid);
            self.pending.remove(&sid);
            debug!(%sid, "proxy destroyed");
        }

        for (sid, view) in &snapshot {
            if self.is_self(sid) {
                continue;
            }
            self.upsert_proxy(sid, view);
        }

        self.registry = snapshot;
    }

    fn upsert_proxy(&mut self, sid: &SessionId, view: &SessionView) {
        let resolve = match self.proxies.get_mut(sid) {
            Some(proxy) => {
                proxy.update_from(view);
                proxy.set_appearance(&view.appearance)
            }
            None => {
                debug!(%sid, name = %view.name, "proxy created");
                self.proxies
                    .insert(sid.clone(), RemoteEntity::new(sid.clone(), view));
                true
            }
        };
        if resolve {
            self.resolve_appearance(sid);
        }
    }

    /// Cached frames, or park the proxy and ask for the sheet once.
    fn resolve_appearance(&mut self, sid: &SessionId) {
        let Some(proxy) = self.proxies.get_mut(sid) else {
            return;
        };
        if proxy.appearance().uses_default() {
            proxy.use_default_frames();
            self.pending.remove(sid);
            return;
        }

        let hash = proxy.appearance().hash.to_ascii_lowercase();
        if let Some(frames) = self.sheet_cache.get(&hash) {
            proxy.apply_frames(frames.clone());
            self.pending.remove(sid);
            return;
        }

        if self.unusable.contains(&hash) {
            proxy.clear_pending();
            self.pending.remove(sid);
            return;
        }

        proxy.mark_pending(&hash);
        self.pending.insert(sid.clone(), hash.clone());
        if self.requested.contains(&hash) {
            return;
        }
        if self.send(ClientMsg::SheetGet { hash: hash.clone() }) {
            debug!(%hash, "sheet requested");
            self.requested.insert(hash);
        }
    }

    fn on_sheet_bytes(&mut self, payload: SheetPayload) {
        let hash = payload.hash.to_ascii_lowercase();
        let waiting: Vec<SessionId> = self
            .pending
            .iter()
            .filter(|(_, h)| **h == hash)
            .map(|(sid, _)| sid.clone())
            .collect();

        let frames = match decode_sheet(&hash, &payload) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(%hash, error = %e, "sheet unusable, keeping current frames");
                self.requested.remove(&hash);
                self.unusable.insert(hash);
                for sid in &waiting {
                    self.pending.remove(sid);
                    if let Some(proxy) = self.proxies.get_mut(sid) {
                        proxy.clear_pending();
                    }
                }
                return;
            }
        };

        self.requested.remove(&hash);
        self.sheet_cache.insert(hash.clone(), frames.clone());
        for sid in &waiting {
            self.pending.remove(sid);
            if let Some(proxy) = self.proxies.get_mut(sid) {
                proxy.apply_frames(frames.clone());
            }
        }
        info!(%hash, frames = frames.len(), applied = waiting.len(), "sheet resolved");
    }

    fn on_chat(&mut self, relay: ChatRelay) {
        info!(from = %relay.from, sid = %relay.sid, text = %relay.text, "chat");
        if self.chat_log.len() >= CHAT_LOG_CAPACITY {
            self.chat_log.pop_front();
        }
        self.chat_total += 1;
        self.chat_log.push_back(ChatLine {
            at: Local::now(),
            from: relay.from,
            sid: relay.sid,
            text: relay.text,
        });
    }

    fn emit_movement<L: LocalEntity + ?Sized>(&mut self, local: &L, now: Instant) {
        if !self.is_connected() {
            return;
        }
        if let Some(d) = self.throttle.poll(local.position(), now) {
            self.send(ClientMsg::Move { dx: d.x, dy: d.y });
        }
    }

    /// Non-blocking send; a full queue drops the message.
    fn send(&mut self, msg: ClientMsg) -> bool {
        let Some(tx) = &self.outbound else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                debug!(event = msg.event_name(), "outbound queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.disconnect();
                false
            }
        }
    }
}

fn decode_sheet(hash: &str, payload: &SheetPayload) -> anyhow::Result<FrameSet> {
    let bytes = payload.bytes()?;
    validate(hash, &bytes)?;
    frames_from_png(&bytes, &payload.meta)
}

//! Session protocol handler.
//!
//! Maps inbound protocol messages onto the world table and the asset store
//! and decides what goes out. The handler never touches a socket: every call
//! returns the [`Dispatch`]es to deliver, in order, so the whole protocol can
//! be driven from tests.
//!
//! Per-session lifecycle:
//! - `Connecting`: transport open, no handshake yet. Only `hello` is accepted.
//! - `Active`: handshake done; every other message is valid.
//! - `Disconnected`: terminal. The session is forgotten, later frames for its
//!   id find nothing and are ignored.
//!
//! Bad input is never answered with an error. It is logged at debug level
//! and dropped so one client cannot disturb the others.

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use plaza_shared::{
    appearance::{AppearanceDescriptor, AppearancePatch},
    math::IVec2,
    protocol::{clamp_chat, ChatRelay, ClientMsg, Handshake, ServerMsg, SessionId},
    sheet::SheetPayload,
};
use tracing::{debug, info};

use crate::{
    assets::{AssetStore, Registered},
    world::WorldTable,
};

/// Color given to sessions whose handshake has none.
pub const DEFAULT_COLOR: &str = "#64b5f6";

/// Upper bound on distinct unknown hashes with parked `sheet_get` requests.
pub const MAX_DEFERRED_HASHES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Active,
}

/// One outbound message and who gets it.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Only this session.
    Unicast(SessionId, ServerMsg),
    /// Every active session.
    Broadcast(ServerMsg),
}

pub struct SessionHandler {
    spawn: IVec2,
    world: WorldTable,
    assets: AssetStore,
    phases: HashMap<SessionId, SessionPhase>,
    /// Unknown hash -> sessions that asked for it.
    deferred: HashMap<String, BTreeSet<SessionId>>,
}

impl SessionHandler {
    pub fn new(spawn: IVec2) -> Self {
        Self::with_parts(spawn, WorldTable::new(), AssetStore::new())
    }

    /// Builds a handler around existing state.
    pub fn with_parts(spawn: IVec2, world: WorldTable, assets: AssetStore) -> Self {
        Self {
            spawn,
            world,
            assets,
            phases: HashMap::new(),
            deferred: HashMap::new(),
        }
    }

    pub fn world(&self) -> &WorldTable {
        &self.world
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// `None` once the session is disconnected (or was never opened).
    pub fn phase(&self, sid: &SessionId) -> Option<SessionPhase> {
        self.phases.get(sid).copied()
    }

    /// Sessions that receive broadcasts.
    pub fn active_ids(&self) -> impl Iterator<Item = &SessionId> {
        self.phases
            .iter()
            .filter(|(_, phase)| **phase == SessionPhase::Active)
            .map(|(sid, _)| sid)
    }

    pub fn active_count(&self) -> usize {
        self.active_ids().count()
    }

    /// Transport opened; waiting for the handshake.
    pub fn on_open(&mut self, sid: SessionId) {
        debug!(%sid, "session connecting");
        self.phases.insert(sid, SessionPhase::Connecting);
    }

    /// Handles one decoded frame from `sid`.
    pub fn on_frame(&mut self, sid: &SessionId, msg: ClientMsg) -> Vec<Dispatch> {
        match (self.phase(sid), msg) {
            (Some(SessionPhase::Connecting), ClientMsg::Hello(hs)) => self.activate(sid, hs),
            (Some(SessionPhase::Active), ClientMsg::Hello(_)) => {
                debug!(%sid, "duplicate hello ignored");
                Vec::new()
            }
            (Some(SessionPhase::Active), msg) => self.on_active(sid, msg),
            (phase, msg) => {
                debug!(%sid, ?phase, event = msg.event_name(), "message outside active phase ignored");
                Vec::new()
            }
        }
    }

    /// Transport closed (or session kicked).
    pub fn on_close(&mut self, sid: &SessionId) -> Vec<Dispatch> {
        let was = self.phases.remove(sid);
        self.deferred.retain(|_, waiters| {
            waiters.remove(sid);
            !waiters.is_empty()
        });
        if was.is_none() {
            return Vec::new();
        }
        info!(%sid, "session disconnected");
        if self.world.on_disconnect(sid) {
            vec![self.world_broadcast()]
        } else {
            Vec::new()
        }
    }

    fn activate(&mut self, sid: &SessionId, hs: Handshake) -> Vec<Dispatch> {
        let name = hs
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| sid.short());
        let color = hs
            .color
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        let pos = IVec2::new(hs.x.unwrap_or(self.spawn.x), hs.y.unwrap_or(self.spawn.y));
        let appearance = hs
            .appearance
            .as_ref()
            .map(AppearanceDescriptor::from_patch)
            .unwrap_or_default();

        info!(%sid, %name, %color, x = pos.x, y = pos.y, hash = %appearance.hash, "session active");
        self.world
            .on_connect(sid.clone(), name, color, pos, appearance);
        self.phases.insert(sid.clone(), SessionPhase::Active);

        vec![
            Dispatch::Unicast(sid.clone(), ServerMsg::Welcome { sid: sid.clone() }),
            self.world_broadcast(),
        ]
    }

    fn on_active(&mut self, sid: &SessionId, msg: ClientMsg) -> Vec<Dispatch> {
        match msg {
            ClientMsg::Move { dx, dy } => {
                if self.world.on_move(sid, dx, dy) {
                    vec![self.world_broadcast()]
                } else {
                    Vec::new()
                }
            }
            ClientMsg::Chat { text } => self.on_chat(sid, &text),
            ClientMsg::SheetRegister(payload) => self.on_sheet_register(sid, payload),
            ClientMsg::SheetGet { hash } => self.on_sheet_get(sid, &hash),
            ClientMsg::SetAppearance(patch) => self.on_set_appearance(sid, &patch),
            ClientMsg::Hello(_) => Vec::new(),
        }
    }

    fn on_chat(&mut self, sid: &SessionId, text: &str) -> Vec<Dispatch> {
        let Some(text) = clamp_chat(text) else {
            return Vec::new();
        };
        let from = self
            .world
            .get(sid)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| sid.short());
        debug!(%sid, %from, len = text.len(), "chat");
        vec![Dispatch::Broadcast(ServerMsg::Chat(ChatRelay {
            from,
            sid: sid.clone(),
            text,
        }))]
    }

    fn on_sheet_register(&mut self, sid: &SessionId, payload: SheetPayload) -> Vec<Dispatch> {
        if payload.hash.is_empty() || payload.png_b64.is_empty() {
            debug!(%sid, "sheet_register without hash or bytes dropped");
            return Vec::new();
        }
        if self.assets.contains(&payload.hash) {
            return Vec::new();
        }
        let bytes = match payload.bytes() {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                debug!(%sid, error = %e, "sheet_register dropped");
                return Vec::new();
            }
        };
        match self.assets.register(&payload.hash, payload.meta, bytes) {
            Ok(Registered::Stored) => {
                info!(%sid, hash = %payload.hash, sheets = self.assets.len(), "sheet registered");
                self.release_deferred(&payload.hash)
            }
            Ok(Registered::AlreadyPresent) => Vec::new(),
            Err(e) => {
                debug!(%sid, hash = %payload.hash, error = %e, "sheet_register rejected");
                Vec::new()
            }
        }
    }

    fn on_sheet_get(&mut self, sid: &SessionId, hash: &str) -> Vec<Dispatch> {
        if hash.is_empty() {
            return Vec::new();
        }
        if let Some(reply) = self.sheet_bytes(hash) {
            debug!(%sid, %hash, "sheet_get served");
            return vec![Dispatch::Unicast(sid.clone(), reply)];
        }
        let key = hash.to_ascii_lowercase();
        if self.deferred.contains_key(&key) || self.deferred.len() < MAX_DEFERRED_HASHES {
            debug!(%sid, %hash, "sheet_get parked until registration");
            self.deferred.entry(key).or_default().insert(sid.clone());
        }
        Vec::new()
    }

    fn on_set_appearance(&mut self, sid: &SessionId, patch: &AppearancePatch) -> Vec<Dispatch> {
        if self.world.on_set_appearance(sid, patch) {
            vec![self.world_broadcast()]
        } else {
            Vec::new()
        }
    }

    /// Answers every parked `sheet_get` for a freshly stored hash.
    fn release_deferred(&mut self, hash: &str) -> Vec<Dispatch> {
        let Some(waiters) = self.deferred.remove(&hash.to_ascii_lowercase()) else {
            return Vec::new();
        };
        let Some(reply) = self.sheet_bytes(hash) else {
            return Vec::new();
        };
        waiters
            .into_iter()
            .filter(|w| self.phase(w) == Some(SessionPhase::Active))
            .map(|w| Dispatch::Unicast(w, reply.clone()))
            .collect()
    }

    fn sheet_bytes(&self, hash: &str) -> Option<ServerMsg> {
        self.assets.fetch(hash).map(|rec| {
            ServerMsg::SheetBytes(SheetPayload::new(rec.hash.clone(), rec.meta, &rec.bytes))
        })
    }

    fn world_broadcast(&self) -> Dispatch {
        Dispatch::Broadcast(ServerMsg::World(self.world.snapshot()))
    }
}

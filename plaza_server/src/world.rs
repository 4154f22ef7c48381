//! World state table.
//!
//! The single source of truth for every live session. Mutations report
//! whether anything changed; the caller broadcasts [`WorldTable::snapshot`]
//! afterwards.

use std::collections::BTreeMap;

use plaza_shared::{
    appearance::{AppearanceDescriptor, AppearancePatch},
    math::IVec2,
    protocol::{SessionId, SessionView, WorldSnapshot},
};

/// Authoritative state of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub name: String,
    pub color: String,
    pub pos: IVec2,
    pub appearance: AppearanceDescriptor,
}

impl SessionEntry {
    fn view(&self) -> SessionView {
        SessionView {
            x: self.pos.x,
            y: self.pos.y,
            name: self.name.clone(),
            color: self.color.clone(),
            appearance: self.appearance.clone(),
        }
    }
}

/// Sessions keyed by id; ordered so snapshots serialize in a stable order.
#[derive(Debug, Default)]
pub struct WorldTable {
    sessions: BTreeMap<SessionId, SessionEntry>,
}

impl WorldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session. An existing id is replaced (fresh spawn).
    pub fn on_connect(
        &mut self,
        sid: SessionId,
        name: String,
        color: String,
        pos: IVec2,
        appearance: AppearanceDescriptor,
    ) {
        self.sessions.insert(
            sid,
            SessionEntry {
                name,
                color,
                pos,
                appearance,
            },
        );
    }

    /// Adds a client-reported delta. Unknown ids are ignored.
    pub fn on_move(&mut self, sid: &SessionId, dx: i64, dy: i64) -> bool {
        match self.sessions.get_mut(sid) {
            Some(entry) => {
                entry.pos = entry.pos + IVec2::new(dx, dy);
                true
            }
            None => false,
        }
    }

    pub fn on_disconnect(&mut self, sid: &SessionId) -> bool {
        self.sessions.remove(sid).is_some()
    }

    /// Merges the provided appearance fields. Unknown ids are ignored.
    pub fn on_set_appearance(&mut self, sid: &SessionId, patch: &AppearancePatch) -> bool {
        match self.sessions.get_mut(sid) {
            Some(entry) => {
                entry.appearance.merge(patch);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, sid: &SessionId) -> Option<&SessionEntry> {
        self.sessions.get(sid)
    }

    pub fn contains(&self, sid: &SessionId) -> bool {
        self.sessions.contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &SessionEntry)> {
        self.sessions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SessionId> {
        self.sessions.keys()
    }

    /// Full replacement view of the table.
    pub fn snapshot(&self) -> WorldSnapshot {
        self.sessions
            .iter()
            .map(|(sid, entry)| (sid.clone(), entry.view()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(table: &mut WorldTable, sid: &str, x: i64, y: i64) -> SessionId {
        let sid = SessionId::from(sid);
        table.on_connect(
            sid.clone(),
            "n".into(),
            "#fff".into(),
            IVec2::new(x, y),
            AppearanceDescriptor::default(),
        );
        sid
    }

    #[test]
    fn moves_accumulate_to_sum_of_deltas() {
        let mut table = WorldTable::new();
        let sid = spawn(&mut table, "a", 10, 20);
        let deltas = [(3, 0), (-7, 2), (0, 0), (120, -45), (-1, -1)];
        for (dx, dy) in deltas {
            assert!(table.on_move(&sid, dx, dy));
        }
        let (sx, sy) = deltas
            .iter()
            .fold((0, 0), |(ax, ay), (dx, dy)| (ax + dx, ay + dy));
        assert_eq!(table.get(&sid).unwrap().pos, IVec2::new(10 + sx, 20 + sy));
    }

    #[test]
    fn unknown_sessions_are_noops() {
        let mut table = WorldTable::new();
        let ghost = SessionId::from("ghost");
        assert!(!table.on_move(&ghost, 1, 1));
        assert!(!table.on_disconnect(&ghost));
        assert!(!table.on_set_appearance(&ghost, &AppearancePatch::hash_only("h")));
        assert!(table.is_empty());
    }

    #[test]
    fn reconnect_with_same_id_is_fresh_spawn() {
        let mut table = WorldTable::new();
        let sid = spawn(&mut table, "a", 10, 20);
        table.on_move(&sid, 5, 5);
        spawn(&mut table, "a", 0, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&sid).unwrap().pos, IVec2::ZERO);
    }

    #[test]
    fn partial_appearance_merge() {
        let mut table = WorldTable::new();
        let sid = spawn(&mut table, "a", 0, 0);
        table.on_set_appearance(
            &sid,
            &AppearancePatch {
                hash: Some("abc".into()),
                pad: Some(2),
                ..Default::default()
            },
        );
        let app = &table.get(&sid).unwrap().appearance;
        assert_eq!(app.hash, "abc");
        assert_eq!(app.pad, 2);
        assert_eq!(app.cols, 9);
        assert_eq!(app.count, 1);
    }

    #[test]
    fn snapshot_drops_disconnected() {
        let mut table = WorldTable::new();
        let a = spawn(&mut table, "a", 1, 2);
        let b = spawn(&mut table, "b", 3, 4);
        assert!(table.on_disconnect(&a));
        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(!snap.contains_key(&a));
        assert_eq!(snap[&b].x, 3);
    }
}

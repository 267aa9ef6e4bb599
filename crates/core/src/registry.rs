//! Session registry (C6): call-id-keyed lookup table, newest session
//! first per call-id (a call-id can have more than one session across
//! re-INVITEs), plus the weak-id tables the command engine and packet
//! observers use to resolve a session/stream by numeric id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::session::Session;
use crate::stream::StreamEndpoint;
use crate::weakref::WeakRegistry;

pub struct RegistryStats {
    pub nsess_created: AtomicU64,
    pub nsess_complete: AtomicU64,
    pub nsess_timeout: AtomicU64,
}

impl RegistryStats {
    fn new() -> Self {
        Self {
            nsess_created: AtomicU64::new(0),
            nsess_complete: AtomicU64::new(0),
            nsess_timeout: AtomicU64::new(0),
        }
    }
}

pub struct SessionRegistry {
    by_call_id: DashMap<String, Vec<Arc<Session>>>,
    pub streams: Arc<WeakRegistry<StreamEndpoint>>,
    pub sessions_by_id: WeakRegistry<Session>,
    pub stats: RegistryStats,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            by_call_id: DashMap::new(),
            streams: Arc::new(WeakRegistry::new()),
            sessions_by_id: WeakRegistry::new(),
            stats: RegistryStats::new(),
        }
    }

    /// Register a freshly created session, newest-first within its
    /// call-id bucket.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions_by_id.register(session.id, &session);
        self.by_call_id
            .entry(session.call_id.clone())
            .or_default()
            .insert(0, session);
        self.stats.nsess_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the bookkeeping counter when a session transitions to
    /// two-sided (both legs have called UPDATE).
    pub fn note_complete(&self) {
        self.stats.nsess_complete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_timeout(&self) {
        self.stats.nsess_timeout.fetch_add(1, Ordering::Relaxed);
    }

    /// Look up a session by call-id, from-tag, and optional to-tag.
    /// `to_tag = None` is a one-sided match (UPDATE before the answer
    /// arrives); `Some` requires an exact two-sided match (LOOKUP, and
    /// UPDATE once both tags are known). Returns the newest matching
    /// session for that call-id.
    pub fn find(&self, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Option<Arc<Session>> {
        let bucket = self.by_call_id.get(call_id)?;
        bucket
            .iter()
            .find(|s| s.matches(call_id, from_tag, to_tag))
            .cloned()
    }

    /// Remove a session entirely (explicit delete, or reaped after TTL
    /// expiry). Also drops its stream weak-id registrations.
    pub fn remove(&self, session: &Arc<Session>) {
        if let Some(mut bucket) = self.by_call_id.get_mut(&session.call_id) {
            bucket.retain(|s| s.id != session.id);
        }
        self.by_call_id.remove_if(&session.call_id, |_, v| v.is_empty());
        self.sessions_by_id.unregister(session.id);
        session.rtp.drop_registrations(&self.streams);
        session.rtcp.drop_registrations(&self.streams);
    }

    pub fn sessions_for_call(&self, call_id: &str) -> Vec<Arc<Session>> {
        self.by_call_id
            .get(call_id)
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_call_id.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live session, for the TTL-scanning thread.
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.by_call_id
            .iter()
            .flat_map(|e| e.value().clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use crate::stream::PipeKind;
    use std::net::{Ipv4Addr, SocketAddr};

    fn laddr() -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)
    }

    fn make_session(reg: &SessionRegistry, id: u64, call_id: &str, from_tag: &str) -> Arc<Session> {
        let rtp = Pipe::new(PipeKind::Rtp, laddr(), laddr(), 60, &reg.streams);
        let rtcp = Pipe::new(PipeKind::Rtcp, laddr(), laddr(), 60, &reg.streams);
        Arc::new(Session::new(id, call_id.into(), from_tag.into(), rtp, rtcp))
    }

    #[test]
    fn insert_and_find_one_sided() {
        let reg = SessionRegistry::new();
        let s = make_session(&reg, 1, "call1", "from1");
        reg.insert(s.clone());
        let found = reg.find("call1", "from1", None).unwrap();
        assert_eq!(found.id, 1);
    }

    #[test]
    fn find_requires_to_tag_when_given() {
        let reg = SessionRegistry::new();
        let s = make_session(&reg, 1, "call1", "from1");
        reg.insert(s.clone());
        assert!(reg.find("call1", "from1", Some("totag")).is_none());
        s.set_to_tag("totag".into());
        assert!(reg.find("call1", "from1", Some("totag")).is_some());
    }

    #[test]
    fn newest_session_returned_first_for_reinvite() {
        let reg = SessionRegistry::new();
        let s1 = make_session(&reg, 1, "call1", "from1");
        reg.insert(s1);
        let s2 = make_session(&reg, 2, "call1", "from1");
        reg.insert(s2);
        let found = reg.find("call1", "from1", None).unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn remove_drops_bucket_and_weak_ids() {
        let reg = SessionRegistry::new();
        let s = make_session(&reg, 1, "call1", "from1");
        let rtp_caller_id = s.rtp.caller.id;
        reg.insert(s.clone());
        reg.remove(&s);
        assert!(reg.find("call1", "from1", None).is_none());
        assert!(reg.streams.lookup(rtp_caller_id).is_none());
        assert!(reg.sessions_by_id.lookup(1).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn all_sessions_snapshot_covers_every_call() {
        let reg = SessionRegistry::new();
        reg.insert(make_session(&reg, 1, "call1", "from1"));
        reg.insert(make_session(&reg, 2, "call2", "from2"));
        assert_eq!(reg.all_sessions().len(), 2);
    }
}

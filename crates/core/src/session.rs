//! Session (C5): one SIP dialog's worth of relay state — a pair of
//! pipes (RTP and RTCP) plus the call-id/tag identity the control
//! channel uses to find it again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::pipe::Pipe;
use crate::stream::Side;

/// Out-of-band notification target registered by an UPDATE command's
/// `n<socket>` modifier, fired once when the session times out.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    pub socket_name: String,
    pub tag: String,
}

pub struct Session {
    pub id: u64,
    pub call_id: String,
    pub from_tag: String,
    to_tag: Mutex<Option<String>>,
    pub created_at: SystemTime,
    pub rtp: Pipe,
    pub rtcp: Pipe,

    /// Per-side "weak" marking: a weak-flagged side does not keep the
    /// session's strong refcount up on its own (set by the `w`/`W`
    /// command modifier — e.g. a monitoring UPDATE that shouldn't
    /// prevent the real dialog's side from expiring the session).
    from_weak: AtomicBool,
    to_weak: AtomicBool,

    timeout_notify: Mutex<Option<NotifyTarget>>,
}

impl Session {
    pub fn new(id: u64, call_id: String, from_tag: String, rtp: Pipe, rtcp: Pipe) -> Self {
        Self {
            id,
            call_id,
            from_tag,
            to_tag: Mutex::new(None),
            created_at: SystemTime::now(),
            rtp,
            rtcp,
            from_weak: AtomicBool::new(false),
            to_weak: AtomicBool::new(false),
            timeout_notify: Mutex::new(None),
        }
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to_tag.lock().clone()
    }

    pub fn set_to_tag(&self, tag: String) {
        *self.to_tag.lock() = Some(tag);
    }

    /// A session is "complete" once both sides of the RTP pipe have a
    /// remote destination (either learned from traffic or confirmed by
    /// an UPDATE) — this is independent of whether a to-tag has been
    /// recorded, which only tracks that the callee leg has called in.
    pub fn is_complete(&self) -> bool {
        self.rtp.stream(Side::Caller).effective_remote().is_some()
            && self.rtp.stream(Side::Callee).effective_remote().is_some()
    }

    pub fn mark_weak(&self, side: Side) {
        match side {
            Side::Caller => self.from_weak.store(true, Ordering::Relaxed),
            Side::Callee => self.to_weak.store(true, Ordering::Relaxed),
        }
    }

    pub fn is_weak(&self, side: Side) -> bool {
        match side {
            Side::Caller => self.from_weak.load(Ordering::Relaxed),
            Side::Callee => self.to_weak.load(Ordering::Relaxed),
        }
    }

    /// True once every side that has registered is weak — such a
    /// session has no strong owner left and is eligible for prompt
    /// reclamation rather than waiting out its full TTL.
    pub fn all_sides_weak(&self) -> bool {
        let from = self.from_weak.load(Ordering::Relaxed);
        let to = if self.to_tag().is_some() {
            self.to_weak.load(Ordering::Relaxed)
        } else {
            true
        };
        from && to
    }

    pub fn set_timeout_notify(&self, target: NotifyTarget) {
        *self.timeout_notify.lock() = Some(target);
    }

    /// Consume the notify target, so a timeout fires it at most once.
    pub fn take_timeout_notify(&self) -> Option<NotifyTarget> {
        self.timeout_notify.lock().take()
    }

    /// Matches a call-id + from-tag, and optionally a to-tag: a
    /// `None` to-tag matches any session with that call-id/from-tag
    /// (one-sided match, used by UPDATE before the answer arrives); a
    /// `Some` to-tag requires an exact match against the session's
    /// *current* to-tag (two-sided match, used by LOOKUP and by
    /// UPDATE once both tags are known).
    pub fn matches(&self, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> bool {
        if self.call_id != call_id || self.from_tag != from_tag {
            return false;
        }
        match to_tag {
            None => true,
            Some(tt) => self.to_tag().as_deref() == Some(tt),
        }
    }

    /// Minimum remaining TTL across both pipes — the session is
    /// considered dead once this reaches zero.
    pub fn get_ttl(&self) -> i64 {
        self.rtp.get_ttl().min(self.rtcp.get_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::PipeKind;
    use crate::weakref::WeakRegistry;
    use std::net::{Ipv4Addr, SocketAddr};

    fn laddr() -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)
    }

    fn make_session() -> Session {
        let wrt: Arc<WeakRegistry<crate::stream::StreamEndpoint>> = Arc::new(WeakRegistry::new());
        let rtp = Pipe::new(PipeKind::Rtp, laddr(), laddr(), 60, &wrt);
        let rtcp = Pipe::new(PipeKind::Rtcp, laddr(), laddr(), 60, &wrt);
        Session::new(1, "call1".into(), "fromtag".into(), rtp, rtcp)
    }

    #[test]
    fn incomplete_until_both_sides_have_a_remote() {
        let s = make_session();
        assert!(!s.is_complete());
        s.rtp
            .stream(Side::Caller)
            .prefill_addr(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 10000));
        assert!(!s.is_complete());
        s.rtp
            .stream(Side::Callee)
            .prefill_addr(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 20000));
        assert!(s.is_complete());
    }

    #[test]
    fn one_sided_match_ignores_to_tag() {
        let s = make_session();
        assert!(s.matches("call1", "fromtag", None));
        assert!(!s.matches("call2", "fromtag", None));
    }

    #[test]
    fn two_sided_match_requires_to_tag() {
        let s = make_session();
        s.set_to_tag("totag".into());
        assert!(s.matches("call1", "fromtag", Some("totag")));
        assert!(!s.matches("call1", "fromtag", Some("othertag")));
    }

    #[test]
    fn all_sides_weak_requires_complete_session_both_weak() {
        let s = make_session();
        s.mark_weak(Side::Caller);
        // incomplete session: "to" side treated as vacuously weak
        assert!(s.all_sides_weak());

        s.set_to_tag("totag".into());
        assert!(!s.all_sides_weak());
        s.mark_weak(Side::Callee);
        assert!(s.all_sides_weak());
    }

    #[test]
    fn timeout_notify_fires_once() {
        let s = make_session();
        s.set_timeout_notify(NotifyTarget {
            socket_name: "unix:/tmp/x".into(),
            tag: "t".into(),
        });
        assert!(s.take_timeout_notify().is_some());
        assert!(s.take_timeout_notify().is_none());
    }
}

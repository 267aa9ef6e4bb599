//! Stream endpoint (C3): one UDP socket's send/receive state.
//!
//! A [`StreamEndpoint`] owns exactly one UDP socket at a time, tracks
//! the latch (first-observed-source capture), and holds the lock-free
//! fields the data plane reads without taking the per-stream mutex
//! (`catch_dtmf_data`, via [`ArcSwapOption`]). Its peer — the other
//! side of the same [`Pipe`](crate::pipe::Pipe) — is referenced only by
//! a 64-bit weak id, resolved through a [`WeakRegistry`], to avoid the
//! ownership cycle a direct pointer would create (DESIGN NOTES §9).

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::info;

use crate::dtmf::CatchDtmfData;
use crate::observer::{PacketCtx, PacketObserverManager};
use crate::resizer::RtpResizer;
use crate::weakref::{NONE_ID, WeakRegistry};

/// Which call leg a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Caller,
    Callee,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::Caller => 0,
            Side::Callee => 1,
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::Caller => Side::Callee,
            Side::Callee => Side::Caller,
        }
    }

    /// Label used in log lines, matching `get_actor()`.
    pub fn actor(self) -> &'static str {
        match self {
            Side::Caller => "caller",
            Side::Callee => "callee",
        }
    }
}

/// Which protocol duplex a stream (and its owning pipe) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeKind {
    Rtp,
    Rtcp,
}

/// Latch state machine: `Unlatched -> Latched -> Locked`.
///
/// While `Latched`, every inbound packet re-learns the remote source
/// (handles NAT rebinding / roaming). Once `Locked` (asymmetric mode,
/// set by the `a`/`A` command modifier), the source captured at the
/// moment of locking is frozen; packets from any other source are
/// dropped and counted as stream errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Unlatched,
    Latched,
    Locked,
}

struct RemoteState {
    latch: LatchState,
    /// Source address of the most recent accepted inbound packet.
    last_source: Option<SocketAddr>,
    /// Effective destination for outbound forwarding once latched/locked.
    confirmed_dest: Option<SocketAddr>,
    /// Control-plane-supplied destination, used before anything is latched.
    pending_dest: Option<SocketAddr>,
    /// A destination queued by `prefill_addr` while already
    /// latched/locked, held back until `apply_pending_swap` confirms it.
    pending_swap: Option<SocketAddr>,
    /// Set when `locklatch()` is called before any packet has arrived;
    /// the *next* received packet becomes the frozen source.
    lock_on_next: bool,
}

impl RemoteState {
    fn new() -> Self {
        Self {
            latch: LatchState::Unlatched,
            last_source: None,
            confirmed_dest: None,
            pending_dest: None,
            pending_swap: None,
            lock_on_next: false,
        }
    }

    fn effective_remote(&self) -> Option<SocketAddr> {
        self.confirmed_dest.or(self.pending_dest)
    }
}

pub struct StreamCounters {
    pub rx_packets: AtomicU64,
    pub tx_packets: AtomicU64,
    pub rx_errors: AtomicU64,
}

impl StreamCounters {
    fn new() -> Self {
        Self {
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            rx_errors: AtomicU64::new(0),
        }
    }
}

pub struct StreamEndpoint {
    pub id: u64,
    pub side: Side,
    pub pipe_kind: PipeKind,
    /// Weak id of the other stream in the same pipe (`stuid_sendr`).
    pub peer_stream_id: AtomicU64,
    streams_wrt: Arc<WeakRegistry<StreamEndpoint>>,

    laddr: SocketAddr,
    socket: ArcSwapOption<UdpSocket>,
    remote: Mutex<RemoteState>,

    pub weak: AtomicBool,
    pub asymmetric: AtomicBool,
    pub on_hold: AtomicBool,

    codecs: Mutex<Option<Vec<u8>>>,
    ptime: Mutex<Option<u32>>,
    resizer: Mutex<Option<RtpResizer>>,

    pub ttl: crate::ttl::Ttl,
    pub counters: StreamCounters,

    /// Lock-free swap target for the DTMF-catching module (C8); read by
    /// the data plane's taste filter without taking any mutex.
    pub catch_dtmf_data: ArcSwapOption<CatchDtmfData>,

    /// Taps registered against this stream's own inbound traffic —
    /// recording, accounting, anything besides the built-in DTMF path.
    pub observers: Arc<PacketObserverManager>,
}

impl StreamEndpoint {
    pub fn new(
        id: u64,
        side: Side,
        pipe_kind: PipeKind,
        laddr: SocketAddr,
        max_ttl: i64,
        streams_wrt: Arc<WeakRegistry<StreamEndpoint>>,
    ) -> Self {
        Self {
            id,
            side,
            pipe_kind,
            peer_stream_id: AtomicU64::new(NONE_ID),
            streams_wrt,
            laddr,
            socket: ArcSwapOption::empty(),
            remote: Mutex::new(RemoteState::new()),
            weak: AtomicBool::new(false),
            asymmetric: AtomicBool::new(false),
            on_hold: AtomicBool::new(false),
            codecs: Mutex::new(None),
            ptime: Mutex::new(None),
            resizer: Mutex::new(None),
            ttl: crate::ttl::Ttl::new(max_ttl),
            counters: StreamCounters::new(),
            catch_dtmf_data: ArcSwapOption::empty(),
            observers: Arc::new(PacketObserverManager::new()),
        }
    }

    pub fn laddr(&self) -> SocketAddr {
        self.laddr
    }

    pub fn get_actor(&self) -> &'static str {
        self.side.actor()
    }

    pub fn get_skt(&self) -> Option<Arc<UdpSocket>> {
        self.socket.load_full()
    }

    /// Install a new socket, releasing the previous one's reference.
    pub fn set_skt(&self, sock: UdpSocket) {
        self.socket.store(Some(Arc::new(sock)));
    }

    /// Set or replace the pending remote destination supplied by the
    /// control plane. If the stream is already latched/locked and the
    /// new address differs, the swap is deferred rather than applied
    /// immediately — the live latch still wins until the control plane
    /// confirms it via [`apply_pending_swap`](Self::apply_pending_swap).
    pub fn prefill_addr(&self, addr: SocketAddr) {
        let mut remote = self.remote.lock();
        match remote.latch {
            LatchState::Unlatched => remote.pending_dest = Some(addr),
            LatchState::Latched | LatchState::Locked => {
                if remote.effective_remote() == Some(addr) {
                    remote.pending_swap = None;
                } else {
                    remote.pending_swap = Some(addr);
                }
            }
        }
    }

    /// Commit a destination swap queued by `prefill_addr` while the
    /// stream was already latched/locked. Called once the control
    /// plane has confirmed the command that requested it.
    pub fn apply_pending_swap(&self) {
        let mut remote = self.remote.lock();
        if let Some(addr) = remote.pending_swap.take() {
            remote.confirmed_dest = Some(addr);
            remote.last_source = Some(addr);
        }
    }

    /// Enter locked (asymmetric) state. If a source has already been
    /// latched, it is frozen now; otherwise the next received packet
    /// becomes the frozen source.
    pub fn locklatch(&self) {
        let mut remote = self.remote.lock();
        if remote.last_source.is_some() {
            remote.latch = LatchState::Locked;
        } else {
            remote.lock_on_next = true;
        }
    }

    pub fn reg_onhold(&self) {
        self.on_hold.store(true, Ordering::Relaxed);
    }

    pub fn get_remaining_ttl(&self) -> i64 {
        self.ttl.get_remaining()
    }

    pub fn reset_ttl(&self) {
        self.ttl.reset();
    }

    pub fn reset_ttl_with(&self, max_seconds: i64) {
        self.ttl.reset_with(max_seconds);
    }

    pub fn set_codecs(&self, codecs: Option<Vec<u8>>) {
        *self.codecs.lock() = codecs;
    }

    pub fn codecs(&self) -> Option<Vec<u8>> {
        self.codecs.lock().clone()
    }

    /// Set or clear the resizer for this stream's outbound ptime.
    /// (Applied to the *opposite* side per the command engine's step 6
    /// — packets this stream forwards toward its peer get re-chunked;
    /// the caller passes the already-resolved ptime.)
    pub fn set_ptime(&self, ptime_ms: Option<u32>, samples_per_ms: u32, ssrc: u32) {
        *self.ptime.lock() = ptime_ms;
        let mut resizer = self.resizer.lock();
        match (ptime_ms, resizer.as_mut()) {
            (Some(pt), Some(r)) => r.set_ptime(pt),
            (Some(pt), None) => *resizer = Some(RtpResizer::new(pt, samples_per_ms, ssrc)),
            (None, _) => *resizer = None,
        }
    }

    pub fn ptime(&self) -> Option<u32> {
        *self.ptime.lock()
    }

    pub fn has_resizer(&self) -> bool {
        self.resizer.lock().is_some()
    }

    /// Resolve the peer stream in the same pipe, if it's still alive.
    pub fn peer(&self) -> Option<Arc<StreamEndpoint>> {
        let id = self.peer_stream_id.load(Ordering::Relaxed);
        self.streams_wrt.lookup(id)
    }

    fn accept_source(&self, remote: &mut RemoteState, src: SocketAddr) -> bool {
        match remote.latch {
            LatchState::Unlatched => {
                remote.last_source = Some(src);
                remote.confirmed_dest = Some(src);
                remote.latch = if remote.lock_on_next {
                    LatchState::Locked
                } else {
                    LatchState::Latched
                };
                true
            }
            LatchState::Latched => {
                remote.last_source = Some(src);
                remote.confirmed_dest = Some(src);
                true
            }
            LatchState::Locked => remote.last_source == Some(src),
        }
    }

    /// Packet arrival at this stream: update the latch, bump counters,
    /// and forward to the peer's socket at the peer's effective remote
    /// address. Returns `true` if the packet was actually forwarded
    /// (on-hold and rejected-source cases return `false` but still
    /// count the packet).
    pub fn handle_inbound(&self, payload: &[u8], src: SocketAddr, now_mono: i64) -> bool {
        let accepted = {
            let mut remote = self.remote.lock();
            self.accept_source(&mut remote, src)
        };

        if !accepted {
            self.counters.rx_errors.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.counters.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.ttl.reset();
        let _ = now_mono;

        let header = crate::rtp::RtpHeader::parse(payload);

        if let Some(dtmf) = self.catch_dtmf_data.load_full() {
            if let Some((hdr, off)) = &header {
                if dtmf.tastes(hdr.pt) {
                    if let Some(notification) = dtmf.push(hdr.timestamp, &payload[*off..], self.side.index() as u8)
                    {
                        info!(notification = %notification.format(), "dtmf digit detected");
                    }
                }
            }
        }

        self.observers.dispatch(&PacketCtx {
            payload,
            src,
            pt: header.as_ref().map(|(h, _)| h.pt),
            rtp_timestamp: header.as_ref().map(|(h, _)| h.timestamp),
            side: self.side.actor(),
            stream_id: self.id,
        });

        if self.on_hold.load(Ordering::Relaxed) {
            return false;
        }

        let Some(peer) = self.peer() else {
            return false;
        };
        let Some(dest) = peer.remote.lock().effective_remote() else {
            return false;
        };
        let Some(peer_socket) = peer.get_skt() else {
            return false;
        };

        let chunks = {
            let mut resizer = self.resizer.lock();
            match resizer.as_mut() {
                Some(r) => match &header {
                    Some((hdr, off)) => r.push(hdr.pt, hdr.timestamp, &payload[*off..]),
                    None => vec![payload.to_vec()],
                },
                None => vec![payload.to_vec()],
            }
        };

        let mut all_ok = true;
        for chunk in &chunks {
            if peer_socket.send_to(chunk, dest).is_err() {
                all_ok = false;
            }
        }
        if all_ok {
            peer.counters.tx_packets.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.counters.rx_errors.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Current latch state, for tests and diagnostics.
    pub fn latch_state(&self) -> LatchState {
        self.remote.lock().latch
    }

    pub fn effective_remote(&self) -> Option<SocketAddr> {
        self.remote.lock().effective_remote()
    }
}

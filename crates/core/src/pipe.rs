//! Pipe (C4): one RTP or RTCP duplex, owning both of its streams'
//! strong references and wiring their `peer_stream_id`s together so
//! each stream can resolve the other without a direct cycle (see
//! [`weakref`](crate::weakref)).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::stream::{PipeKind, Side, StreamEndpoint};
use crate::weakref::WeakRegistry;

pub struct Pipe {
    pub kind: PipeKind,
    pub caller: Arc<StreamEndpoint>,
    pub callee: Arc<StreamEndpoint>,
}

impl Pipe {
    /// Build a pipe from two freshly-allocated streams, registering
    /// them in `streams_wrt` and cross-wiring their peer ids.
    pub fn new(
        kind: PipeKind,
        caller_laddr: SocketAddr,
        callee_laddr: SocketAddr,
        max_ttl: i64,
        streams_wrt: &Arc<WeakRegistry<StreamEndpoint>>,
    ) -> Self {
        let caller_id = crate::weakref::next_id();
        let callee_id = crate::weakref::next_id();

        let caller = Arc::new(StreamEndpoint::new(
            caller_id,
            Side::Caller,
            kind,
            caller_laddr,
            max_ttl,
            streams_wrt.clone(),
        ));
        let callee = Arc::new(StreamEndpoint::new(
            callee_id,
            Side::Callee,
            kind,
            callee_laddr,
            max_ttl,
            streams_wrt.clone(),
        ));

        streams_wrt.register(caller_id, &caller);
        streams_wrt.register(callee_id, &callee);
        caller.peer_stream_id.store(callee_id, Ordering::Relaxed);
        callee.peer_stream_id.store(caller_id, Ordering::Relaxed);

        Self {
            kind,
            caller,
            callee,
        }
    }

    pub fn stream(&self, side: Side) -> &Arc<StreamEndpoint> {
        match side {
            Side::Caller => &self.caller,
            Side::Callee => &self.callee,
        }
    }

    /// Combined remaining TTL: the pipe expires as soon as either side
    /// goes silent, so this is the minimum of the two.
    pub fn get_ttl(&self) -> i64 {
        self.caller
            .get_remaining_ttl()
            .min(self.callee.get_remaining_ttl())
    }

    /// Total packets forwarded across both directions of this pipe.
    pub fn packet_count(&self) -> u64 {
        self.caller.counters.tx_packets.load(Ordering::Relaxed)
            + self.callee.counters.tx_packets.load(Ordering::Relaxed)
    }

    pub fn drop_registrations(&self, streams_wrt: &WeakRegistry<StreamEndpoint>) {
        streams_wrt.unregister(self.caller.id);
        streams_wrt.unregister(self.callee.id);
    }
}

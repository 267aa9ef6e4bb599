//! # rtpproxy-core — userspace RTP/RTCP relay engine
//!
//! A media relay that sits between two SIP-signalled endpoints,
//! forwarding RTP/RTCP packets without decoding or transcoding them.
//! A control channel (driven by a SIP proxy's dialog engine) issues
//! `UPDATE`/`LOOKUP` commands that create, find, and mutate the
//! per-call relay state; the data plane forwards packets according to
//! that state with no per-packet control-channel involvement.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Relay            — control-channel orchestrator│
//! │  CommandEngine     — UPDATE/LOOKUP handling      │
//! ├───────────────────────────────────────────────┤
//! │  SessionRegistry  — call-id keyed lookup table   │
//! │  Session          — one dialog's pipes + tags    │
//! │  Pipe             — one RTP or RTCP duplex        │
//! │  StreamEndpoint   — one socket's send/recv state  │
//! ├───────────────────────────────────────────────┤
//! │  WeakRegistry     — id-indirected weak references │
//! │  WorkQueue        — bounded per-module queue      │
//! │  ModuleRegistry   — statically-linked modules     │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Relay`] orchestrator: control loop, TTL scanner.
//! - [`command`] — UPDATE/LOOKUP engine, modifier grammar, replies.
//! - [`registry`] — [`registry::SessionRegistry`], call-id lookup.
//! - [`session`] — [`session::Session`], dialog identity and pipes.
//! - [`pipe`] — [`pipe::Pipe`], one RTP/RTCP duplex's two streams.
//! - [`stream`] — [`stream::StreamEndpoint`], latch state, forwarding.
//! - [`dtmf`] — RFC 4733 DTMF detection (C8).
//! - [`observer`] — packet observer taps (C7).
//! - [`module`] — statically-linked module interface (C10).
//! - [`weakref`] — [`weakref::WeakRegistry`], the id-based weak kernel (C1).
//! - [`queue`] — [`queue::WorkQueue`], bounded MPMC work queue (C2).
//! - [`rtp`] / [`resizer`] — RTP/DTMF wire codecs, ptime re-packetisation.
//! - [`config`] — [`config::Config`], TOML-loadable runtime settings.
//! - [`wire`] — control-channel line tokenizer.
//! - [`net`] — RTP/RTCP port-pair allocation.
//! - [`error`] — [`RtpProxyError`] enum and [`Result`] alias.

pub mod command;
pub mod config;
pub mod dtmf;
pub mod error;
pub mod module;
pub mod net;
pub mod observer;
pub mod pipe;
pub mod queue;
pub mod registry;
pub mod resizer;
pub mod rtp;
pub mod server;
pub mod session;
pub mod stream;
pub mod ttl;
pub mod urlcodec;
pub mod weakref;
pub mod wire;

pub use error::{Result, RtpProxyError};
pub use registry::SessionRegistry;
pub use server::Relay;
pub use session::Session;

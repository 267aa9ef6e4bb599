//! UPDATE/LOOKUP command engine (C9): the control-plane entry point
//! that creates, finds, and mutates sessions in response to the
//! relay's two workhorse commands, steps numbered to match the
//! decision table they're grounded on.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::command::options::{InterfaceSlot, UlOpts, parse_ul_opts};
use crate::command::reply::UlReply;
use crate::config::{Config, ShutdownState};
use crate::error::{ParseErrorKind, RtpProxyError};
use crate::net::allocate_port_pair;
use crate::pipe::Pipe;
use crate::registry::SessionRegistry;
use crate::session::{NotifyTarget, Session};
use crate::stream::{PipeKind, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOp {
    Update,
    Lookup,
}

#[derive(Debug, Clone)]
pub struct UlCommand {
    pub op: CommandOp,
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: Option<String>,
    pub modifiers: String,
    pub addr: Option<String>,
    pub port: Option<String>,
    /// Notify-socket/tag, already split from the command line's extra
    /// positional fields by the line tokenizer ahead of this engine.
    pub notify: Option<(String, String)>,
}

pub struct CommandEngine {
    config: Arc<Config>,
    shutdown: Arc<ShutdownState>,
    registry: Arc<SessionRegistry>,
    warned_fd_threshold: AtomicBool,
}

fn is_null_addr(addr: &IpAddr) -> bool {
    addr.is_unspecified()
}

impl CommandEngine {
    pub fn new(config: Arc<Config>, shutdown: Arc<ShutdownState>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            shutdown,
            registry,
            warned_fd_threshold: AtomicBool::new(false),
        }
    }

    /// Step 2: resolve the local bind address for this side, honoring
    /// explicit overrides before falling back to address-family
    /// matching against the configured bind addresses.
    fn resolve_local_addr(&self, opts: &UlOpts) -> Result<IpAddr, RtpProxyError> {
        if let Some(lit) = &opts.local_addr_literal {
            return lit.parse().map_err(|_| RtpProxyError::Parse {
                kind: ParseErrorKind::BadLocalAddr,
            });
        }
        if let Some(lit) = &opts.remote_addr_literal {
            // Route-lookup substitute: pick whichever configured bind
            // address shares the literal's address family.
            let remote: IpAddr = lit.parse().map_err(|_| RtpProxyError::Parse {
                kind: ParseErrorKind::BadRemoteAddr,
            })?;
            return self.addr_for_family(remote.is_ipv6()).ok_or(RtpProxyError::Parse {
                kind: ParseErrorKind::BadRemoteAddr,
            });
        }
        if let Some(slot) = opts.local_addr_slot {
            return match slot {
                InterfaceSlot::Primary => Ok(self.config.bind_addr_primary),
                InterfaceSlot::Secondary => self.config.bind_addr_secondary.ok_or(RtpProxyError::Parse {
                    kind: ParseErrorKind::BadLocalAddr,
                }),
            };
        }
        if opts.force_ipv6 != self.config.bind_addr_primary.is_ipv6() {
            return self.addr_for_family(opts.force_ipv6).ok_or(RtpProxyError::Parse {
                kind: ParseErrorKind::BadLocalAddr,
            });
        }
        Ok(self.config.bind_addr_primary)
    }

    fn addr_for_family(&self, want_v6: bool) -> Option<IpAddr> {
        let candidates = [Some(self.config.bind_addr_primary), self.config.bind_addr_secondary];
        candidates.into_iter().flatten().find(|a| a.is_ipv6() == want_v6)
    }

    /// Step 3: resolve the positional `addr port` into a concrete
    /// destination, or detect the "null" (unspecified) placeholder
    /// meaning "put this side on hold".
    fn resolve_remote(&self, opts: &UlOpts) -> Result<(Option<SocketAddr>, bool), RtpProxyError> {
        let (Some(addr), Some(port)) = (&opts.remote_addr, opts.remote_port) else {
            return Ok((None, false));
        };
        let ip: IpAddr = addr.parse().map_err(|_| RtpProxyError::Parse {
            kind: ParseErrorKind::BadRemoteAddr,
        })?;
        if is_null_addr(&ip) {
            return Ok((None, true));
        }
        Ok((Some(SocketAddr::new(ip, port)), false))
    }

    fn warn_if_near_fd_budget(&self) {
        let threshold = self.config.fd_warn_threshold_sessions();
        if self.registry.len() >= threshold {
            if !self.warned_fd_threshold.swap(true, Ordering::Relaxed) {
                warn!(sessions = self.registry.len(), threshold, "approaching open-session budget");
            }
        } else {
            self.warned_fd_threshold.store(false, Ordering::Relaxed);
        }
    }

    /// Handle one UPDATE or LOOKUP command end to end.
    pub fn handle(&self, cmd: UlCommand) -> Result<UlReply, RtpProxyError> {
        let opts = parse_ul_opts(
            &cmd.modifiers,
            cmd.addr.as_deref(),
            cmd.port.as_deref(),
            cmd.notify.as_ref().map(|(s, t)| (s.as_str(), t.as_str())),
            self.config.force_asymmetric,
        )?;

        let local_addr = self.resolve_local_addr(&opts)?;
        let (remote, on_hold) = self.resolve_remote(&opts)?;
        let side = if cmd.to_tag.is_none() { Side::Caller } else { Side::Callee };

        let existing = self
            .registry
            .find(&cmd.call_id, &cmd.from_tag, cmd.to_tag.as_deref());

        let session = match existing {
            Some(session) => {
                // Step 4: session found. Ensure a listener exists for
                // this side, (re)allocating if asked or absent.
                let pipe_stream = session.rtp.stream(side);
                let need_new = opts.new_port || pipe_stream.get_skt().is_none();
                if need_new {
                    let (rtp_sock, rtcp_sock) =
                        allocate_port_pair(local_addr, self.config.port_min, self.config.port_max)?;
                    session.rtp.stream(side).set_skt(rtp_sock);
                    session.rtcp.stream(side).set_skt(rtcp_sock);
                    session.rtp.stream(side).reset_ttl_with(self.config.max_ttl);
                    session.rtcp.stream(side).reset_ttl_with(self.config.max_ttl);
                }
                if cmd.to_tag.is_some() && session.to_tag().is_none() {
                    session.set_to_tag(cmd.to_tag.clone().unwrap());
                    self.registry.note_complete();
                }
                session
            }
            None => {
                // Step 5: session not found — only UPDATE may create one.
                if cmd.op != CommandOp::Update {
                    return Err(RtpProxyError::SessionNotFound(cmd.call_id.clone()));
                }
                if self.shutdown.is_slow_shutdown() {
                    return Err(RtpProxyError::SlowShutdown);
                }
                if self.registry.len() >= self.config.overload_threshold {
                    return Err(RtpProxyError::Overload);
                }

                let (rtp_sock, rtcp_sock) =
                    allocate_port_pair(local_addr, self.config.port_min, self.config.port_max)?;

                let rtp = Pipe::new(
                    PipeKind::Rtp,
                    rtp_sock.local_addr()?,
                    rtp_sock.local_addr()?,
                    self.config.max_ttl,
                    &self.registry.streams,
                );
                let rtcp = Pipe::new(
                    PipeKind::Rtcp,
                    rtcp_sock.local_addr()?,
                    rtcp_sock.local_addr()?,
                    self.config.max_ttl,
                    &self.registry.streams,
                );
                rtp.stream(side).set_skt(rtp_sock);
                rtcp.stream(side).set_skt(rtcp_sock);

                let session_id = crate::weakref::next_id();
                let session = Arc::new(Session::new(session_id, cmd.call_id.clone(), cmd.from_tag.clone(), rtp, rtcp));
                if let Some(tt) = &cmd.to_tag {
                    session.set_to_tag(tt.clone());
                }
                self.registry.insert(session.clone());
                self.warn_if_near_fd_budget();
                info!(call_id = %cmd.call_id, %session_id, "session created");
                session
            }
        };

        // Step 6: side-specific mutations.
        let rtp_stream = session.rtp.stream(side);
        let rtcp_stream = session.rtcp.stream(side);

        if let Some((socket, tag)) = &cmd.notify {
            session.set_timeout_notify(NotifyTarget {
                socket_name: socket.clone(),
                tag: tag.clone(),
            });
        }
        if let Some(dest) = remote {
            rtp_stream.prefill_addr(dest);
            let rtcp_dest = SocketAddr::new(dest.ip(), dest.port() + 1);
            rtcp_stream.prefill_addr(rtcp_dest);
        }
        if on_hold {
            rtp_stream.reg_onhold();
            rtcp_stream.reg_onhold();
        }
        if opts.asymmetric {
            rtp_stream.locklatch();
            rtcp_stream.locklatch();
        }
        if opts.weak {
            session.mark_weak(side);
        }
        if let Some(codecs) = &opts.codecs {
            rtp_stream.set_codecs(Some(codecs.clone()));
        }
        if let Some(ptime) = opts.requested_ptime {
            // The resizer lives on the *opposite* side's stream: that's
            // the one whose forwarding step feeds packets toward this side.
            let samples_per_ms = 8; // G.711-class default; codec-aware rates are a module concern.
            session.rtp.stream(side.other()).set_ptime(Some(ptime), samples_per_ms, 0);
        }

        // This command completing is what "control confirms" means for a
        // destination swap queued against an already-latched stream.
        rtp_stream.apply_pending_swap();
        rtcp_stream.apply_pending_swap();

        // Step 7: emit reply.
        let (port, addr) = match rtp_stream.get_skt() {
            Some(sock) => {
                let local = sock.local_addr()?;
                (local.port(), Some(local.ip()))
            }
            None => (0, None),
        };
        Ok(UlReply {
            port,
            addr,
            addr_override: self.config.advertised_addr.map(|a| a.to_string()),
            subc_res: None,
        })
    }
}

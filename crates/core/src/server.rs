//! Relay orchestrator: owns the control-channel UDP socket, the
//! command engine, the session registry, and the TTL-scanning
//! background thread. Shape mirrors a typical accept-loop server —
//! `start`/`stop`/`is_running` plus a spawned background thread — just
//! over a connectionless UDP control channel instead of TCP.

use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::command::CommandEngine;
use crate::config::{Config, ShutdownState};
use crate::error::{Result, RtpProxyError};
use crate::registry::SessionRegistry;
use crate::wire::parse_line;

/// How often the TTL scanner wakes up to tick every session's streams.
const TTL_SCAN_INTERVAL: Duration = Duration::from_secs(1);

pub struct Relay {
    config: Arc<Config>,
    shutdown: Arc<ShutdownState>,
    registry: Arc<SessionRegistry>,
    engine: Arc<CommandEngine>,
    running: Arc<AtomicBool>,
    control_socket: Option<Arc<UdpSocket>>,
}

impl Relay {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let shutdown = Arc::new(ShutdownState::new());
        let registry = Arc::new(SessionRegistry::new());
        let engine = Arc::new(CommandEngine::new(config.clone(), shutdown.clone(), registry.clone()));
        Self {
            config,
            shutdown,
            registry,
            engine,
            running: Arc::new(AtomicBool::new(false)),
            control_socket: None,
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the control socket and spawn the control-loop and
    /// TTL-scanner threads.
    pub fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RtpProxyError::Protocol("relay already running".into()));
        }

        let socket = UdpSocket::bind(self.config.control_addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(200)))?;
        let socket = Arc::new(socket);
        self.control_socket = Some(socket.clone());

        info!(addr = %self.config.control_addr, "control channel listening");

        let running = self.running.clone();
        let engine = self.engine.clone();
        let control_sock = socket.clone();
        thread::Builder::new()
            .name("control-loop".into())
            .spawn(move || control_loop(control_sock, engine, running))
            .expect("failed to spawn control-loop thread");

        let running = self.running.clone();
        let registry = self.registry.clone();
        thread::Builder::new()
            .name("ttl-scanner".into())
            .spawn(move || ttl_scan_loop(registry, running))
            .expect("failed to spawn ttl-scanner thread");

        Ok(())
    }

    /// Enter slow-shutdown: stop accepting new sessions, but keep
    /// serving and expiring the ones already in flight.
    pub fn begin_slow_shutdown(&self) {
        warn!("entering slow shutdown");
        self.shutdown.begin_slow_shutdown();
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        info!("relay stopping");
    }
}

fn control_loop(socket: Arc<UdpSocket>, engine: Arc<CommandEngine>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 8192];
    while running.load(Ordering::SeqCst) {
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                error!(error = %e, "control socket recv failed");
                continue;
            }
        };
        let Ok(line) = std::str::from_utf8(&buf[..n]) else {
            continue;
        };
        let reply_text = match parse_line(line) {
            Ok(parsed) => match engine.handle(parsed.command) {
                Ok(reply) => format!("{} {}\n", parsed.cookie, reply.format()),
                Err(e) => format!("{} {}\n", parsed.cookie, crate::command::reply::format_error(e.code())),
            },
            Err(e) => {
                warn!(error = %e, %src, "malformed control-channel line");
                continue;
            }
        };
        let _ = socket.send_to(reply_text.as_bytes(), src);
    }
}

fn ttl_scan_loop(registry: Arc<SessionRegistry>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(TTL_SCAN_INTERVAL);
        for session in registry.all_sessions() {
            session.rtp.caller.ttl.tick();
            session.rtp.callee.ttl.tick();
            session.rtcp.caller.ttl.tick();
            session.rtcp.callee.ttl.tick();
            if session.get_ttl() <= 0 {
                if let Some(target) = session.take_timeout_notify() {
                    fire_timeout_notify(&target);
                }
                registry.note_timeout();
                registry.remove(&session);
                info!(call_id = %session.call_id, "session expired");
            }
        }
    }
}

/// Best-effort delivery of a timeout notification. `socket_name` is a
/// `udp:host:port` token; anything else is logged and dropped (unix
/// sockets and other transports are a module concern, not the core).
fn fire_timeout_notify(target: &crate::session::NotifyTarget) {
    let Some(rest) = target.socket_name.strip_prefix("udp:") else {
        warn!(target = %target.socket_name, "unsupported notify socket scheme");
        return;
    };
    let Ok(sock) = UdpSocket::bind("0.0.0.0:0") else {
        return;
    };
    let msg = format!("{} DTMF\n", target.tag);
    let _ = sock.send_to(msg.as_bytes(), rest);
}

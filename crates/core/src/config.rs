//! Runtime configuration, loadable from a TOML file and overridable by
//! CLI flags (the CLI binary merges the two; see `rtpproxy::config::Config::merge_cli`).

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

fn default_port_min() -> u16 {
    35000
}

fn default_port_max() -> u16 {
    65000
}

fn default_max_ttl() -> i64 {
    60
}

fn default_overload_threshold() -> usize {
    10_000
}

fn default_max_open_fds() -> usize {
    4096
}

/// Static (file/CLI-sourced) configuration. Runtime-mutable knobs
/// (slow-shutdown) live alongside it as atomics rather than in here,
/// so a `&Config` can be shared freely without a lock.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr_primary: IpAddr,
    pub bind_addr_secondary: Option<IpAddr>,
    /// Address advertised to callers/callees in replies, when it
    /// differs from `bind_addr_primary` (e.g. NAT/public-IP deployments).
    pub advertised_addr: Option<IpAddr>,
    pub control_addr: std::net::SocketAddr,

    #[serde(default = "default_port_min")]
    pub port_min: u16,
    #[serde(default = "default_port_max")]
    pub port_max: u16,
    #[serde(default = "default_max_ttl")]
    pub max_ttl: i64,
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: usize,
    #[serde(default = "default_max_open_fds")]
    pub max_open_fds: usize,
    /// Force asymmetric latching on every session unless cleared with
    /// `s`/`S` (the `aforce` knob).
    #[serde(default)]
    pub force_asymmetric: bool,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::RtpProxyError> {
        toml::from_str(s).map_err(|e| crate::error::RtpProxyError::Protocol(format!("bad config: {e}")))
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::error::RtpProxyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 80% of the soft fd budget (5 fds per session, per the original
    /// warning threshold), used to log once when the session count
    /// crosses it.
    pub fn fd_warn_threshold_sessions(&self) -> usize {
        (self.max_open_fds / 5) * 8 / 10
    }

    /// Apply CLI overrides on top of a file-loaded (or default)
    /// configuration. `None` fields leave the existing value in place.
    #[allow(clippy::too_many_arguments)]
    pub fn merge_cli(
        mut self,
        control_addr: Option<std::net::SocketAddr>,
        rtp_addr: Option<IpAddr>,
        max_ttl: Option<i64>,
        max_open_fds: Option<usize>,
    ) -> Self {
        if let Some(addr) = control_addr {
            self.control_addr = addr;
        }
        if let Some(addr) = rtp_addr {
            self.bind_addr_primary = addr;
        }
        if let Some(ttl) = max_ttl {
            self.max_ttl = ttl;
        }
        if let Some(fds) = max_open_fds {
            self.max_open_fds = fds;
        }
        self
    }

    /// A minimal default configuration, used when no `--config` file
    /// is given and every other setting comes from CLI flags.
    pub fn minimal(control_addr: std::net::SocketAddr, bind_addr_primary: IpAddr) -> Self {
        Self {
            bind_addr_primary,
            bind_addr_secondary: None,
            advertised_addr: None,
            control_addr,
            port_min: default_port_min(),
            port_max: default_port_max(),
            max_ttl: default_max_ttl(),
            overload_threshold: default_overload_threshold(),
            max_open_fds: default_max_open_fds(),
            force_asymmetric: false,
        }
    }
}

/// Runtime-mutable shutdown state, checked by the command engine on
/// every new-session attempt.
pub struct ShutdownState {
    slow_shutdown: AtomicBool,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            slow_shutdown: AtomicBool::new(false),
        }
    }

    pub fn begin_slow_shutdown(&self) {
        self.slow_shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_slow_shutdown(&self) -> bool {
        self.slow_shutdown.load(Ordering::Relaxed)
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

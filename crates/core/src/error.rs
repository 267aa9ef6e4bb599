//! Error types for the relay engine.

use std::fmt;

/// Errors that can occur anywhere in the relay engine.
///
/// Variants map to the error taxonomy of the control-plane command
/// engine and the data-plane forwarding path:
///
/// - **Parse**: malformed request, bad URL-encoding, bad option syntax,
///   bad address literal, invalid ptime.
/// - **Resolve**: address resolution failure, no local route to remote.
/// - **Resource**: listener allocation failed, port range exhausted.
/// - **Policy**: notification socket required but disabled, overload
///   protection, slow-shutdown in effect.
/// - **Protocol**: DTMF event out of range, RTP from a non-latched
///   source while locked.
#[derive(Debug, thiserror::Error)]
pub enum RtpProxyError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed control-protocol command.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Address resolution or routing failure.
    #[error("resolve error: {0}")]
    Resolve(String),

    /// No session with the given call-id/tag pair exists.
    #[error("session not found: call-id {0}")]
    SessionNotFound(String),

    /// UDP listener allocation failed (fd/port exhaustion).
    #[error("listener allocation failed: {0}")]
    ListenerFailed(String),

    /// Notification socket name did not resolve to a configured target.
    #[error("notification socket not enabled or unknown: {0}")]
    NotifyTargetUnknown(String),

    /// The relay is in slow-shutdown (deorbiting) mode; new sessions are rejected.
    #[error("proxy is shutting down, new session rejected")]
    SlowShutdown,

    /// The relay is over its configured overload threshold.
    #[error("proxy is overloaded, new session rejected")]
    Overload,

    /// A received RTP/RTCP packet violated a protocol invariant (e.g. a
    /// DTMF event id outside `0..=16`, or a source mismatch on a locked latch).
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl RtpProxyError {
    /// Numeric error code returned in a control-protocol reply (`E<code>`),
    /// matching the `ECODE_*` family the command engine is grounded on.
    pub fn code(&self) -> u16 {
        match self {
            RtpProxyError::Parse { kind } => kind.code(),
            RtpProxyError::Resolve(_) => 20,
            RtpProxyError::SessionNotFound(_) => 21,
            RtpProxyError::ListenerFailed(_) => 30,
            RtpProxyError::NotifyTargetUnknown(_) => 40,
            RtpProxyError::SlowShutdown => 50,
            RtpProxyError::Overload => 51,
            RtpProxyError::Protocol(_) => 60,
            RtpProxyError::Io(_) => 31,
        }
    }
}

/// Specific kind of control-protocol parse failure, numbered to match
/// the `ECODE_PARSE_*` family the command grammar is grounded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Command line had too few fields.
    ShortCommand,
    /// Unknown command modifier character (logged, not fatal, but
    /// surfaced here for the `z`/`c`/`l`/`r` variants that must parse).
    BadModifier,
    /// `z<digits>` requested ptime was not a positive integer.
    BadPtime,
    /// `c<digits>(,<digits>)*` codec list was empty or malformed.
    BadCodecList,
    /// `l<addr>` local address literal did not resolve.
    BadLocalAddr,
    /// `r<addr>` remote address literal did not resolve, or no local
    /// route could be found for it.
    BadRemoteAddr,
    /// Notify-tag failed URL decoding.
    BadUrlEncoding,
    /// A subcommand's own argument grammar was invalid.
    BadSubcommand,
}

impl ParseErrorKind {
    fn code(self) -> u16 {
        match self {
            ParseErrorKind::ShortCommand => 1,
            ParseErrorKind::BadModifier => 2,
            ParseErrorKind::BadPtime => 13,
            ParseErrorKind::BadCodecList => 14,
            ParseErrorKind::BadLocalAddr => 15,
            ParseErrorKind::BadRemoteAddr => 16,
            ParseErrorKind::BadUrlEncoding => 10,
            ParseErrorKind::BadSubcommand => 17,
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortCommand => write!(f, "command has too few arguments"),
            Self::BadModifier => write!(f, "unknown command modifier"),
            Self::BadPtime => write!(f, "invalid ptime"),
            Self::BadCodecList => write!(f, "invalid codec list"),
            Self::BadLocalAddr => write!(f, "invalid local address"),
            Self::BadRemoteAddr => write!(f, "invalid remote address"),
            Self::BadUrlEncoding => write!(f, "invalid URL encoding"),
            Self::BadSubcommand => write!(f, "invalid subcommand syntax"),
        }
    }
}

/// Convenience alias for `Result<T, RtpProxyError>`.
pub type Result<T> = std::result::Result<T, RtpProxyError>;

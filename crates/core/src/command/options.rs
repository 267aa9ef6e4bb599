//! `UlOpts`: the modifier-letter grammar shared by the UPDATE/LOOKUP
//! family of control commands, grounded on the `ul_opts` parser —
//! each letter in the command's first word after the opcode toggles
//! or supplies one piece of per-call state.

use crate::error::{ParseErrorKind, RtpProxyError};
use crate::urlcodec;

/// Which secondary local interface slot (`e`/`i`) an `E`/`I` modifier
/// should bind to, mirroring the original's two-interface `bindaddr`
/// pair (a primary address and an optional secondary, e.g. for
/// dual-stack or multihomed deployments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceSlot {
    Primary,
    Secondary,
}

#[derive(Debug, Clone)]
pub struct UlOpts {
    pub asymmetric: bool,
    pub weak: bool,
    pub requested_ptime: Option<u32>,
    pub codecs: Option<Vec<u8>>,
    pub remote_addr: Option<String>,
    pub remote_port: Option<u16>,
    pub force_ipv6: bool,
    pub new_port: bool,
    pub local_addr_slot: Option<InterfaceSlot>,
    pub local_addr_literal: Option<String>,
    pub remote_addr_literal: Option<String>,
    pub notify_socket: Option<String>,
    pub notify_tag: Option<String>,
}

impl UlOpts {
    fn empty(default_asymmetric: bool) -> Self {
        Self {
            asymmetric: default_asymmetric,
            weak: false,
            requested_ptime: None,
            codecs: None,
            remote_addr: None,
            remote_port: None,
            force_ipv6: false,
            new_port: false,
            local_addr_slot: None,
            local_addr_literal: None,
            remote_addr_literal: None,
            notify_socket: None,
            notify_tag: None,
        }
    }
}

/// Parse the modifier letters following the command opcode (e.g.
/// `"Uwz20c0,8"` once the leading `U` is stripped), plus the
/// positional address/port and optional notify socket/tag.
///
/// `default_asymmetric` comes from the relay's global `aforce`
/// configuration knob — some deployments force asymmetric mode on
/// every call unless explicitly cleared with `s`/`S`.
pub fn parse_ul_opts(
    modifiers: &str,
    remote_addr: Option<&str>,
    remote_port: Option<&str>,
    notify: Option<(&str, &str)>,
    default_asymmetric: bool,
) -> Result<UlOpts, RtpProxyError> {
    let mut opts = UlOpts::empty(default_asymmetric);
    opts.remote_addr = remote_addr.map(str::to_string);
    opts.remote_port = match remote_port {
        Some(p) => Some(p.parse().map_err(|_| RtpProxyError::Parse {
            kind: ParseErrorKind::BadRemoteAddr,
        })?),
        None => None,
    };

    if let Some((socket, raw_tag)) = notify {
        let tag = urlcodec::decode(raw_tag).map_err(|_| RtpProxyError::Parse {
            kind: ParseErrorKind::BadUrlEncoding,
        })?;
        opts.notify_socket = Some(socket.to_string());
        opts.notify_tag = Some(tag);
    }

    let chars: Vec<char> = modifiers.chars().collect();
    let mut i = 0;
    let mut slot_next = InterfaceSlot::Secondary;
    while i < chars.len() {
        match chars[i] {
            'a' | 'A' => opts.asymmetric = true,
            's' | 'S' => opts.asymmetric = false,
            'w' | 'W' => opts.weak = true,
            '6' => opts.force_ipv6 = true,
            'n' | 'N' => opts.new_port = true,
            'e' | 'E' => {
                opts.local_addr_slot = Some(slot_next);
                slot_next = InterfaceSlot::Primary;
            }
            'i' | 'I' => {
                opts.local_addr_slot = Some(InterfaceSlot::Primary);
            }
            'z' | 'Z' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                if j == start {
                    return Err(RtpProxyError::Parse {
                        kind: ParseErrorKind::BadPtime,
                    });
                }
                let digits: String = chars[start..j].iter().collect();
                let ptime: u32 = digits.parse().map_err(|_| RtpProxyError::Parse {
                    kind: ParseErrorKind::BadPtime,
                })?;
                if ptime == 0 {
                    return Err(RtpProxyError::Parse {
                        kind: ParseErrorKind::BadPtime,
                    });
                }
                opts.requested_ptime = Some(ptime);
                i = j - 1;
            }
            'c' | 'C' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == ',') {
                    j += 1;
                }
                if j == start {
                    return Err(RtpProxyError::Parse {
                        kind: ParseErrorKind::BadCodecList,
                    });
                }
                let list: String = chars[start..j].iter().collect();
                let codecs: Result<Vec<u8>, _> =
                    list.split(',').filter(|s| !s.is_empty()).map(|s| s.parse::<u8>()).collect();
                let codecs = codecs.map_err(|_| RtpProxyError::Parse {
                    kind: ParseErrorKind::BadCodecList,
                })?;
                if codecs.is_empty() {
                    return Err(RtpProxyError::Parse {
                        kind: ParseErrorKind::BadCodecList,
                    });
                }
                opts.codecs = Some(codecs);
                i = j - 1;
            }
            'l' | 'L' => {
                let (literal, consumed) = extract_addr_literal(&chars[i + 1..]).ok_or(
                    RtpProxyError::Parse {
                        kind: ParseErrorKind::BadLocalAddr,
                    },
                )?;
                opts.local_addr_literal = Some(literal);
                i += consumed;
            }
            'r' | 'R' => {
                let (literal, consumed) = extract_addr_literal(&chars[i + 1..]).ok_or(
                    RtpProxyError::Parse {
                        kind: ParseErrorKind::BadRemoteAddr,
                    },
                )?;
                opts.remote_addr_literal = Some(literal);
                i += consumed;
            }
            _ => {
                // Unknown modifier: logged by the caller, not fatal.
            }
        }
        i += 1;
    }

    Ok(opts)
}

/// A bracketed `[addr]` or bare `addr` literal terminated by the end
/// of the modifier string or the next non-address character. Returns
/// the literal and how many characters (beyond the opening letter) it
/// consumed.
fn extract_addr_literal(rest: &[char]) -> Option<(String, usize)> {
    if rest.is_empty() {
        return None;
    }
    if rest[0] == '[' {
        let end = rest.iter().position(|&c| c == ']')?;
        let literal: String = rest[1..end].iter().collect();
        if literal.is_empty() {
            return None;
        }
        Some((literal, end + 1))
    } else {
        let end = rest
            .iter()
            .position(|&c| !(c.is_ascii_alphanumeric() || c == '.' || c == ':' || c == '-'))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let literal: String = rest[..end].iter().collect();
        Some((literal, end))
    }
}

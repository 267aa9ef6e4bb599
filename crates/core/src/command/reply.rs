//! Reply formatting for the UPDATE/LOOKUP command family.

use std::net::IpAddr;

/// Everything needed to render a U/L success reply.
#[derive(Debug, Clone, Default)]
pub struct UlReply {
    pub port: u16,
    pub addr: Option<IpAddr>,
    /// Address literal override, used when an advertised address
    /// differs from the bound socket's actual address (NAT/public-IP
    /// deployments that advertise one address but bind another).
    pub addr_override: Option<String>,
    pub subc_res: Option<i32>,
}

impl UlReply {
    /// `"<port> <addr>[ 6]"` when a remote address is known, else
    /// `"<port>"`; `" && <subc_res>"` appended when a subcommand
    /// post-hook returned non-zero.
    pub fn format(&self) -> String {
        let mut out = match &self.addr {
            Some(addr) => {
                let rendered = self.addr_override.clone().unwrap_or_else(|| addr.to_string());
                let suffix = if addr.is_ipv6() { " 6" } else { "" };
                format!("{} {}{}", self.port, rendered, suffix)
            }
            None => format!("{}", self.port),
        };
        if let Some(subc) = self.subc_res {
            if subc != 0 {
                out.push_str(&format!(" && {subc}"));
            }
        }
        out
    }
}

/// `"E<code>"` on failure.
pub fn format_error(code: u16) -> String {
    format!("E{code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_only_when_no_address() {
        let r = UlReply {
            port: 5000,
            ..Default::default()
        };
        assert_eq!(r.format(), "5000");
    }

    #[test]
    fn ipv4_address_rendered_plain() {
        let r = UlReply {
            port: 5000,
            addr: Some("127.0.0.1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(r.format(), "5000 127.0.0.1");
    }

    #[test]
    fn ipv6_address_gets_six_suffix() {
        let r = UlReply {
            port: 5000,
            addr: Some("::1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(r.format(), "5000 ::1 6");
    }

    #[test]
    fn addr_override_replaces_rendered_literal() {
        let r = UlReply {
            port: 5000,
            addr: Some("10.0.0.1".parse().unwrap()),
            addr_override: Some("203.0.113.9".into()),
            ..Default::default()
        };
        assert_eq!(r.format(), "5000 203.0.113.9");
    }

    #[test]
    fn nonzero_subc_res_appended() {
        let r = UlReply {
            port: 5000,
            addr: Some("127.0.0.1".parse().unwrap()),
            subc_res: Some(3),
            ..Default::default()
        };
        assert_eq!(r.format(), "5000 127.0.0.1 && 3");
    }

    #[test]
    fn zero_subc_res_not_appended() {
        let r = UlReply {
            port: 5000,
            subc_res: Some(0),
            ..Default::default()
        };
        assert_eq!(r.format(), "5000");
    }

    #[test]
    fn error_format() {
        assert_eq!(format_error(21), "E21");
    }
}

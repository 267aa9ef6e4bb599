//! Listener allocation: binds an RTP/RTCP port pair within a
//! configured range, analogous to the original's `rtpp_create_listener`.

use std::net::{IpAddr, SocketAddr, UdpSocket};

use crate::error::RtpProxyError;

/// Bind two adjacent UDP ports (RTP on an even port, RTCP on the next
/// odd one) starting the scan from `port_min`, stopping at `port_max`.
/// Scanning rather than asking the OS for two arbitrary free ports is
/// required because the RTP/RTCP pairing must be contiguous.
pub fn allocate_port_pair(
    bind_addr: IpAddr,
    port_min: u16,
    port_max: u16,
) -> Result<(UdpSocket, UdpSocket), RtpProxyError> {
    let mut port = port_min + (port_min % 2);
    while port < port_max.saturating_sub(1) {
        let rtp_addr = SocketAddr::new(bind_addr, port);
        let rtcp_addr = SocketAddr::new(bind_addr, port + 1);
        match (UdpSocket::bind(rtp_addr), UdpSocket::bind(rtcp_addr)) {
            (Ok(rtp), Ok(rtcp)) => return Ok((rtp, rtcp)),
            _ => {
                port += 2;
                continue;
            }
        }
    }
    Err(RtpProxyError::ListenerFailed(format!(
        "no free port pair in {port_min}..{port_max} on {bind_addr}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn allocates_adjacent_even_odd_pair() {
        let (rtp, rtcp) = allocate_port_pair(Ipv4Addr::LOCALHOST.into(), 40000, 40100).unwrap();
        let p1 = rtp.local_addr().unwrap().port();
        let p2 = rtcp.local_addr().unwrap().port();
        assert_eq!(p1 % 2, 0);
        assert_eq!(p2, p1 + 1);
    }

    #[test]
    fn exhausted_range_returns_error() {
        let err = allocate_port_pair(Ipv4Addr::LOCALHOST.into(), 40200, 40200).unwrap_err();
        assert_eq!(err.code(), 30);
    }
}

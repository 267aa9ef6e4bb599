//! End-to-end tests: drive the relay over real UDP sockets exactly as
//! a SIP proxy's dialog engine would — send UPDATE/LOOKUP lines on the
//! control channel, then push RTP packets through the allocated ports
//! and confirm they arrive forwarded at the other party's address.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use rtpproxy_core::Relay;
use rtpproxy_core::config::Config;

fn start_relay() -> (Relay, SocketAddr) {
    let control_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let control_addr = control_sock.local_addr().unwrap();
    drop(control_sock); // free the port for the relay to rebind

    let mut config = Config::minimal(control_addr, Ipv4Addr::LOCALHOST.into());
    config.port_min = 42000;
    config.port_max = 42200;
    let mut relay = Relay::new(config);
    relay.start().unwrap();
    (relay, control_addr)
}

fn client_socket() -> UdpSocket {
    let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    sock.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    sock
}

fn send_line(client: &UdpSocket, control_addr: SocketAddr, line: &str) -> String {
    client.send_to(line.as_bytes(), control_addr).unwrap();
    let mut buf = [0u8; 4096];
    let (n, _) = client.recv_from(&mut buf).unwrap();
    String::from_utf8_lossy(&buf[..n]).trim().to_string()
}

#[test]
fn create_and_update_session_allocates_port() {
    let (mut relay, control_addr) = start_relay();
    let client = client_socket();

    let reply = send_line(&client, control_addr, "1 U call1 1.2.3.4 6000 fromtag1");
    assert!(reply.starts_with("1 "));
    assert!(!reply.contains('E'), "unexpected error reply: {reply}");

    relay.stop();
}

#[test]
fn lookup_without_prior_update_fails() {
    let (mut relay, control_addr) = start_relay();
    let client = client_socket();

    let reply = send_line(&client, control_addr, "1 L nosuchcall 1.2.3.4 6000 fromtag1");
    assert_eq!(reply, "1 E21");

    relay.stop();
}

#[test]
fn two_sided_update_then_lookup_succeeds() {
    let (mut relay, control_addr) = start_relay();
    let client = client_socket();

    send_line(&client, control_addr, "1 U call2 1.2.3.4 6000 fromtag2");
    send_line(&client, control_addr, "2 U call2 1.2.3.4 6002 fromtag2 totag2");

    let reply = send_line(&client, control_addr, "3 L call2 1.2.3.4 6000 fromtag2 totag2");
    assert!(!reply.contains('E'), "unexpected error reply: {reply}");

    relay.stop();
}

#[test]
fn forced_new_port_reallocates() {
    let (mut relay, control_addr) = start_relay();
    let client = client_socket();

    let first = send_line(&client, control_addr, "1 U call3 1.2.3.4 6000 fromtag3");
    let second = send_line(&client, control_addr, "2 Un call3 1.2.3.4 6000 fromtag3");
    assert_ne!(first, second, "forced new-port UPDATE should allocate a different port");

    relay.stop();
}

#[test]
fn data_plane_forwards_rtp_between_parties() {
    let (mut relay, control_addr) = start_relay();
    let client = client_socket();

    let caller_media = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    caller_media.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let callee_media = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    callee_media.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    let caller_addr = caller_media.local_addr().unwrap();
    let callee_addr = callee_media.local_addr().unwrap();

    let reply1 = send_line(
        &client,
        control_addr,
        &format!("1 U call4 {} {} fromtag4", caller_addr.ip(), caller_addr.port()),
    );
    let caller_relay_port: u16 = reply1.split_whitespace().nth(1).unwrap().parse().unwrap();

    let reply2 = send_line(
        &client,
        control_addr,
        &format!(
            "2 U call4 {} {} fromtag4 totag4",
            callee_addr.ip(),
            callee_addr.port()
        ),
    );
    let callee_relay_port: u16 = reply2.split_whitespace().nth(1).unwrap().parse().unwrap();

    let relay_ip = Ipv4Addr::LOCALHOST;
    let callee_relay_addr = SocketAddr::new(relay_ip.into(), callee_relay_port);
    let _caller_relay_addr = SocketAddr::new(relay_ip.into(), caller_relay_port);

    // Caller's RTP packet must land on the callee's media socket,
    // forwarded through the relay via the callee leg's relay port.
    caller_media.send_to(b"hello-from-caller", callee_relay_addr).unwrap();
    let mut buf = [0u8; 64];
    let (n, _) = callee_media.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello-from-caller");

    relay.stop();
}

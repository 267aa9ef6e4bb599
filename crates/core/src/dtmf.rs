//! DTMF event detection (C8), grounded on the `catch_dtmf` module's
//! RFC 4733 state machine: a short history of recently seen events,
//! matched in reverse-chronological order by RTP timestamp so that
//! reordered or duplicated packets don't double-fire a notification.
//!
//! [`CatchDtmfData`] is the struct a [`StreamEndpoint`](crate::stream::StreamEndpoint)
//! swaps in via `catch_dtmf_data` (an [`ArcSwapOption`]) when a session
//! requests digit capture via the `M1:catch_dtmf` subcommand. Swapping
//! the whole struct — rather than mutating fields behind a lock — keeps
//! the data-plane taste check lock-free.

use std::sync::atomic::{AtomicI32, Ordering};

use tracing::warn;

use crate::rtp::DtmfEvent;

/// `"0123456789*#ABCD "` — digit codes 0..15 map onto this table; index
/// 16 (silence/unknown) renders as a space.
const DIGITS: &[u8] = b"0123456789*#ABCD";

fn digit_char(event: u8) -> char {
    DIGITS.get(event as usize).copied().unwrap_or(b' ') as char
}

const HISTORY_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
struct HistoryEntry {
    rtp_timestamp: u32,
    event: u8,
    duration: u16,
    /// Set once the end bit has been observed for this instance; a
    /// slot is "pending" (still open) while this is `false`.
    end_seen: bool,
    valid: bool,
}

/// Per-stream DTMF capture state, atomically swappable.
///
/// `pt` is the dynamic payload type currently recognized as
/// `telephone-event`; `-1` means "not configured" and the taste check
/// always fails. It's an atomic so the control-plane subcommand can
/// change the payload type (logging the change, per the original) for
/// a stream that's actively forwarding traffic without disturbing the
/// data plane's lock-free read.
pub struct CatchDtmfData {
    pt: AtomicI32,
    notify_tag: String,
    history: parking_lot::Mutex<[HistoryEntry; HISTORY_LEN]>,
}

/// One detected transition worth notifying the control plane about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfNotification {
    pub tag: String,
    pub digit: char,
    pub volume: u8,
    pub duration: u16,
    /// `0` for caller, `1` for callee.
    pub side: u8,
}

impl DtmfNotification {
    /// `"<tag> <digit> <volume> <duration> <side>"`, type `"DTMF"`.
    pub fn format(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.tag, self.digit, self.volume, self.duration, self.side
        )
    }
}

impl CatchDtmfData {
    pub fn new(pt: i32, notify_tag: String) -> Self {
        Self {
            pt: AtomicI32::new(pt),
            notify_tag,
            history: parking_lot::Mutex::new([HistoryEntry::default(); HISTORY_LEN]),
        }
    }

    pub fn pt(&self) -> i32 {
        self.pt.load(Ordering::Relaxed)
    }

    /// Change the recognized payload type. Returns the previous value
    /// so the caller can log the transition (the original logs a line
    /// every time this changes while a session is active).
    pub fn set_pt(&self, new_pt: i32) -> i32 {
        self.pt.swap(new_pt, Ordering::Relaxed)
    }

    /// Lock-free taste check: does this packet's payload type match
    /// what we're configured to catch?
    pub fn tastes(&self, packet_pt: u8) -> bool {
        self.pt() == packet_pt as i32
    }

    /// Feed one telephone-event packet. A brand-new digit instance only
    /// opens a history slot; it is never notified until a packet with
    /// the end bit set is matched against that slot (RFC 4733 repeats
    /// the end packet several times for reliability, so a duplicate
    /// past the first end does not re-notify).
    pub fn push(&self, rtp_timestamp: u32, payload: &[u8], side: u8) -> Option<DtmfNotification> {
        let ev = DtmfEvent::parse(payload)?;
        if ev.event > 16 {
            warn!(event = ev.event, "dtmf: event id out of range, dropping");
            return None;
        }
        let mut hist = self.history.lock();

        // Reverse-chronological scan: does an existing slot already
        // track this exact digit instance (same timestamp)?
        if let Some(slot) = hist.iter_mut().find(|e| e.valid && e.rtp_timestamp == rtp_timestamp) {
            if slot.end_seen {
                // Step 4: this instance already finished; a further
                // non-end packet with a growing duration means we
                // missed its actual start.
                if !ev.end && slot.duration <= ev.duration {
                    warn!(timestamp = rtp_timestamp, "dtmf: start missing for in-progress event");
                }
                return None;
            }
            if slot.event != ev.event {
                // Step 5.
                warn!(
                    timestamp = rtp_timestamp,
                    old_digit = slot.event,
                    new_digit = ev.event,
                    "dtmf: digit changed mid-event"
                );
                return None;
            }
            if ev.duration > slot.duration {
                slot.duration = ev.duration; // Step 6.
            }
            if ev.end {
                slot.end_seen = true; // Step 7.
                return Some(DtmfNotification {
                    tag: self.notify_tag.clone(),
                    digit: digit_char(ev.event),
                    volume: ev.volume,
                    duration: slot.duration,
                    side,
                });
            }
            return None;
        }

        // Step 3: new event start. Evict the oldest slot (lowest
        // timestamp, or an empty one) and record it — never notify here.
        let oldest_idx = hist
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| if e.valid { e.rtp_timestamp } else { 0 })
            .map(|(i, _)| i)
            .unwrap_or(0);
        hist[oldest_idx] = HistoryEntry {
            rtp_timestamp,
            event: ev.event,
            duration: ev.duration,
            end_seen: false,
            valid: true,
        };
        None
    }
}

/// Parse the `M1:catch_dtmf <tag> [pt]` subcommand body. `tag` is
/// percent/URL-decoded per the control-channel convention used for
/// free-form tags elsewhere in the command grammar; `pt` defaults to
/// 101 (the de-facto `telephone-event` payload type) when omitted.
pub fn parse_catch_dtmf_args(args: &str) -> Result<(String, i32), crate::error::RtpProxyError> {
    let mut parts = args.split_whitespace();
    let raw_tag = parts
        .next()
        .ok_or_else(|| crate::error::RtpProxyError::Protocol("catch_dtmf: missing tag".into()))?;
    let tag = crate::urlcodec::decode(raw_tag)
        .map_err(|_| crate::error::RtpProxyError::Parse {
            kind: crate::error::ParseErrorKind::BadUrlEncoding,
        })?;
    let pt = match parts.next() {
        Some(s) => s
            .parse::<i32>()
            .map_err(|_| crate::error::RtpProxyError::Protocol("catch_dtmf: bad pt".into()))?,
        None => 101,
    };
    Ok((tag, pt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_table_matches_touchtone_alphabet() {
        assert_eq!(digit_char(0), '0');
        assert_eq!(digit_char(9), '9');
        assert_eq!(digit_char(10), '*');
        assert_eq!(digit_char(11), '#');
        assert_eq!(digit_char(15), 'D');
    }

    #[test]
    fn unconfigured_pt_never_tastes() {
        let d = CatchDtmfData::new(-1, "tag1".into());
        assert!(!d.tastes(101));
    }

    #[test]
    fn start_then_end_produces_single_notification() {
        let d = CatchDtmfData::new(101, "tag1".into());
        let ev_start = DtmfEvent {
            event: 5,
            end: false,
            volume: 10,
            duration: 160,
        }
        .write();
        // New instance: opens the slot, never notifies.
        assert!(d.push(1000, &ev_start, 0).is_none());

        let ev_mid = DtmfEvent {
            event: 5,
            end: false,
            volume: 10,
            duration: 320,
        }
        .write();
        assert!(d.push(1000, &ev_mid, 0).is_none());

        let ev_end = DtmfEvent {
            event: 5,
            end: true,
            volume: 10,
            duration: 480,
        }
        .write();
        let end = d.push(1000, &ev_end, 0).expect("end notify");
        assert_eq!(end.digit, '5');
        assert_eq!(end.duration, 480);
        assert_eq!(end.side, 0);
    }

    #[test]
    fn duplicate_end_packet_does_not_renotify() {
        let d = CatchDtmfData::new(101, "tag1".into());
        let ev = DtmfEvent {
            event: 1,
            end: true,
            volume: 5,
            duration: 160,
        }
        .write();
        assert!(d.push(42, &ev, 1).is_none(), "first sighting only opens the slot");
        assert!(d.push(42, &ev, 1).is_some(), "end bit confirmed on the repeat, notify once");
        assert!(d.push(42, &ev, 1).is_none(), "further duplicates stay silent");
    }

    #[test]
    fn digit_changing_mid_event_is_dropped() {
        let d = CatchDtmfData::new(101, "tag1".into());
        let ev1 = DtmfEvent {
            event: 3,
            end: false,
            volume: 10,
            duration: 160,
        }
        .write();
        assert!(d.push(500, &ev1, 0).is_none());

        let ev2 = DtmfEvent {
            event: 7,
            end: true,
            volume: 10,
            duration: 320,
        }
        .write();
        assert!(d.push(500, &ev2, 0).is_none());
    }

    #[test]
    fn out_of_range_event_is_dropped() {
        let d = CatchDtmfData::new(101, "tag1".into());
        let ev = DtmfEvent {
            event: 17,
            end: false,
            volume: 10,
            duration: 160,
        }
        .write();
        assert!(d.push(700, &ev, 0).is_none());
    }

    #[test]
    fn set_pt_returns_previous_value() {
        let d = CatchDtmfData::new(101, "tag1".into());
        let prev = d.set_pt(102);
        assert_eq!(prev, 101);
        assert_eq!(d.pt(), 102);
    }

    #[test]
    fn notification_format_matches_wire_grammar() {
        let n = DtmfNotification {
            tag: "abc123".into(),
            digit: '7',
            volume: 12,
            duration: 640,
            side: 0,
        };
        assert_eq!(n.format(), "abc123 7 12 640 0");
    }

    #[test]
    fn parse_catch_dtmf_args_defaults_pt_to_101() {
        let (tag, pt) = parse_catch_dtmf_args("mytag").unwrap();
        assert_eq!(tag, "mytag");
        assert_eq!(pt, 101);
    }

    #[test]
    fn parse_catch_dtmf_args_reads_explicit_pt() {
        let (tag, pt) = parse_catch_dtmf_args("mytag 105").unwrap();
        assert_eq!(tag, "mytag");
        assert_eq!(pt, 105);
    }
}

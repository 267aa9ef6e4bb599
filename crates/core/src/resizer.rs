//! Ptime re-packetisation ("resizer").
//!
//! The only media manipulation this relay performs (per the Non-goals:
//! no transcoding). A resizer buffers incoming RTP payload bytes at the
//! sender's packetisation interval and re-emits them chunked at the
//! stream's requested ptime, preserving payload type and advancing the
//! timestamp/sequence fields deterministically.

use crate::rtp::RtpHeader;

/// Re-packetises an RTP stream to a different `ptime` (milliseconds).
///
/// `samples_per_ms` is the codec's clock-rate-derived sample count per
/// millisecond (e.g. 8 for G.711 at 8kHz); the caller supplies it since
/// the resizer has no codec knowledge beyond byte counts.
pub struct RtpResizer {
    ptime_ms: u32,
    samples_per_ms: u32,
    buffer: Vec<u8>,
    buffered_ts: Option<u32>,
    next_sequence: u16,
    ssrc: u32,
}

impl RtpResizer {
    pub fn new(ptime_ms: u32, samples_per_ms: u32, ssrc: u32) -> Self {
        Self {
            ptime_ms,
            samples_per_ms,
            buffer: Vec::new(),
            buffered_ts: None,
            next_sequence: 0,
            ssrc,
        }
    }

    pub fn set_ptime(&mut self, ptime_ms: u32) {
        self.ptime_ms = ptime_ms;
    }

    fn target_len_bytes(&self) -> usize {
        (self.ptime_ms * self.samples_per_ms) as usize
    }

    /// Feed one incoming RTP packet's payload. Returns zero or more
    /// re-packetised output packets (full header + payload) once enough
    /// payload has accumulated to fill `ptime_ms` worth of samples.
    pub fn push(&mut self, pt: u8, timestamp: u32, payload: &[u8]) -> Vec<Vec<u8>> {
        if self.buffered_ts.is_none() {
            self.buffered_ts = Some(timestamp);
        }
        self.buffer.extend_from_slice(payload);

        let target = self.target_len_bytes();
        if target == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        while self.buffer.len() >= target {
            let chunk: Vec<u8> = self.buffer.drain(..target).collect();
            let ts = self.buffered_ts.unwrap_or(timestamp);
            let header = RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                csrc_count: 0,
                marker: false,
                pt,
                sequence: self.next_sequence,
                timestamp: ts,
                ssrc: self.ssrc,
                csrc: Vec::new(),
            };
            self.next_sequence = self.next_sequence.wrapping_add(1);
            self.buffered_ts = Some(ts.wrapping_add((target as u32 / self.samples_per_ms.max(1)) as u32));

            let mut packet = header.write();
            packet.extend_from_slice(&chunk);
            out.push(packet);
        }
        if self.buffer.is_empty() {
            self.buffered_ts = None;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_ptime_boundary() {
        // 8 samples/ms, 20ms ptime -> 160-byte target chunks.
        let mut r = RtpResizer::new(20, 8, 0xAAAA);
        let small = vec![0u8; 80];
        assert!(r.push(0, 1000, &small).is_empty());
        let out = r.push(0, 1080, &small);
        assert_eq!(out.len(), 1);
        let (hdr, off) = RtpHeader::parse(&out[0]).unwrap();
        assert_eq!(out[0].len() - off, 160);
        assert_eq!(hdr.timestamp, 1000);
    }

    #[test]
    fn sequence_increments_across_packets() {
        let mut r = RtpResizer::new(20, 8, 1);
        let chunk = vec![0u8; 160];
        let out1 = r.push(0, 0, &chunk);
        let out2 = r.push(0, 160, &chunk);
        assert_eq!(out1.len(), 1);
        assert_eq!(out2.len(), 1);
        let (h1, _) = RtpHeader::parse(&out1[0]).unwrap();
        let (h2, _) = RtpHeader::parse(&out2[0]).unwrap();
        assert_eq!(h2.sequence, h1.sequence.wrapping_add(1));
    }

    #[test]
    fn set_ptime_changes_future_chunk_size() {
        let mut r = RtpResizer::new(20, 8, 1);
        r.set_ptime(10);
        let out = r.push(0, 0, &vec![0u8; 80]);
        assert_eq!(out.len(), 1);
        let (_, off) = RtpHeader::parse(&out[0]).unwrap();
        assert_eq!(out[0].len() - off, 80);
    }
}

//! RTP fixed header (RFC 3550 §5.1) and RFC 4733 DTMF payload codecs.
//!
//! The relay does not modify the header except for ptime-resize
//! re-packetisation (see [`resizer`](crate::resizer)); everything here
//! is encode/decode only, bit-exact with the wire format.

/// Parsed RTP fixed header plus a view into the remainder of the packet
/// (CSRC list, if any, followed by the payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub pt: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
}

const FIXED_HEADER_LEN: usize = 12;

impl RtpHeader {
    /// Decode a fixed header (plus CSRC list) from the start of `buf`.
    /// Returns the header and the byte offset where the payload begins.
    pub fn parse(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < FIXED_HEADER_LEN {
            return None;
        }
        let b0 = buf[0];
        let b1 = buf[1];
        let version = b0 >> 6;
        let padding = (b0 & 0x20) != 0;
        let extension = (b0 & 0x10) != 0;
        let csrc_count = b0 & 0x0f;
        let marker = (b1 & 0x80) != 0;
        let pt = b1 & 0x7f;
        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let csrc_len = csrc_count as usize * 4;
        if buf.len() < FIXED_HEADER_LEN + csrc_len {
            return None;
        }
        let mut csrc = Vec::with_capacity(csrc_count as usize);
        for i in 0..csrc_count as usize {
            let off = FIXED_HEADER_LEN + i * 4;
            csrc.push(u32::from_be_bytes([
                buf[off],
                buf[off + 1],
                buf[off + 2],
                buf[off + 3],
            ]));
        }

        Some((
            RtpHeader {
                version,
                padding,
                extension,
                csrc_count,
                marker,
                pt,
                sequence,
                timestamp,
                ssrc,
                csrc,
            },
            FIXED_HEADER_LEN + csrc_len,
        ))
    }

    /// Serialize the fixed header plus CSRC list, bit-exact with [`parse`](Self::parse).
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.csrc.len() * 4);
        let b0 = (self.version << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc.len() as u8 & 0x0f);
        let b1 = ((self.marker as u8) << 7) | (self.pt & 0x7f);
        out.push(b0);
        out.push(b1);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for c in &self.csrc {
            out.extend_from_slice(&c.to_be_bytes());
        }
        out
    }
}

/// RFC 4733 DTMF payload: 4 bytes, event/end/reserved/volume/duration.
/// Endianness of the bit-packed byte is big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfEvent {
    pub event: u8,
    pub end: bool,
    pub volume: u8,
    pub duration: u16,
}

impl DtmfEvent {
    pub const WIRE_LEN: usize = 4;

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_LEN {
            return None;
        }
        let event = buf[0];
        let end = (buf[1] & 0x80) != 0;
        let volume = buf[1] & 0x3f;
        let duration = u16::from_be_bytes([buf[2], buf[3]]);
        Some(DtmfEvent {
            event,
            end,
            volume,
            duration,
        })
    }

    pub fn write(&self) -> [u8; Self::WIRE_LEN] {
        let mut b1 = self.volume & 0x3f;
        if self.end {
            b1 |= 0x80;
        }
        let dur = self.duration.to_be_bytes();
        [self.event, b1, dur[0], dur[1]]
    }
}

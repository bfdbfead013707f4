//! Incremental framing of interleaved UBX, NMEA and RTCM3 traffic.
//!
//! [`Framer`] is a state machine fed with arbitrary chunks of bytes. It
//! locks onto a start marker, reads the fixed header, waits for the
//! declared body, validates the frame and then either emits it or discards
//! the start byte and scans again. Every discard consumes at least one
//! byte, so garbage can never stall the scanner.
use log::{trace, warn};

use crate::{
    nmea::{self, NmeaMessage, NmeaSentence},
    rtcm::{self, RtcmMessage},
    ubx::{self, UbxMessage},
    Frame, Message, ParseError, Protocol, ProtocolFilter,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Where the scanner is within the current candidate frame
pub enum ScanState {
    /// Looking for a start marker at the head of the buffer
    Scanning,
    /// Start marker matched, waiting for the fixed header
    Header(Protocol),
    /// Header read, waiting for `frame_len` bytes in total
    Payload {
        /// Protocol of the candidate frame
        protocol: Protocol,
        /// Complete frame length, start marker through checksum
        frame_len: usize,
    },
    /// Complete candidate frame buffered, integrity check pending
    Validate {
        /// Protocol of the candidate frame
        protocol: Protocol,
        /// Complete frame length, start marker through checksum
        frame_len: usize,
    },
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Running counters
pub struct FramerStats {
    /// Frames emitted
    pub frames: u64,
    /// Frames dropped by the protocol filter
    pub filtered: u64,
    /// Candidate frames rejected by their checksum
    pub checksum_errors: u64,
    /// Bytes skipped while resynchronizing
    pub discarded: u64,
}

enum Step {
    Continue,
    NeedMore,
    Emit(Frame),
}

#[derive(Debug)]
/// Splits a byte stream into validated frames.
pub struct Framer {
    buf: Vec<u8>,
    pos: usize,
    state: ScanState,
    filter: ProtocolFilter,
    stats: FramerStats,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(ProtocolFilter::default())
    }
}

impl Framer {
    /// Create a framer that emits frames of the protocols in `filter`.
    pub fn new(filter: ProtocolFilter) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            pos: 0,
            state: ScanState::Scanning,
            filter,
            stats: FramerStats::default(),
        }
    }

    /// Change the protocol filter. Takes effect for the next frame.
    pub fn set_filter(&mut self, filter: ProtocolFilter) {
        self.filter = filter;
    }

    /// Current protocol filter
    pub fn filter(&self) -> ProtocolFilter {
        self.filter
    }

    /// Current scanner state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Counters since creation
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Bytes buffered but not yet consumed
    pub fn pending(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Drop everything buffered and start scanning afresh.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.state = ScanState::Scanning;
    }

    /// Append bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        if self.pos > 0 && self.pos >= self.buf.len() / 2 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// Extract the next frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.step() {
                Step::Continue => {}
                Step::NeedMore => return None,
                Step::Emit(frame) => return Some(frame),
            }
        }
    }

    fn data(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Skip the byte at the head of the buffer and rescan.
    fn discard(&mut self) -> Step {
        self.pos += 1;
        self.stats.discarded += 1;
        self.state = ScanState::Scanning;
        Step::Continue
    }

    fn step(&mut self) -> Step {
        let data = self.data();
        match self.state {
            ScanState::Scanning => {
                let Some(&first) = data.first() else {
                    return Step::NeedMore;
                };
                let protocol = match first {
                    ubx::SYNC1 => match data.get(1) {
                        None => return Step::NeedMore,
                        Some(&ubx::SYNC2) => Protocol::Ubx,
                        Some(_) => return self.discard(),
                    },
                    b'$' | b'!' => match data.get(1) {
                        None => return Step::NeedMore,
                        Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit() => Protocol::Nmea,
                        Some(_) => return self.discard(),
                    },
                    rtcm::PREAMBLE => Protocol::Rtcm,
                    _ => return self.discard(),
                };
                self.state = ScanState::Header(protocol);
                Step::Continue
            }
            ScanState::Header(Protocol::Ubx) => {
                if data.len() < ubx::HEADER_LEN {
                    return Step::NeedMore;
                }
                let len = u16::from_le_bytes([data[4], data[5]]) as usize;
                if len > ubx::MAX_PAYLOAD {
                    trace!("UBX length {len} out of range, resyncing");
                    return self.discard();
                }
                self.state = ScanState::Payload {
                    protocol: Protocol::Ubx,
                    frame_len: ubx::HEADER_LEN + len + 2,
                };
                Step::Continue
            }
            ScanState::Header(Protocol::Rtcm) => {
                if data.len() < rtcm::HEADER_LEN {
                    return Step::NeedMore;
                }
                if data[1] & 0xFC != 0 {
                    return self.discard();
                }
                let len = (((data[1] & 0x03) as usize) << 8) | data[2] as usize;
                self.state = ScanState::Payload {
                    protocol: Protocol::Rtcm,
                    frame_len: rtcm::HEADER_LEN + len + rtcm::CRC_LEN,
                };
                Step::Continue
            }
            ScanState::Header(Protocol::Nmea) => match sentence_end(data) {
                None => Step::NeedMore,
                Some(Some(frame_len)) => {
                    self.state = ScanState::Validate {
                        protocol: Protocol::Nmea,
                        frame_len,
                    };
                    Step::Continue
                }
                Some(None) => self.discard(),
            },
            ScanState::Payload {
                protocol,
                frame_len,
            } => {
                if data.len() < frame_len {
                    return Step::NeedMore;
                }
                self.state = ScanState::Validate {
                    protocol,
                    frame_len,
                };
                Step::Continue
            }
            ScanState::Validate {
                protocol,
                frame_len,
            } => self.validate(protocol, frame_len),
        }
    }

    fn validate(&mut self, protocol: Protocol, frame_len: usize) -> Step {
        let raw = &self.data()[..frame_len];
        // NMEA carries its checksum inside the sentence, so the parse
        // doubles as the integrity check
        let sentence = match protocol {
            Protocol::Ubx => ubx::verify(raw).map(|_| None),
            Protocol::Rtcm => rtcm::verify(raw).map(|_| None),
            Protocol::Nmea => match NmeaSentence::parse(raw) {
                Ok(sentence) => Ok(Some(Ok(sentence))),
                Err(e @ ParseError::Checksum { .. }) => Err(e),
                Err(e) => Ok(Some(Err(e))),
            },
        };
        let sentence = match sentence {
            Ok(sentence) => sentence,
            Err(e) => {
                warn!("{protocol} frame rejected: {e}");
                self.stats.checksum_errors += 1;
                return self.discard();
            }
        };
        let raw = raw.to_vec();
        self.pos += frame_len;
        self.state = ScanState::Scanning;
        if !self.filter.contains(protocol.filter_bit()) {
            self.stats.filtered += 1;
            return Step::Continue;
        }
        let message = match protocol {
            Protocol::Ubx => UbxMessage::from_bytes(&raw).map(Message::Ubx),
            Protocol::Rtcm => RtcmMessage::from_bytes(&raw).map(Message::Rtcm),
            Protocol::Nmea => sentence
                .unwrap_or(Err(ParseError::PatternNotFound))
                .and_then(|s| NmeaMessage::decode(&s))
                .map(Message::Nmea),
        };
        if let Err(e) = &message {
            trace!("{protocol} frame not decoded: {e}");
        }
        self.stats.frames += 1;
        Step::Emit(Frame {
            protocol,
            raw,
            message,
        })
    }
}

/// Length of the sentence at the head of `data` including its line
/// terminator. `None` if the terminator has not arrived yet, `Some(None)`
/// if the bytes cannot be a sentence.
fn sentence_end(data: &[u8]) -> Option<Option<usize>> {
    for (idx, &c) in data.iter().enumerate().skip(1) {
        match c {
            b'\n' => return Some(Some(idx + 1)),
            b'\r' => {}
            b'$' | b'!' => return Some(None),
            c if !(0x20..0x7F).contains(&c) => return Some(None),
            _ => {}
        }
        if idx + 1 >= nmea::MAX_SENTENCE_LEN {
            return Some(None);
        }
    }
    None
}

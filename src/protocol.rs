use std::fmt::{self, Display, Formatter};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{nmea::NmeaMessage, rtcm::RtcmMessage, ubx::UbxMessage, ParseError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Wire protocol a frame belongs to
pub enum Protocol {
    /// u-blox binary protocol
    Ubx,
    /// NMEA 0183 text sentences, including proprietary `$P` sentences
    Nmea,
    /// RTCM 3 differential corrections
    Rtcm,
}

impl Protocol {
    /// Filter bit matching this protocol
    pub fn filter_bit(&self) -> ProtocolFilter {
        match self {
            Protocol::Ubx => ProtocolFilter::UBX,
            Protocol::Nmea => ProtocolFilter::NMEA,
            Protocol::Rtcm => ProtocolFilter::RTCM,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Protocol::Ubx => write!(f, "UBX"),
            Protocol::Nmea => write!(f, "NMEA"),
            Protocol::Rtcm => write!(f, "RTCM3"),
        }
    }
}

bitflags! {
    /// Mask of protocols the consumer wants to receive.
    ///
    /// Frames of a masked-out protocol are still framed, so their bytes
    /// are consumed cleanly, but they are never emitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ProtocolFilter: u8 {
        /// UBX frames
        const UBX = 0b001;
        /// NMEA sentences
        const NMEA = 0b010;
        /// RTCM3 frames
        const RTCM = 0b100;
    }
}

impl Default for ProtocolFilter {
    fn default() -> Self {
        ProtocolFilter::all()
    }
}

impl ProtocolFilter {
    /// Parse a comma separated list such as `ubx,nmea`.
    pub fn from_list(list: &str) -> Option<Self> {
        let mut filter = ProtocolFilter::empty();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            filter |= match item.to_ascii_lowercase().as_str() {
                "ubx" => ProtocolFilter::UBX,
                "nmea" => ProtocolFilter::NMEA,
                "rtcm" | "rtcm3" => ProtocolFilter::RTCM,
                "all" => ProtocolFilter::all(),
                _ => return None,
            };
        }
        Some(filter)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A decoded message of any supported protocol
pub enum Message {
    /// UBX message
    Ubx(UbxMessage),
    /// NMEA sentence
    Nmea(NmeaMessage),
    /// RTCM3 message
    Rtcm(RtcmMessage),
}

impl Message {
    /// Message identity, e.g. `NAV-PVT`, `GPGGA` or `1005`
    pub fn identity(&self) -> String {
        match self {
            Message::Ubx(msg) => msg.identity().to_string(),
            Message::Nmea(msg) => msg.identity(),
            Message::Rtcm(msg) => msg.number().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
/// One validated frame extracted from the byte stream.
///
/// `message` carries the decode error when the frame passed its integrity
/// check but its content could not be interpreted; the raw bytes are kept
/// either way.
pub struct Frame {
    /// Protocol tag
    pub protocol: Protocol,
    /// Raw frame bytes, including sync and checksum
    pub raw: Vec<u8>,
    /// Decoded message or the reason it could not be decoded
    pub message: Result<Message, ParseError>,
}

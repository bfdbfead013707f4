//! UBX protocol: framing constants, checksum, message table and
//! command builders.
mod fields;
mod messages;

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::ParseError;

pub(crate) use fields::Fields;
pub use messages::*;
#[cfg(test)]
pub(crate) use messages::test::nav_pvt_payload;

/// UBX sync bytes
pub const SYNC1: u8 = 0xB5;
/// UBX sync bytes
pub const SYNC2: u8 = 0x62;
/// sync(2) + class(1) + id(1) + length(2)
pub const HEADER_LEN: usize = 6;
/// Largest payload accepted by the framer; anything bigger is treated as
/// a false sync.
pub const MAX_PAYLOAD: usize = 8192;

/// Message classes
pub mod class {
    /// Navigation results
    pub const NAV: u8 = 0x01;
    /// Receiver manager
    pub const RXM: u8 = 0x02;
    /// Information
    pub const INF: u8 = 0x04;
    /// Acknowledgement
    pub const ACK: u8 = 0x05;
    /// Configuration
    pub const CFG: u8 = 0x06;
    /// Firmware update
    pub const UPD: u8 = 0x09;
    /// Monitoring
    pub const MON: u8 = 0x0A;
    /// AssistNow aiding
    pub const AID: u8 = 0x0B;
    /// Timing
    pub const TIM: u8 = 0x0D;
    /// External sensor fusion
    pub const ESF: u8 = 0x10;
    /// Multiple GNSS assistance
    pub const MGA: u8 = 0x13;
    /// Logging
    pub const LOG: u8 = 0x21;
    /// Security
    pub const SEC: u8 = 0x27;
    /// High rate navigation
    pub const HNR: u8 = 0x28;
}

lazy_static! {
    /// Known UBX identities. Frames outside this table fail to decode.
    static ref UBX_NAMES: HashMap<(u8, u8), &'static str> = {
        use class::*;
        [
            ((ACK, 0x00), "ACK-NAK"),
            ((ACK, 0x01), "ACK-ACK"),
            ((CFG, 0x00), "CFG-PRT"),
            ((CFG, 0x01), "CFG-MSG"),
            ((CFG, 0x02), "CFG-INF"),
            ((CFG, 0x04), "CFG-RST"),
            ((CFG, 0x08), "CFG-RATE"),
            ((CFG, 0x09), "CFG-CFG"),
            ((CFG, 0x13), "CFG-ANT"),
            ((CFG, 0x17), "CFG-NMEA"),
            ((CFG, 0x23), "CFG-NAVX5"),
            ((CFG, 0x24), "CFG-NAV5"),
            ((CFG, 0x3E), "CFG-GNSS"),
            ((CFG, 0x71), "CFG-TMODE3"),
            ((CFG, 0x86), "CFG-PMS"),
            ((CFG, 0x8A), "CFG-VALSET"),
            ((CFG, 0x8B), "CFG-VALGET"),
            ((CFG, 0x8C), "CFG-VALDEL"),
            ((ESF, 0x02), "ESF-MEAS"),
            ((ESF, 0x03), "ESF-RAW"),
            ((ESF, 0x10), "ESF-STATUS"),
            ((ESF, 0x14), "ESF-ALG"),
            ((ESF, 0x15), "ESF-INS"),
            ((HNR, 0x00), "HNR-PVT"),
            ((HNR, 0x01), "HNR-ATT"),
            ((HNR, 0x02), "HNR-INS"),
            ((INF, 0x00), "INF-ERROR"),
            ((INF, 0x01), "INF-WARNING"),
            ((INF, 0x02), "INF-NOTICE"),
            ((INF, 0x03), "INF-TEST"),
            ((INF, 0x04), "INF-DEBUG"),
            ((LOG, 0x0E), "LOG-INFO"),
            ((MGA, 0x60), "MGA-ACK"),
            ((MON, 0x02), "MON-IO"),
            ((MON, 0x04), "MON-VER"),
            ((MON, 0x06), "MON-MSGPP"),
            ((MON, 0x07), "MON-RXBUF"),
            ((MON, 0x08), "MON-TXBUF"),
            ((MON, 0x09), "MON-HW"),
            ((MON, 0x0B), "MON-HW2"),
            ((MON, 0x28), "MON-GNSS"),
            ((MON, 0x31), "MON-SPAN"),
            ((MON, 0x36), "MON-COMMS"),
            ((MON, 0x37), "MON-HW3"),
            ((MON, 0x38), "MON-RF"),
            ((MON, 0x39), "MON-SYS"),
            ((NAV, 0x01), "NAV-POSECEF"),
            ((NAV, 0x02), "NAV-POSLLH"),
            ((NAV, 0x03), "NAV-STATUS"),
            ((NAV, 0x04), "NAV-DOP"),
            ((NAV, 0x05), "NAV-ATT"),
            ((NAV, 0x06), "NAV-SOL"),
            ((NAV, 0x07), "NAV-PVT"),
            ((NAV, 0x09), "NAV-ODO"),
            ((NAV, 0x11), "NAV-VELECEF"),
            ((NAV, 0x12), "NAV-VELNED"),
            ((NAV, 0x13), "NAV-HPPOSECEF"),
            ((NAV, 0x14), "NAV-HPPOSLLH"),
            ((NAV, 0x20), "NAV-TIMEGPS"),
            ((NAV, 0x21), "NAV-TIMEUTC"),
            ((NAV, 0x22), "NAV-CLOCK"),
            ((NAV, 0x26), "NAV-TIMELS"),
            ((NAV, 0x30), "NAV-SVINFO"),
            ((NAV, 0x31), "NAV-DGPS"),
            ((NAV, 0x32), "NAV-SBAS"),
            ((NAV, 0x35), "NAV-SAT"),
            ((NAV, 0x36), "NAV-COV"),
            ((NAV, 0x3B), "NAV-SVIN"),
            ((NAV, 0x3C), "NAV-RELPOSNED"),
            ((NAV, 0x43), "NAV-SIG"),
            ((NAV, 0x61), "NAV-EOE"),
            ((RXM, 0x13), "RXM-SFRBX"),
            ((RXM, 0x14), "RXM-MEASX"),
            ((RXM, 0x15), "RXM-RAWX"),
            ((RXM, 0x32), "RXM-RTCM"),
            ((RXM, 0x33), "RXM-SPARTN"),
            ((RXM, 0x72), "RXM-COR"),
            ((SEC, 0x03), "SEC-UNIQID"),
            ((TIM, 0x01), "TIM-TP"),
            ((TIM, 0x03), "TIM-TM2"),
            ((TIM, 0x04), "TIM-SVIN"),
            ((UPD, 0x14), "UPD-SOS"),
        ]
        .into_iter()
        .collect()
    };
}

/// Name of a known UBX identity
pub fn message_name(class: u8, id: u8) -> Option<&'static str> {
    UBX_NAMES.get(&(class, id)).copied()
}

/// 8-bit Fletcher checksum over class, id, length and payload
pub fn checksum(data: &[u8]) -> (u8, u8) {
    data.iter().fold((0u8, 0u8), |(ck_a, ck_b), &byte| {
        let ck_a = ck_a.wrapping_add(byte);
        (ck_a, ck_b.wrapping_add(ck_a))
    })
}

/// Check the trailing checksum of a complete frame (sync included).
pub(crate) fn verify(frame: &[u8]) -> Result<(), ParseError> {
    let n = frame.len();
    if n < HEADER_LEN + 2 {
        return Err(ParseError::Length {
            name: "UBX frame",
            expected: HEADER_LEN + 2,
            found: n,
        });
    }
    let (ck_a, ck_b) = checksum(&frame[2..n - 2]);
    if ck_a == frame[n - 2] && ck_b == frame[n - 1] {
        Ok(())
    } else {
        Err(ParseError::Checksum {
            expected: u16::from_le_bytes([ck_a, ck_b]) as u32,
            found: u16::from_le_bytes([frame[n - 2], frame[n - 1]]) as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An unframed UBX message: identity plus raw payload
pub struct UbxFrame {
    /// Message class
    pub class: u8,
    /// Message id
    pub id: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl UbxFrame {
    /// Create a new message from its identity and payload
    pub fn new(class: u8, id: u8, payload: Vec<u8>) -> Self {
        Self { class, id, payload }
    }

    /// Split a validated frame into identity and payload.
    pub fn from_bytes(frame: &[u8]) -> Result<Self, ParseError> {
        verify(frame)?;
        let declared = u16::from_le_bytes([frame[4], frame[5]]) as usize;
        let found = frame.len() - HEADER_LEN - 2;
        if declared != found {
            return Err(ParseError::Length {
                name: "UBX frame",
                expected: declared,
                found,
            });
        }
        Ok(Self {
            class: frame[2],
            id: frame[3],
            payload: frame[HEADER_LEN..HEADER_LEN + found].to_vec(),
        })
    }

    /// Serialize to wire format, ready to be written verbatim
    pub fn serialize(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len() + 2);
        buf.extend_from_slice(&[SYNC1, SYNC2, self.class, self.id]);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let (ck_a, ck_b) = checksum(&buf[2..]);
        buf.push(ck_a);
        buf.push(ck_b);
        buf
    }
}

/// Zero-length poll request for a message
pub fn poll(class: u8, id: u8) -> Vec<u8> {
    UbxFrame::new(class, id, Vec::new()).serialize()
}

/// CFG-MSG setting the output rate of a message on the current port
pub fn cfg_msg(msg_class: u8, msg_id: u8, rate: u8) -> Vec<u8> {
    UbxFrame::new(class::CFG, 0x01, vec![msg_class, msg_id, rate]).serialize()
}

/// CFG-VALSET layers
pub mod layer {
    /// Volatile RAM
    pub const RAM: u8 = 0x01;
    /// Battery backed RAM
    pub const BBR: u8 = 0x02;
    /// Flash
    pub const FLASH: u8 = 0x04;
}

/// CFG-VALSET (version 0) carrying the given key/value pairs.
///
/// The value width is taken from the size bits (28..30) of each key.
pub fn cfg_valset(layers: u8, items: &[(u32, u64)]) -> Vec<u8> {
    let mut payload = vec![0x00, layers, 0x00, 0x00];
    for &(key, value) in items {
        payload.extend_from_slice(&key.to_le_bytes());
        let width = match (key >> 28) & 0x07 {
            0x01 | 0x02 => 1,
            0x03 => 2,
            0x04 => 4,
            _ => 8,
        };
        payload.extend_from_slice(&value.to_le_bytes()[..width]);
    }
    UbxFrame::new(class::CFG, 0x8A, payload).serialize()
}

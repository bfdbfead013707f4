use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize, Deserialize)]
/// A GNSS constellation, numbered as in UBX `gnssId`
pub enum GnssId {
    /// GPS (ID: 1 - 32)
    Gps,
    /// SBAS (ID: 120 - 158)
    Sbas,
    /// Galileo (ID: 1 - 36)
    Galileo,
    /// BeiDou (ID: 1 - 63)
    Beidou,
    /// IMES (ID: 1 - 10)
    Imes,
    /// QZSS (ID: 1 - 10)
    Qzss,
    /// GLONASS (ID: 1 - 32)
    Glonass,
    /// NavIC (ID: 1 - 14)
    Navic,
}

impl GnssId {
    /// From UBX `gnssId`
    pub fn from_ubx(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::Gps,
            1 => Self::Sbas,
            2 => Self::Galileo,
            3 => Self::Beidou,
            4 => Self::Imes,
            5 => Self::Qzss,
            6 => Self::Glonass,
            7 => Self::Navic,
            _ => return None,
        })
    }

    /// From an NMEA 4.11 system id (GSA/GSV trailing field)
    pub fn from_system_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => Self::Gps,
            2 => Self::Glonass,
            3 => Self::Galileo,
            4 => Self::Beidou,
            5 => Self::Qzss,
            6 => Self::Navic,
            _ => return None,
        })
    }

    /// From an NMEA talker id. `GN` (combined) has no single constellation.
    pub fn from_talker(talker: &str) -> Option<Self> {
        Some(match talker {
            "GP" => Self::Gps,
            "GL" => Self::Glonass,
            "GA" => Self::Galileo,
            "GB" | "BD" => Self::Beidou,
            "GQ" | "QZ" => Self::Qzss,
            "GI" => Self::Navic,
            _ => return None,
        })
    }

    /// Resolve a satellite number from the legacy single-range numbering
    /// used by NAV-SVINFO and NMEA 4.0 into `(constellation, svid)`.
    pub fn from_legacy_svid(svid: u16) -> Option<(Self, u16)> {
        Some(match svid {
            1..=32 => (Self::Gps, svid),
            33..=64 => (Self::Beidou, svid - 27),
            65..=96 => (Self::Glonass, svid - 64),
            120..=158 => (Self::Sbas, svid),
            159..=163 => (Self::Beidou, svid - 158),
            173..=182 => (Self::Imes, svid - 172),
            193..=202 => (Self::Qzss, svid - 192),
            211..=246 => (Self::Galileo, svid - 210),
            301..=336 => (Self::Galileo, svid - 300),
            401..=463 => (Self::Beidou, svid - 400),
            _ => return None,
        })
    }

    /// Resolve an NMEA GSV satellite number given the sentence talker.
    pub fn from_nmea_svid(talker: &str, svid: u16) -> Option<(Self, u16)> {
        match (talker, svid) {
            ("GP", 33..=64) => Some((Self::Sbas, svid + 87)),
            ("GP", 193..=202) => Some((Self::Qzss, svid - 192)),
            ("GL", 65..=96) => Some((Self::Glonass, svid - 64)),
            ("GA", 301..=336) => Some((Self::Galileo, svid - 300)),
            ("GB" | "BD", 401..=463) => Some((Self::Beidou, svid - 400)),
            ("GQ" | "QZ", 193..=202) => Some((Self::Qzss, svid - 192)),
            ("GN", _) => Self::from_legacy_svid(svid),
            (talker, svid) => Self::from_talker(talker).map(|gnss| (gnss, svid)),
        }
    }

    /// Short label used in satellite tables
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gps => "GPS",
            Self::Sbas => "SBAS",
            Self::Galileo => "GAL",
            Self::Beidou => "BDS",
            Self::Imes => "IMES",
            Self::Qzss => "QZSS",
            Self::Glonass => "GLO",
            Self::Navic => "NAVIC",
        }
    }
}

impl Display for GnssId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legacy_numbering() {
        assert_eq!(GnssId::from_legacy_svid(7), Some((GnssId::Gps, 7)));
        assert_eq!(GnssId::from_legacy_svid(70), Some((GnssId::Glonass, 6)));
        assert_eq!(GnssId::from_legacy_svid(131), Some((GnssId::Sbas, 131)));
        assert_eq!(GnssId::from_legacy_svid(212), Some((GnssId::Galileo, 2)));
        assert_eq!(GnssId::from_legacy_svid(255), None);
    }

    #[test]
    fn nmea_numbering() {
        assert_eq!(GnssId::from_nmea_svid("GL", 68), Some((GnssId::Glonass, 4)));
        assert_eq!(GnssId::from_nmea_svid("GP", 46), Some((GnssId::Sbas, 133)));
        assert_eq!(GnssId::from_nmea_svid("GA", 19), Some((GnssId::Galileo, 19)));
        assert_eq!(GnssId::from_nmea_svid("XX", 1), None);
    }
}

//! NMEA 0183 sentences: framing, checksum, field helpers and typed
//! decoders for the standard sentences and u-blox PUBX.
use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::ParseError;

/// Longest sentence accepted by the framer. Standard sentences are limited
/// to 82 characters but proprietary ones routinely exceed that.
pub const MAX_SENTENCE_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
/// A checksum-validated sentence split into address and fields
pub struct NmeaSentence {
    /// Talker id (`GP`, `GN`, ...) or `P` for proprietary sentences
    pub talker: String,
    /// Sentence formatter (`GGA`) or proprietary address (`UBX`)
    pub kind: String,
    /// Comma separated fields after the address
    pub fields: Vec<String>,
    /// Checksum carried by the sentence, if any
    pub checksum: Option<u8>,
}

/// XOR checksum over the characters between the start character and `*`
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, &x| acc ^ x)
}

/// Build a complete sentence (with checksum and CRLF) from an address such
/// as `GPGGA` or `PUBX` and its fields.
pub fn sentence(address: &str, fields: &[&str]) -> Vec<u8> {
    let mut payload = address.to_string();
    for field in fields {
        payload.push(',');
        payload.push_str(field);
    }
    format!("${}*{:02X}\r\n", payload, checksum(payload.as_bytes())).into_bytes()
}

impl NmeaSentence {
    /// Parse a framed sentence (start character through line terminator).
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(
                r"^[\$!](?P<payload>(?P<address>[A-Z0-9]{2,})(?:,(?P<data>[^*\r\n]*))?)(?:\*(?P<cksum>[0-9A-Fa-f]{2}))?\r?\n?$"
            ).expect("Failed to compile regex");
        }
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::Field(e.to_string()))?;
        let caps = RE.captures(text).ok_or(ParseError::PatternNotFound)?;
        let checksum = match caps.name("cksum") {
            Some(m) => {
                let found = u8::from_str_radix(m.as_str(), 16)
                    .map_err(|_| ParseError::Field("checksum".into()))?;
                let expected = checksum(caps["payload"].as_bytes());
                if expected != found {
                    return Err(ParseError::Checksum {
                        expected: expected as u32,
                        found: found as u32,
                    });
                }
                Some(found)
            }
            None => None,
        };
        let address = &caps["address"];
        let (talker, kind) = if let Some(rest) = address.strip_prefix('P') {
            ("P".to_string(), rest.to_string())
        } else if address.len() == 5 {
            (address[..2].to_string(), address[2..].to_string())
        } else {
            return Err(ParseError::UnknownMessage(format!("NMEA {address}")));
        };
        let fields = caps
            .name("data")
            .map(|m| m.as_str().split(',').map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            talker,
            kind,
            fields,
            checksum,
        })
    }

    fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }

    fn f64(&self, idx: usize) -> Result<Option<f64>, ParseError> {
        opt_parse(self.field(idx), idx)
    }

    fn u8(&self, idx: usize) -> Result<Option<u8>, ParseError> {
        opt_parse(self.field(idx), idx)
    }

    fn u16(&self, idx: usize) -> Result<Option<u16>, ParseError> {
        opt_parse(self.field(idx), idx)
    }

    fn text(&self, idx: usize) -> Option<String> {
        Some(self.field(idx)).filter(|s| !s.is_empty()).map(str::to_string)
    }

    fn time(&self, idx: usize) -> Result<Option<NaiveTime>, ParseError> {
        parse_time(self.field(idx))
    }

    fn lat(&self, idx: usize) -> Result<Option<f64>, ParseError> {
        parse_lat(self.field(idx), self.field(idx + 1))
    }

    fn lon(&self, idx: usize) -> Result<Option<f64>, ParseError> {
        parse_lon(self.field(idx), self.field(idx + 1))
    }
}

fn opt_parse<T: std::str::FromStr>(inp: &str, idx: usize) -> Result<Option<T>, ParseError> {
    if inp.is_empty() {
        Ok(None)
    } else {
        inp.parse()
            .map(Some)
            .map_err(|_| ParseError::Field(format!("#{idx} '{inp}'")))
    }
}

/// `ddmm.mmmm` + hemisphere into signed decimal degrees
pub fn parse_lat(inp: &str, dir: &str) -> Result<Option<f64>, ParseError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(?<deg>\d{2})(?<min>\d{2}(?:\.\d*)?)$").expect("Failed to compile regex");
    }
    parse_coord(&RE, inp, dir, "S")
}

/// `dddmm.mmmm` + hemisphere into signed decimal degrees
pub fn parse_lon(inp: &str, dir: &str) -> Result<Option<f64>, ParseError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(?<deg>\d{3})(?<min>\d{2}(?:\.\d*)?)$").expect("Failed to compile regex");
    }
    parse_coord(&RE, inp, dir, "W")
}

fn parse_coord(re: &Regex, inp: &str, dir: &str, negative: &str) -> Result<Option<f64>, ParseError> {
    if inp.is_empty() {
        return Ok(None);
    }
    let caps = re.captures(inp).ok_or(ParseError::PatternNotFound)?;
    let deg = caps["deg"]
        .parse::<f64>()
        .map_err(|_| ParseError::Field("degrees".into()))?;
    let min = caps["min"]
        .parse::<f64>()
        .map_err(|_| ParseError::Field("minutes".into()))?;
    let val = deg + min / 60.0;
    Ok(Some(if dir == negative { -val } else { val }))
}

/// `hhmmss[.ss]`
pub fn parse_time(inp: &str) -> Result<Option<NaiveTime>, ParseError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(?<hour>\d{2})(?<minute>\d{2})(?<second>\d{2})(?:\.(?<frac>\d+))?$")
                .expect("Failed to compile regex");
    }
    if inp.is_empty() {
        return Ok(None);
    }
    let caps = RE.captures(inp).ok_or(ParseError::PatternNotFound)?;
    let num = |name: &str| caps[name].parse::<u32>().unwrap_or_default();
    let micro = caps
        .name("frac")
        .map(|m| format!("{:0<6}", m.as_str())[..6].parse::<u32>().unwrap_or_default())
        .unwrap_or_default();
    NaiveTime::from_hms_micro_opt(num("hour"), num("minute"), num("second"), micro)
        .map(Some)
        .ok_or_else(|| ParseError::Field(format!("time '{inp}'")))
}

/// `ddmmyy`
fn parse_date(inp: &str) -> Result<Option<NaiveDate>, ParseError> {
    if inp.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(inp, "%d%m%y")
        .map(Some)
        .map_err(|e| ParseError::Field(format!("date '{inp}': {e}")))
}

#[derive(Debug, Clone, PartialEq)]
/// GGA / GNS shared fix data
pub struct NmeaFix {
    /// UTC time of the fix
    pub time: Option<NaiveTime>,
    /// deg, north positive
    pub lat: Option<f64>,
    /// deg, east positive
    pub lon: Option<f64>,
    /// GGA quality digit or GNS mode characters
    pub quality: String,
    /// Satellites used
    pub num_sv: Option<u8>,
    /// Horizontal dilution of precision
    pub hdop: Option<f64>,
    /// m above MSL
    pub alt: Option<f64>,
    /// geoid separation, m
    pub sep: Option<f64>,
    /// s
    pub diff_age: Option<f64>,
    /// Differential reference station
    pub diff_station: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
/// GLL position
pub struct Gll {
    /// deg
    pub lat: Option<f64>,
    /// deg
    pub lon: Option<f64>,
    /// UTC time of the position
    pub time: Option<NaiveTime>,
    /// `A` valid, `V` invalid
    pub status: String,
    /// Positioning mode (NMEA 2.3+)
    pub pos_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// GSA dilution of precision and active satellites
pub struct Gsa {
    /// `M` manual, `A` automatic 2D/3D
    pub op_mode: String,
    /// 1 no fix, 2 2D, 3 3D
    pub nav_mode: String,
    /// Satellites used in the solution
    pub svids: Vec<u16>,
    /// Position dilution of precision
    pub pdop: Option<f64>,
    /// Horizontal dilution of precision
    pub hdop: Option<f64>,
    /// Vertical dilution of precision
    pub vdop: Option<f64>,
    /// GNSS system id (NMEA 4.10+)
    pub system_id: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
/// One satellite block of a GSV sentence
pub struct GsvSatellite {
    /// Satellite number as numbered by the talker
    pub svid: u16,
    /// deg
    pub elev: Option<f64>,
    /// deg
    pub azim: Option<f64>,
    /// dBHz, empty when not tracking
    pub cno: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
/// GSV satellites in view, one part of a sequence
pub struct Gsv {
    /// Sentences in this sequence
    pub num_msgs: u8,
    /// Position of this sentence in the sequence, from 1
    pub msg_num: u8,
    /// Satellites in view across the sequence
    pub num_sv: u8,
    /// Satellites carried by this sentence
    pub sats: Vec<GsvSatellite>,
    /// Signal id (NMEA 4.10+)
    pub signal_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// RMC recommended minimum data
pub struct Rmc {
    /// UTC time
    pub time: Option<NaiveTime>,
    /// `A` valid, `V` invalid
    pub status: String,
    /// deg
    pub lat: Option<f64>,
    /// deg
    pub lon: Option<f64>,
    /// knots
    pub sog: Option<f64>,
    /// deg
    pub cog: Option<f64>,
    /// UTC date
    pub date: Option<NaiveDate>,
    /// Positioning mode (NMEA 2.3+)
    pub pos_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// VTG course and speed over ground
pub struct Vtg {
    /// True course, deg
    pub cogt: Option<f64>,
    /// Magnetic course, deg
    pub cogm: Option<f64>,
    /// knots
    pub sog_kn: Option<f64>,
    /// km/h
    pub sog_kmh: Option<f64>,
    /// Positioning mode (NMEA 2.3+)
    pub pos_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// ZDA time and date
pub struct Zda {
    /// UTC time
    pub time: Option<NaiveTime>,
    /// UTC date
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
/// GST pseudorange error statistics, all in m
pub struct Gst {
    /// UTC time
    pub time: Option<NaiveTime>,
    /// RMS of the pseudorange residuals
    pub range_rms: Option<f64>,
    /// Latitude error
    pub std_lat: Option<f64>,
    /// Longitude error
    pub std_lon: Option<f64>,
    /// Altitude error
    pub std_alt: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
/// PUBX,00 lat/long position data
pub struct Pubx00 {
    /// UTC time
    pub time: Option<NaiveTime>,
    /// deg
    pub lat: Option<f64>,
    /// deg
    pub lon: Option<f64>,
    /// m above ellipsoid
    pub alt_ref: Option<f64>,
    /// Navigation status such as `G3` or `D3`
    pub nav_stat: String,
    /// m
    pub h_acc: Option<f64>,
    /// m
    pub v_acc: Option<f64>,
    /// km/h
    pub sog: Option<f64>,
    /// deg
    pub cog: Option<f64>,
    /// s
    pub diff_age: Option<f64>,
    /// Horizontal dilution of precision
    pub hdop: Option<f64>,
    /// Vertical dilution of precision
    pub vdop: Option<f64>,
    /// Satellites used
    pub num_svs: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
/// One satellite of a PUBX,03 sentence
pub struct Pubx03Satellite {
    /// u-blox legacy satellite number
    pub svid: u16,
    /// `U` used, `e` ephemeris only, `-` not used
    pub status: String,
    /// deg
    pub azim: Option<f64>,
    /// deg
    pub elev: Option<f64>,
    /// dBHz
    pub cno: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
/// PUBX,04 time of day and clock information
pub struct Pubx04 {
    /// UTC time
    pub time: Option<NaiveTime>,
    /// UTC date
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
/// A decoded NMEA sentence. `talker` is the two letter talker id.
pub enum NmeaMessage {
    /// Fix data
    Gga {
        /// Talker id
        talker: String,
        /// Fix
        fix: NmeaFix,
    },
    /// Multi-constellation fix data
    Gns {
        /// Talker id
        talker: String,
        /// Fix
        fix: NmeaFix,
    },
    /// Geographic position
    Gll {
        /// Talker id
        talker: String,
        /// Position
        data: Gll,
    },
    /// DOP and active satellites
    Gsa {
        /// Talker id
        talker: String,
        /// DOP and satellites
        data: Gsa,
    },
    /// Satellites in view
    Gsv {
        /// Talker id
        talker: String,
        /// Satellites
        data: Gsv,
    },
    /// Recommended minimum data
    Rmc {
        /// Talker id
        talker: String,
        /// Position, velocity and time
        data: Rmc,
    },
    /// Course and speed over ground
    Vtg {
        /// Talker id
        talker: String,
        /// Course and speed
        data: Vtg,
    },
    /// Time and date
    Zda {
        /// Talker id
        talker: String,
        /// Time and date
        data: Zda,
    },
    /// Pseudorange error statistics
    Gst {
        /// Talker id
        talker: String,
        /// Error statistics
        data: Gst,
    },
    /// True heading
    Hdt {
        /// Talker id
        talker: String,
        /// deg
        heading: Option<f64>,
    },
    /// Text transmission
    Txt {
        /// Talker id
        talker: String,
        /// Message text
        text: String,
    },
    /// u-blox position
    Pubx00(Pubx00),
    /// u-blox satellite status
    Pubx03(Vec<Pubx03Satellite>),
    /// u-blox time of day
    Pubx04(Pubx04),
}

impl NmeaMessage {
    /// Parse and decode a framed sentence.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ParseError> {
        Self::decode(&NmeaSentence::parse(raw)?)
    }

    /// Decode a sentence according to its formatter.
    pub fn decode(s: &NmeaSentence) -> Result<Self, ParseError> {
        let talker = s.talker.clone();
        Ok(match (s.talker.as_str(), s.kind.as_str()) {
            ("P", "UBX") => return decode_pubx(s),
            (_, "GGA") => NmeaMessage::Gga {
                talker,
                fix: NmeaFix {
                    time: s.time(0)?,
                    lat: s.lat(1)?,
                    lon: s.lon(3)?,
                    quality: s.field(5).to_string(),
                    num_sv: s.u8(6)?,
                    hdop: s.f64(7)?,
                    alt: s.f64(8)?,
                    sep: s.f64(10)?,
                    diff_age: s.f64(12)?,
                    diff_station: s.u16(13)?,
                },
            },
            (_, "GNS") => NmeaMessage::Gns {
                talker,
                fix: NmeaFix {
                    time: s.time(0)?,
                    lat: s.lat(1)?,
                    lon: s.lon(3)?,
                    quality: s.field(5).to_string(),
                    num_sv: s.u8(6)?,
                    hdop: s.f64(7)?,
                    alt: s.f64(8)?,
                    sep: s.f64(9)?,
                    diff_age: s.f64(10)?,
                    diff_station: s.u16(11)?,
                },
            },
            (_, "GLL") => NmeaMessage::Gll {
                talker,
                data: Gll {
                    lat: s.lat(0)?,
                    lon: s.lon(2)?,
                    time: s.time(4)?,
                    status: s.field(5).to_string(),
                    pos_mode: s.text(6),
                },
            },
            (_, "GSA") => NmeaMessage::Gsa {
                talker,
                data: Gsa {
                    op_mode: s.field(0).to_string(),
                    nav_mode: s.field(1).to_string(),
                    svids: (2..14)
                        .filter_map(|i| s.u16(i).transpose())
                        .collect::<Result<Vec<_>, _>>()?,
                    pdop: s.f64(14)?,
                    hdop: s.f64(15)?,
                    vdop: s.f64(16)?,
                    system_id: s.u8(17)?,
                },
            },
            (_, "GSV") => NmeaMessage::Gsv {
                talker,
                data: decode_gsv(s)?,
            },
            (_, "RMC") => NmeaMessage::Rmc {
                talker,
                data: Rmc {
                    time: s.time(0)?,
                    status: s.field(1).to_string(),
                    lat: s.lat(2)?,
                    lon: s.lon(4)?,
                    sog: s.f64(6)?,
                    cog: s.f64(7)?,
                    date: parse_date(s.field(8))?,
                    pos_mode: s.text(11),
                },
            },
            (_, "VTG") => NmeaMessage::Vtg {
                talker,
                data: Vtg {
                    cogt: s.f64(0)?,
                    cogm: s.f64(2)?,
                    sog_kn: s.f64(4)?,
                    sog_kmh: s.f64(6)?,
                    pos_mode: s.text(8),
                },
            },
            (_, "ZDA") => {
                let date = match (s.u8(1)?, s.u8(2)?, s.u16(3)?) {
                    (Some(day), Some(month), Some(year)) => Some(
                        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                            .ok_or_else(|| ParseError::Field("ZDA date".into()))?,
                    ),
                    _ => None,
                };
                NmeaMessage::Zda {
                    talker,
                    data: Zda {
                        time: s.time(0)?,
                        date,
                    },
                }
            }
            (_, "GST") => NmeaMessage::Gst {
                talker,
                data: Gst {
                    time: s.time(0)?,
                    range_rms: s.f64(1)?,
                    std_lat: s.f64(5)?,
                    std_lon: s.f64(6)?,
                    std_alt: s.f64(7)?,
                },
            },
            (_, "HDT") => NmeaMessage::Hdt {
                talker,
                heading: s.f64(0)?,
            },
            (_, "TXT") => NmeaMessage::Txt {
                talker,
                text: s.field(3).to_string(),
            },
            (talker, kind) => {
                return Err(ParseError::UnknownMessage(format!("NMEA {talker}{kind}")))
            }
        })
    }

    /// Message identity such as `GPGGA` or `PUBX00`
    pub fn identity(&self) -> String {
        match self {
            NmeaMessage::Gga { talker, .. } => format!("{talker}GGA"),
            NmeaMessage::Gns { talker, .. } => format!("{talker}GNS"),
            NmeaMessage::Gll { talker, .. } => format!("{talker}GLL"),
            NmeaMessage::Gsa { talker, .. } => format!("{talker}GSA"),
            NmeaMessage::Gsv { talker, .. } => format!("{talker}GSV"),
            NmeaMessage::Rmc { talker, .. } => format!("{talker}RMC"),
            NmeaMessage::Vtg { talker, .. } => format!("{talker}VTG"),
            NmeaMessage::Zda { talker, .. } => format!("{talker}ZDA"),
            NmeaMessage::Gst { talker, .. } => format!("{talker}GST"),
            NmeaMessage::Hdt { talker, .. } => format!("{talker}HDT"),
            NmeaMessage::Txt { talker, .. } => format!("{talker}TXT"),
            NmeaMessage::Pubx00(_) => "PUBX00".to_string(),
            NmeaMessage::Pubx03(_) => "PUBX03".to_string(),
            NmeaMessage::Pubx04(_) => "PUBX04".to_string(),
        }
    }
}

fn decode_gsv(s: &NmeaSentence) -> Result<Gsv, ParseError> {
    let num_msgs = s.u8(0)?.ok_or(ParseError::Field("GSV numMsg".into()))?;
    let msg_num = s.u8(1)?.ok_or(ParseError::Field("GSV msgNum".into()))?;
    let num_sv = s.u8(2)?.unwrap_or_default();
    let mut sats = Vec::new();
    let mut idx = 3;
    while idx + 3 < s.fields.len() {
        if let Some(svid) = s.u16(idx)? {
            sats.push(GsvSatellite {
                svid,
                elev: s.f64(idx + 1)?,
                azim: s.f64(idx + 2)?,
                cno: s.f64(idx + 3)?,
            });
        }
        idx += 4;
    }
    // NMEA 4.10+ appends a signal id after the satellite blocks
    let signal_id = if idx < s.fields.len() {
        s.text(idx)
    } else {
        None
    };
    Ok(Gsv {
        num_msgs,
        msg_num,
        num_sv,
        sats,
        signal_id,
    })
}

fn decode_pubx(s: &NmeaSentence) -> Result<NmeaMessage, ParseError> {
    match s.field(0) {
        "00" => Ok(NmeaMessage::Pubx00(Pubx00 {
            time: s.time(1)?,
            lat: s.lat(2)?,
            lon: s.lon(4)?,
            alt_ref: s.f64(6)?,
            nav_stat: s.field(7).to_string(),
            h_acc: s.f64(8)?,
            v_acc: s.f64(9)?,
            sog: s.f64(10)?,
            cog: s.f64(11)?,
            diff_age: s.f64(13)?,
            hdop: s.f64(14)?,
            vdop: s.f64(15)?,
            num_svs: s.u8(17)?,
        })),
        "03" => {
            let count = s.u8(1)?.unwrap_or_default() as usize;
            let sats = (0..count)
                .map(|i| {
                    let off = 2 + 6 * i;
                    let svid = s
                        .u16(off)?
                        .ok_or_else(|| ParseError::Field(format!("PUBX03 sv #{i}")))?;
                    // block order on the wire: sv, status, azimuth, elevation, cno, lock
                    Ok(Pubx03Satellite {
                        svid,
                        status: s.field(off + 1).to_string(),
                        azim: s.f64(off + 2)?,
                        elev: s.f64(off + 3)?,
                        cno: s.f64(off + 4)?,
                    })
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            Ok(NmeaMessage::Pubx03(sats))
        }
        "04" => Ok(NmeaMessage::Pubx04(Pubx04 {
            time: s.time(1)?,
            date: parse_date(s.field(2))?,
        })),
        other => Err(ParseError::UnknownMessage(format!("NMEA PUBX,{other}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gga() {
        let raw = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        let NmeaMessage::Gga { talker, fix } = NmeaMessage::from_bytes(raw).unwrap() else {
            panic!("expected GGA");
        };
        assert_eq!(talker, "GP");
        assert!((fix.lat.unwrap() - 48.1173).abs() < 1e-4);
        assert!((fix.lon.unwrap() - 11.516_666).abs() < 1e-4);
        assert_eq!(fix.quality, "1");
        assert_eq!(fix.num_sv, Some(8));
        assert_eq!(fix.alt, Some(545.4));
        assert_eq!(fix.diff_age, None);
        assert_eq!(fix.time, NaiveTime::from_hms_opt(12, 35, 19));
    }

    #[test]
    fn bad_checksum() {
        let raw = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48\r\n";
        assert!(matches!(
            NmeaSentence::parse(raw),
            Err(ParseError::Checksum { expected: 0x47, found: 0x48 })
        ));
    }

    #[test]
    fn no_checksum() {
        let raw = b"$GPHDT,274.07,T\r\n";
        assert_eq!(
            NmeaMessage::from_bytes(raw),
            Ok(NmeaMessage::Hdt {
                talker: "GP".into(),
                heading: Some(274.07)
            })
        );
    }

    #[test]
    fn gsv_with_signal_id() {
        let raw = b"$GPGSV,3,3,10,44,23,237,44,46,15,247,33,1*65\r\n";
        let NmeaMessage::Gsv { data, .. } = NmeaMessage::from_bytes(raw).unwrap() else {
            panic!("expected GSV");
        };
        assert_eq!(data.msg_num, 3);
        assert_eq!(data.sats.len(), 2);
        assert_eq!(data.sats[1].svid, 46);
        assert_eq!(data.sats[1].cno, Some(33.0));
        assert_eq!(data.signal_id.as_deref(), Some("1"));
    }

    #[test]
    fn gsv_untracked() {
        let raw = b"$GPGSV,1,1,02,09,16,316,,28,30,090,,0*6D\r\n";
        let NmeaMessage::Gsv { data, .. } = NmeaMessage::from_bytes(raw).unwrap() else {
            panic!("expected GSV");
        };
        assert_eq!(data.sats[0].cno, None);
        assert_eq!(data.sats[1].azim, Some(90.0));
    }

    #[test]
    fn rmc() {
        let raw = b"$GNRMC,221515.00,A,4238.96342,N,07118.97943,W,0.046,,031024,,,D,V*0D\r\n";
        let NmeaMessage::Rmc { data, .. } = NmeaMessage::from_bytes(raw).unwrap() else {
            panic!("expected RMC");
        };
        assert!(data.lon.unwrap() < -71.0);
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 10, 3));
        assert_eq!(data.pos_mode.as_deref(), Some("D"));
        assert_eq!(data.cog, None);
    }

    #[test]
    fn zda() {
        let raw = b"$GNZDA,221515.00,03,10,2024,00,00*7E\r\n";
        let NmeaMessage::Zda { data, .. } = NmeaMessage::from_bytes(raw).unwrap() else {
            panic!("expected ZDA");
        };
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 10, 3));
        assert_eq!(data.time, NaiveTime::from_hms_opt(22, 15, 15));
    }

    #[test]
    fn pubx03_pairs_elevation_and_azimuth() {
        let raw = sentence("PUBX", &["03", "2", "5", "U", "270", "45", "41", "064", "70", "-", "016", "10", "", "000"]);
        let NmeaMessage::Pubx03(sats) = NmeaMessage::from_bytes(&raw).unwrap() else {
            panic!("expected PUBX03");
        };
        assert_eq!(sats.len(), 2);
        assert_eq!(sats[0].azim, Some(270.0));
        assert_eq!(sats[0].elev, Some(45.0));
        assert_eq!(sats[1].svid, 70);
        assert_eq!(sats[1].cno, None);
    }

    #[test]
    fn malformed_field() {
        let raw = sentence("GPGGA", &["123519", "48x7.038", "N", "01131.000", "E", "1"]);
        assert_eq!(NmeaMessage::from_bytes(&raw), Err(ParseError::PatternNotFound));
        let raw = sentence("GPGSA", &["A", "3", "0x", "", "", "", "", "", "", "", "", "", "", "", "1.0"]);
        assert!(matches!(NmeaMessage::from_bytes(&raw), Err(ParseError::Field(_))));
    }

    #[test]
    fn unknown_sentence() {
        let raw = sentence("GPXYZ", &["1"]);
        assert!(matches!(
            NmeaMessage::from_bytes(&raw),
            Err(ParseError::UnknownMessage(_))
        ));
    }

    #[test]
    fn coordinates() {
        assert_eq!(parse_lat("", ""), Ok(None));
        assert!((parse_lat("4238.96342", "S").unwrap().unwrap() + 42.649390).abs() < 1e-6);
        assert!(parse_lon("7118.97943", "W").is_err());
    }
}

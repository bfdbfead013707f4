//! Typed UBX payload decoders.
use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

use super::{class, message_name, Fields, UbxFrame};
use crate::ParseError;

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// NAV-PVT `flags`
pub struct PvtFlags {
    /// Valid fix within DOP and accuracy masks
    pub gnss_fix_ok: bool,
    /// Differential corrections applied
    pub diff_soln: bool,
    #[bits(3)]
    /// Power save mode state
    pub psm_state: u8,
    /// Heading of vehicle is valid
    pub head_veh_valid: bool,
    #[bits(2)]
    /// Carrier phase range solution: 0 none, 1 float, 2 fixed
    pub carr_soln: u8,
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// NAV-STATUS / NAV-SOL `flags`
pub struct FixFlags {
    /// Position and velocity valid and within DOP and accuracy masks
    pub gps_fix_ok: bool,
    /// Differential corrections applied
    pub diff_soln: bool,
    /// Week number valid
    pub wkn_set: bool,
    /// Time of week valid
    pub tow_set: bool,
    #[bits(4)]
    __: u8,
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// HNR-PVT `flags`
pub struct HnrFlags {
    /// Fix within limits
    pub gps_fix_ok: bool,
    /// Differential corrections applied
    pub diff_soln: bool,
    /// Week number valid
    pub wkn_set: bool,
    /// Time of week valid
    pub tow_set: bool,
    /// Heading of vehicle valid
    pub head_veh_valid: bool,
    #[bits(3)]
    __: u8,
}

#[bitfield(u32)]
#[derive(PartialEq, Eq)]
/// NAV-SAT per satellite `flags`
pub struct SatFlags {
    #[bits(3)]
    /// Signal quality indicator
    pub quality_ind: u8,
    /// Used for navigation
    pub sv_used: bool,
    #[bits(2)]
    /// Signal health
    pub health: u8,
    /// Differential correction available
    pub diff_corr: bool,
    /// Carrier smoothed pseudorange used
    pub smoothed: bool,
    #[bits(3)]
    /// Orbit source
    pub orbit_source: u8,
    /// Ephemeris available
    pub eph_avail: bool,
    /// Almanac available
    pub alm_avail: bool,
    /// AssistNow Offline data available
    pub ano_avail: bool,
    /// AssistNow Autonomous data available
    pub aop_avail: bool,
    #[bits(1)]
    __reserved: u8,
    /// SBAS corrections used
    pub sbas_corr_used: bool,
    /// RTCM corrections used
    pub rtcm_corr_used: bool,
    /// QZSS SLAS corrections used
    pub slas_corr_used: bool,
    /// SPARTN corrections used
    pub spartn_corr_used: bool,
    /// Pseudorange corrections used
    pub pr_corr_used: bool,
    /// Carrier range corrections used
    pub cr_corr_used: bool,
    /// Range rate corrections used
    pub do_corr_used: bool,
    /// CLAS corrections used
    pub clas_corr_used: bool,
    #[bits(8)]
    __padding: u8,
}

#[bitfield(u32)]
#[derive(PartialEq, Eq)]
/// NAV-RELPOSNED `flags`
pub struct RelPosFlags {
    /// Valid fix
    pub gnss_fix_ok: bool,
    /// Differential corrections applied
    pub diff_soln: bool,
    /// Relative position components valid
    pub rel_pos_valid: bool,
    #[bits(2)]
    /// Carrier phase solution: 0 none, 1 float, 2 fixed
    pub carr_soln: u8,
    /// Receiver operating in moving base mode
    pub is_moving: bool,
    /// Extrapolated reference position used
    pub ref_pos_miss: bool,
    /// Extrapolated reference observations used
    pub ref_obs_miss: bool,
    /// Heading valid
    pub rel_pos_heading_valid: bool,
    /// Components normalized
    pub rel_pos_normalized: bool,
    #[bits(22)]
    __: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-PVT navigation position velocity time solution
pub struct NavPvt {
    /// GPS time of week, ms
    pub itow: u32,
    /// UTC year
    pub year: u16,
    /// UTC month
    pub month: u8,
    /// UTC day
    pub day: u8,
    /// UTC hour
    pub hour: u8,
    /// UTC minute
    pub min: u8,
    /// UTC second
    pub sec: u8,
    /// Validity flags: bit0 date, bit1 time, bit2 fully resolved
    pub valid: u8,
    /// Fraction of second, ns
    pub nano: i32,
    /// GNSS fix type
    pub fix_type: u8,
    /// Fix status flags
    pub flags: PvtFlags,
    /// Satellites used
    pub num_sv: u8,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// mm above ellipsoid
    pub height: i32,
    /// mm above mean sea level
    pub hmsl: i32,
    /// mm
    pub h_acc: u32,
    /// mm
    pub v_acc: u32,
    /// mm/s
    pub g_speed: i32,
    /// 1e-5 deg
    pub head_mot: i32,
    /// 0.01
    pub pdop: u16,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-POSLLH geodetic position
pub struct NavPosllh {
    /// GPS time of week, ms
    pub itow: u32,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// mm above ellipsoid
    pub height: i32,
    /// mm above mean sea level
    pub hmsl: i32,
    /// mm
    pub h_acc: u32,
    /// mm
    pub v_acc: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-HPPOSLLH high precision geodetic position
pub struct NavHpposllh {
    /// GPS time of week, ms
    pub itow: u32,
    /// Position fields are invalid
    pub invalid_llh: bool,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// mm above ellipsoid
    pub height: i32,
    /// mm above mean sea level
    pub hmsl: i32,
    /// 1e-9 deg
    pub lon_hp: i8,
    /// 1e-9 deg
    pub lat_hp: i8,
    /// 0.1 mm
    pub height_hp: i8,
    /// 0.1 mm
    pub hmsl_hp: i8,
    /// 0.1 mm
    pub h_acc: u32,
    /// 0.1 mm
    pub v_acc: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-STATUS receiver navigation status
pub struct NavStatus {
    /// GPS time of week, ms
    pub itow: u32,
    /// GNSS fix type
    pub gps_fix: u8,
    /// Fix status flags
    pub flags: FixFlags,
    /// ms
    pub ttff: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-DOP dilution of precision, all scaled by 0.01
pub struct NavDop {
    /// GPS time of week, ms
    pub itow: u32,
    /// Geometric DOP
    pub gdop: u16,
    /// Position DOP, 0.01
    pub pdop: u16,
    /// Time DOP
    pub tdop: u16,
    /// Vertical DOP
    pub vdop: u16,
    /// Horizontal DOP
    pub hdop: u16,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-SOL ECEF navigation solution
pub struct NavSol {
    /// GPS time of week, ms
    pub itow: u32,
    /// GNSS fix type
    pub gps_fix: u8,
    /// Fix status flags
    pub flags: FixFlags,
    /// cm
    pub ecef_x: i32,
    /// cm
    pub ecef_y: i32,
    /// cm
    pub ecef_z: i32,
    /// cm
    pub p_acc: u32,
    /// Position DOP, 0.01
    pub pdop: u16,
    /// Satellites used
    pub num_sv: u8,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-VELNED velocity in NED frame
pub struct NavVelned {
    /// GPS time of week, ms
    pub itow: u32,
    /// cm/s
    pub g_speed: u32,
    /// 1e-5 deg
    pub heading: i32,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-TIMEUTC
pub struct NavTimeutc {
    /// GPS time of week, ms
    pub itow: u32,
    /// Fraction of second, ns
    pub nano: i32,
    /// UTC year
    pub year: u16,
    /// UTC month
    pub month: u8,
    /// UTC day
    pub day: u8,
    /// UTC hour
    pub hour: u8,
    /// UTC minute
    pub min: u8,
    /// UTC second
    pub sec: u8,
    /// Validity flags: bit0 time of week, bit1 week number, bit2 UTC
    pub valid: u8,
}

#[derive(Debug, Clone, PartialEq)]
/// One NAV-SAT satellite block
pub struct NavSatInfo {
    /// GNSS identifier
    pub gnss_id: u8,
    /// Satellite number within the constellation
    pub sv_id: u8,
    /// dBHz
    pub cno: u8,
    /// deg
    pub elev: i8,
    /// deg
    pub azim: i16,
    /// Per satellite flags
    pub flags: SatFlags,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-SAT satellite information
pub struct NavSat {
    /// GPS time of week, ms
    pub itow: u32,
    /// Satellite blocks
    pub svs: Vec<NavSatInfo>,
}

#[derive(Debug, Clone, PartialEq)]
/// One NAV-SVINFO channel block
pub struct NavSvinfoChannel {
    /// Channel number
    pub chn: u8,
    /// Legacy single-range satellite number
    pub svid: u8,
    /// Channel flags
    pub flags: u8,
    /// Signal quality indicator
    pub quality: u8,
    /// dBHz
    pub cno: u8,
    /// deg
    pub elev: i8,
    /// deg
    pub azim: i16,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-SVINFO legacy satellite information
pub struct NavSvinfo {
    /// GPS time of week, ms
    pub itow: u32,
    /// Channel blocks
    pub channels: Vec<NavSvinfoChannel>,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-RELPOSNED relative position of rover to base
pub struct NavRelposned {
    /// Message version
    pub version: u8,
    /// Reference station id
    pub ref_station_id: u16,
    /// GPS time of week, ms
    pub itow: u32,
    /// cm
    pub rel_pos_n: i32,
    /// cm
    pub rel_pos_e: i32,
    /// cm
    pub rel_pos_d: i32,
    /// cm, version 1 only
    pub rel_pos_length: Option<i32>,
    /// 1e-5 deg, version 1 only
    pub rel_pos_heading: Option<i32>,
    /// 0.1 mm
    pub rel_pos_hp_length: Option<i8>,
    /// 0.1 mm, version 1 only
    pub acc_length: Option<u32>,
    /// 1e-5 deg, version 1 only
    pub acc_heading: Option<u32>,
    /// Relative position flags
    pub flags: RelPosFlags,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-SVIN survey-in status
pub struct NavSvin {
    /// GPS time of week, ms
    pub itow: u32,
    /// s
    pub dur: u32,
    /// cm
    pub mean_x: i32,
    /// cm
    pub mean_y: i32,
    /// cm
    pub mean_z: i32,
    /// 0.1 mm
    pub mean_acc: u32,
    /// Observations used
    pub obs: u32,
    /// Survey-in position is valid
    pub valid: bool,
    /// Survey-in in progress
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
/// NAV-ATT and HNR-ATT attitude solution, angles in 1e-5 deg
pub struct UbxAttitude {
    /// GPS time of week, ms
    pub itow: u32,
    /// Roll
    pub roll: i32,
    /// Pitch
    pub pitch: i32,
    /// Heading
    pub heading: i32,
    /// Roll accuracy
    pub acc_roll: u32,
    /// Pitch accuracy
    pub acc_pitch: u32,
    /// Heading accuracy
    pub acc_heading: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// HNR-PVT high rate output
pub struct HnrPvt {
    /// GPS time of week, ms
    pub itow: u32,
    /// UTC hour
    pub hour: u8,
    /// UTC minute
    pub min: u8,
    /// UTC second
    pub sec: u8,
    /// GNSS fix type
    pub gps_fix: u8,
    /// Fix status flags
    pub flags: HnrFlags,
    /// 1e-7 deg
    pub lon: i32,
    /// 1e-7 deg
    pub lat: i32,
    /// mm
    pub height: i32,
    /// mm
    pub hmsl: i32,
    /// mm/s
    pub g_speed: i32,
    /// 1e-5 deg
    pub head_mot: i32,
    /// mm
    pub h_acc: u32,
    /// mm
    pub v_acc: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// ESF-ALG IMU mount alignment, angles in 1e-2 deg
pub struct EsfAlg {
    /// GPS time of week, ms
    pub itow: u32,
    /// Automatic alignment enabled
    pub auto_mnt_alg_on: bool,
    /// 0 user defined, 1 roll/pitch ongoing, 2 roll/pitch/yaw ongoing,
    /// 3 coarse, 4 fine
    pub status: u8,
    /// Error flags
    pub errors: u8,
    /// 1e-2 deg
    pub yaw: u32,
    /// 1e-2 deg
    pub pitch: i16,
    /// 1e-2 deg
    pub roll: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One MON-SPAN RF block
pub struct MonSpanBlock {
    /// Spectrum, 0.25 dB units
    pub spectrum: Vec<u8>,
    /// Hz
    pub span: u32,
    /// Hz
    pub res: u32,
    /// Hz
    pub center: u32,
    /// dB
    pub pga: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// MON-SYS system monitor
pub struct MonSys {
    /// Boot type of the last start
    pub boot_type: u8,
    /// %
    pub cpu_load: u8,
    /// %
    pub cpu_load_max: u8,
    /// %
    pub mem_usage: u8,
    /// %
    pub mem_usage_max: u8,
    /// %
    pub io_usage: u8,
    /// %
    pub io_usage_max: u8,
    /// s
    pub run_time: u32,
    /// Notices since startup
    pub notice_count: u16,
    /// Warnings since startup
    pub warn_count: u16,
    /// Errors since startup
    pub error_count: u16,
    /// degC
    pub temp_value: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One MON-COMMS port block
pub struct MonCommsPort {
    /// Port identifier
    pub port_id: u16,
    /// Bytes pending in the transmit buffer
    pub tx_pending: u16,
    /// Bytes sent
    pub tx_bytes: u32,
    /// 0-255 = 0-100%
    pub tx_usage: u8,
    /// Peak transmit buffer usage
    pub tx_peak_usage: u8,
    /// Bytes pending in the receive buffer
    pub rx_pending: u16,
    /// Bytes received
    pub rx_bytes: u32,
    /// Receive buffer usage
    pub rx_usage: u8,
    /// Peak receive buffer usage
    pub rx_peak_usage: u8,
    /// Overrun errors
    pub overrun_errs: u16,
    /// Message counts per protocol, indexed like `prot_ids`
    pub msgs: [u16; 4],
    /// Bytes skipped
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// MON-COMMS communication port status
pub struct MonComms {
    /// Transmitter error flags
    pub tx_errors: u8,
    /// 0 UBX, 1 NMEA, 2 RTCM3, 5 SPARTN, 0xFF none
    pub prot_ids: [u8; 4],
    /// Port blocks
    pub ports: Vec<MonCommsPort>,
}

#[derive(Debug, Clone, PartialEq)]
/// MON-VER receiver and software version
pub struct MonVer {
    /// Software version
    pub sw_version: String,
    /// Hardware version
    pub hw_version: String,
    /// Extended version strings
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// RXM-RTCM input status
pub struct RxmRtcm {
    /// RTCM frame failed its CRC
    pub crc_failed: bool,
    /// 0 unknown, 1 not used, 2 used
    pub msg_used: u8,
    /// 4072 sub-type
    pub sub_type: u16,
    /// Reference station id
    pub ref_station: u16,
    /// RTCM message number
    pub msg_type: u16,
}

#[derive(Debug, Clone, PartialEq)]
/// A decoded UBX message
pub enum UbxMessage {
    /// ACK-ACK
    AckAck {
        /// Class of the acknowledged message
        class: u8,
        /// Id of the acknowledged message
        id: u8,
    },
    /// ACK-NAK
    AckNak {
        /// Class of the rejected message
        class: u8,
        /// Id of the rejected message
        id: u8,
    },
    /// NAV-PVT
    NavPvt(NavPvt),
    /// NAV-POSLLH
    NavPosllh(NavPosllh),
    /// NAV-HPPOSLLH
    NavHpposllh(NavHpposllh),
    /// NAV-STATUS
    NavStatus(NavStatus),
    /// NAV-DOP
    NavDop(NavDop),
    /// NAV-SOL
    NavSol(NavSol),
    /// NAV-VELNED
    NavVelned(NavVelned),
    /// NAV-TIMEUTC
    NavTimeutc(NavTimeutc),
    /// NAV-SAT
    NavSat(NavSat),
    /// NAV-SVINFO
    NavSvinfo(NavSvinfo),
    /// NAV-RELPOSNED
    NavRelposned(NavRelposned),
    /// NAV-SVIN
    NavSvin(NavSvin),
    /// NAV-ATT
    NavAtt(UbxAttitude),
    /// HNR-PVT
    HnrPvt(HnrPvt),
    /// HNR-ATT
    HnrAtt(UbxAttitude),
    /// ESF-ALG
    EsfAlg(EsfAlg),
    /// MON-SPAN, one block per RF path
    MonSpan(Vec<MonSpanBlock>),
    /// MON-SYS
    MonSys(MonSys),
    /// MON-COMMS
    MonComms(MonComms),
    /// MON-VER
    MonVer(MonVer),
    /// RXM-RTCM
    RxmRtcm(RxmRtcm),
    /// Known identity without a dedicated decoder
    Generic {
        /// Message class
        class: u8,
        /// Message id
        id: u8,
        /// Name from the message table
        name: &'static str,
        /// Undecoded payload
        payload: Vec<u8>,
    },
}

impl UbxMessage {
    /// Decode a complete UBX frame (sync through checksum).
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ParseError> {
        Self::decode(&UbxFrame::from_bytes(raw)?)
    }

    /// Decode the payload of a UBX frame according to its identity.
    pub fn decode(frame: &UbxFrame) -> Result<Self, ParseError> {
        let name = message_name(frame.class, frame.id).ok_or_else(|| {
            ParseError::UnknownMessage(format!("UBX {:02X}-{:02X}", frame.class, frame.id))
        })?;
        let f = Fields::new(&frame.payload, name);
        use class::*;
        Ok(match (frame.class, frame.id) {
            (ACK, 0x00) => UbxMessage::AckNak {
                class: f.u1(0)?,
                id: f.u1(1)?,
            },
            (ACK, 0x01) => UbxMessage::AckAck {
                class: f.u1(0)?,
                id: f.u1(1)?,
            },
            (NAV, 0x07) => UbxMessage::NavPvt(decode_nav_pvt(&f)?),
            (NAV, 0x02) => {
                f.require(28)?;
                UbxMessage::NavPosllh(NavPosllh {
                    itow: f.u4(0)?,
                    lon: f.i4(4)?,
                    lat: f.i4(8)?,
                    height: f.i4(12)?,
                    hmsl: f.i4(16)?,
                    h_acc: f.u4(20)?,
                    v_acc: f.u4(24)?,
                })
            }
            (NAV, 0x14) => {
                f.require(36)?;
                UbxMessage::NavHpposllh(NavHpposllh {
                    invalid_llh: f.u1(3)? & 0x01 != 0,
                    itow: f.u4(4)?,
                    lon: f.i4(8)?,
                    lat: f.i4(12)?,
                    height: f.i4(16)?,
                    hmsl: f.i4(20)?,
                    lon_hp: f.i1(24)?,
                    lat_hp: f.i1(25)?,
                    height_hp: f.i1(26)?,
                    hmsl_hp: f.i1(27)?,
                    h_acc: f.u4(28)?,
                    v_acc: f.u4(32)?,
                })
            }
            (NAV, 0x03) => {
                f.require(16)?;
                UbxMessage::NavStatus(NavStatus {
                    itow: f.u4(0)?,
                    gps_fix: f.u1(4)?,
                    flags: FixFlags::from_bits(f.u1(5)?),
                    ttff: f.u4(8)?,
                })
            }
            (NAV, 0x04) => {
                f.require(18)?;
                UbxMessage::NavDop(NavDop {
                    itow: f.u4(0)?,
                    gdop: f.u2(4)?,
                    pdop: f.u2(6)?,
                    tdop: f.u2(8)?,
                    vdop: f.u2(10)?,
                    hdop: f.u2(12)?,
                })
            }
            (NAV, 0x06) => {
                f.require(52)?;
                UbxMessage::NavSol(NavSol {
                    itow: f.u4(0)?,
                    gps_fix: f.u1(10)?,
                    flags: FixFlags::from_bits(f.u1(11)?),
                    ecef_x: f.i4(12)?,
                    ecef_y: f.i4(16)?,
                    ecef_z: f.i4(20)?,
                    p_acc: f.u4(24)?,
                    pdop: f.u2(44)?,
                    num_sv: f.u1(47)?,
                })
            }
            (NAV, 0x12) => {
                f.require(36)?;
                UbxMessage::NavVelned(NavVelned {
                    itow: f.u4(0)?,
                    g_speed: f.u4(20)?,
                    heading: f.i4(24)?,
                })
            }
            (NAV, 0x21) => {
                f.require(20)?;
                UbxMessage::NavTimeutc(NavTimeutc {
                    itow: f.u4(0)?,
                    nano: f.i4(8)?,
                    year: f.u2(12)?,
                    month: f.u1(14)?,
                    day: f.u1(15)?,
                    hour: f.u1(16)?,
                    min: f.u1(17)?,
                    sec: f.u1(18)?,
                    valid: f.u1(19)?,
                })
            }
            (NAV, 0x35) => UbxMessage::NavSat(decode_nav_sat(&f)?),
            (NAV, 0x30) => UbxMessage::NavSvinfo(decode_nav_svinfo(&f)?),
            (NAV, 0x3C) => UbxMessage::NavRelposned(decode_nav_relposned(&f)?),
            (NAV, 0x3B) => {
                f.require(40)?;
                UbxMessage::NavSvin(NavSvin {
                    itow: f.u4(4)?,
                    dur: f.u4(8)?,
                    mean_x: f.i4(12)?,
                    mean_y: f.i4(16)?,
                    mean_z: f.i4(20)?,
                    mean_acc: f.u4(28)?,
                    obs: f.u4(32)?,
                    valid: f.u1(36)? != 0,
                    active: f.u1(37)? != 0,
                })
            }
            (NAV, 0x05) => UbxMessage::NavAtt(decode_attitude(&f)?),
            (HNR, 0x01) => UbxMessage::HnrAtt(decode_attitude(&f)?),
            (HNR, 0x00) => {
                f.require(72)?;
                UbxMessage::HnrPvt(HnrPvt {
                    itow: f.u4(0)?,
                    hour: f.u1(8)?,
                    min: f.u1(9)?,
                    sec: f.u1(10)?,
                    gps_fix: f.u1(16)?,
                    flags: HnrFlags::from_bits(f.u1(17)?),
                    lon: f.i4(20)?,
                    lat: f.i4(24)?,
                    height: f.i4(28)?,
                    hmsl: f.i4(32)?,
                    g_speed: f.i4(36)?,
                    head_mot: f.i4(44)?,
                    h_acc: f.u4(52)?,
                    v_acc: f.u4(56)?,
                })
            }
            (ESF, 0x14) => {
                f.require(16)?;
                let flags = f.u1(5)?;
                UbxMessage::EsfAlg(EsfAlg {
                    itow: f.u4(0)?,
                    auto_mnt_alg_on: flags & 0x01 != 0,
                    status: (flags >> 1) & 0x07,
                    errors: f.u1(6)?,
                    yaw: f.u4(8)?,
                    pitch: f.i2(12)?,
                    roll: f.i2(14)?,
                })
            }
            (MON, 0x31) => UbxMessage::MonSpan(decode_mon_span(&f)?),
            (MON, 0x39) => {
                f.require(24)?;
                UbxMessage::MonSys(MonSys {
                    boot_type: f.u1(1)?,
                    cpu_load: f.u1(2)?,
                    cpu_load_max: f.u1(3)?,
                    mem_usage: f.u1(4)?,
                    mem_usage_max: f.u1(5)?,
                    io_usage: f.u1(6)?,
                    io_usage_max: f.u1(7)?,
                    run_time: f.u4(8)?,
                    notice_count: f.u2(12)?,
                    warn_count: f.u2(14)?,
                    error_count: f.u2(16)?,
                    temp_value: f.i1(18)?,
                })
            }
            (MON, 0x36) => UbxMessage::MonComms(decode_mon_comms(&f)?),
            (MON, 0x04) => {
                f.require(40)?;
                let extensions = (40..f.len())
                    .step_by(30)
                    .filter(|off| off + 30 <= f.len())
                    .map(|off| f.string(off, 30))
                    .collect::<Result<Vec<_>, _>>()?;
                UbxMessage::MonVer(MonVer {
                    sw_version: f.string(0, 30)?,
                    hw_version: f.string(30, 10)?,
                    extensions,
                })
            }
            (RXM, 0x32) => {
                f.require(8)?;
                let flags = f.u1(1)?;
                UbxMessage::RxmRtcm(RxmRtcm {
                    crc_failed: flags & 0x01 != 0,
                    msg_used: (flags >> 1) & 0x03,
                    sub_type: f.u2(2)?,
                    ref_station: f.u2(4)?,
                    msg_type: f.u2(6)?,
                })
            }
            (class, id) => UbxMessage::Generic {
                class,
                id,
                name,
                payload: frame.payload.clone(),
            },
        })
    }

    /// Message identity such as `NAV-PVT`
    pub fn identity(&self) -> &'static str {
        match self {
            UbxMessage::AckAck { .. } => "ACK-ACK",
            UbxMessage::AckNak { .. } => "ACK-NAK",
            UbxMessage::NavPvt(_) => "NAV-PVT",
            UbxMessage::NavPosllh(_) => "NAV-POSLLH",
            UbxMessage::NavHpposllh(_) => "NAV-HPPOSLLH",
            UbxMessage::NavStatus(_) => "NAV-STATUS",
            UbxMessage::NavDop(_) => "NAV-DOP",
            UbxMessage::NavSol(_) => "NAV-SOL",
            UbxMessage::NavVelned(_) => "NAV-VELNED",
            UbxMessage::NavTimeutc(_) => "NAV-TIMEUTC",
            UbxMessage::NavSat(_) => "NAV-SAT",
            UbxMessage::NavSvinfo(_) => "NAV-SVINFO",
            UbxMessage::NavRelposned(_) => "NAV-RELPOSNED",
            UbxMessage::NavSvin(_) => "NAV-SVIN",
            UbxMessage::NavAtt(_) => "NAV-ATT",
            UbxMessage::HnrPvt(_) => "HNR-PVT",
            UbxMessage::HnrAtt(_) => "HNR-ATT",
            UbxMessage::EsfAlg(_) => "ESF-ALG",
            UbxMessage::MonSpan(_) => "MON-SPAN",
            UbxMessage::MonSys(_) => "MON-SYS",
            UbxMessage::MonComms(_) => "MON-COMMS",
            UbxMessage::MonVer(_) => "MON-VER",
            UbxMessage::RxmRtcm(_) => "RXM-RTCM",
            UbxMessage::Generic { name, .. } => name,
        }
    }
}

fn decode_nav_pvt(f: &Fields) -> Result<NavPvt, ParseError> {
    f.require(92)?;
    Ok(NavPvt {
        itow: f.u4(0)?,
        year: f.u2(4)?,
        month: f.u1(6)?,
        day: f.u1(7)?,
        hour: f.u1(8)?,
        min: f.u1(9)?,
        sec: f.u1(10)?,
        valid: f.u1(11)?,
        nano: f.i4(16)?,
        fix_type: f.u1(20)?,
        flags: PvtFlags::from_bits(f.u1(21)?),
        num_sv: f.u1(23)?,
        lon: f.i4(24)?,
        lat: f.i4(28)?,
        height: f.i4(32)?,
        hmsl: f.i4(36)?,
        h_acc: f.u4(40)?,
        v_acc: f.u4(44)?,
        g_speed: f.i4(60)?,
        head_mot: f.i4(64)?,
        pdop: f.u2(76)?,
    })
}

fn decode_nav_sat(f: &Fields) -> Result<NavSat, ParseError> {
    f.require(8)?;
    let num_svs = f.u1(5)? as usize;
    f.require(8 + 12 * num_svs)?;
    let svs = (0..num_svs)
        .map(|i| {
            let off = 8 + 12 * i;
            Ok(NavSatInfo {
                gnss_id: f.u1(off)?,
                sv_id: f.u1(off + 1)?,
                cno: f.u1(off + 2)?,
                elev: f.i1(off + 3)?,
                azim: f.i2(off + 4)?,
                flags: SatFlags::from_bits(f.u4(off + 8)?),
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    Ok(NavSat {
        itow: f.u4(0)?,
        svs,
    })
}

fn decode_nav_svinfo(f: &Fields) -> Result<NavSvinfo, ParseError> {
    f.require(8)?;
    let num_ch = f.u1(4)? as usize;
    f.require(8 + 12 * num_ch)?;
    let channels = (0..num_ch)
        .map(|i| {
            let off = 8 + 12 * i;
            Ok(NavSvinfoChannel {
                chn: f.u1(off)?,
                svid: f.u1(off + 1)?,
                flags: f.u1(off + 2)?,
                quality: f.u1(off + 3)?,
                cno: f.u1(off + 4)?,
                elev: f.i1(off + 5)?,
                azim: f.i2(off + 6)?,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    Ok(NavSvinfo {
        itow: f.u4(0)?,
        channels,
    })
}

fn decode_nav_relposned(f: &Fields) -> Result<NavRelposned, ParseError> {
    let version = f.u1(0)?;
    if version == 0 {
        f.require(40)?;
        Ok(NavRelposned {
            version,
            ref_station_id: f.u2(2)?,
            itow: f.u4(4)?,
            rel_pos_n: f.i4(8)?,
            rel_pos_e: f.i4(12)?,
            rel_pos_d: f.i4(16)?,
            rel_pos_length: None,
            rel_pos_heading: None,
            rel_pos_hp_length: None,
            acc_length: None,
            acc_heading: None,
            flags: RelPosFlags::from_bits(f.u4(36)?),
        })
    } else {
        f.require(64)?;
        Ok(NavRelposned {
            version,
            ref_station_id: f.u2(2)?,
            itow: f.u4(4)?,
            rel_pos_n: f.i4(8)?,
            rel_pos_e: f.i4(12)?,
            rel_pos_d: f.i4(16)?,
            rel_pos_length: Some(f.i4(20)?),
            rel_pos_heading: Some(f.i4(24)?),
            rel_pos_hp_length: Some(f.i1(35)?),
            acc_length: Some(f.u4(48)?),
            acc_heading: Some(f.u4(52)?),
            flags: RelPosFlags::from_bits(f.u4(60)?),
        })
    }
}

fn decode_attitude(f: &Fields) -> Result<UbxAttitude, ParseError> {
    f.require(32)?;
    Ok(UbxAttitude {
        itow: f.u4(0)?,
        roll: f.i4(8)?,
        pitch: f.i4(12)?,
        heading: f.i4(16)?,
        acc_roll: f.u4(20)?,
        acc_pitch: f.u4(24)?,
        acc_heading: f.u4(28)?,
    })
}

fn decode_mon_span(f: &Fields) -> Result<Vec<MonSpanBlock>, ParseError> {
    f.require(4)?;
    let blocks = f.u1(1)? as usize;
    f.require(4 + 272 * blocks)?;
    (0..blocks)
        .map(|i| {
            let off = 4 + 272 * i;
            Ok(MonSpanBlock {
                spectrum: f.slice(off, 256)?.to_vec(),
                span: f.u4(off + 256)?,
                res: f.u4(off + 260)?,
                center: f.u4(off + 264)?,
                pga: f.u1(off + 268)?,
            })
        })
        .collect()
}

fn decode_mon_comms(f: &Fields) -> Result<MonComms, ParseError> {
    f.require(8)?;
    let n_ports = f.u1(1)? as usize;
    f.require(8 + 40 * n_ports)?;
    let ports = (0..n_ports)
        .map(|i| {
            let off = 8 + 40 * i;
            Ok(MonCommsPort {
                port_id: f.u2(off)?,
                tx_pending: f.u2(off + 2)?,
                tx_bytes: f.u4(off + 4)?,
                tx_usage: f.u1(off + 8)?,
                tx_peak_usage: f.u1(off + 9)?,
                rx_pending: f.u2(off + 10)?,
                rx_bytes: f.u4(off + 12)?,
                rx_usage: f.u1(off + 16)?,
                rx_peak_usage: f.u1(off + 17)?,
                overrun_errs: f.u2(off + 18)?,
                msgs: [
                    f.u2(off + 20)?,
                    f.u2(off + 22)?,
                    f.u2(off + 24)?,
                    f.u2(off + 26)?,
                ],
                // 28..36 reserved
                skipped: f.u4(off + 36)?,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    Ok(MonComms {
        tx_errors: f.u1(2)?,
        prot_ids: [f.u1(4)?, f.u1(5)?, f.u1(6)?, f.u1(7)?],
        ports,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// NAV-PVT payload for a 3D fix; only the fields used by the handlers
    /// are filled in.
    pub(crate) fn nav_pvt_payload(lat: i32, lon: i32, height: i32, hacc: u32) -> Vec<u8> {
        let mut p = vec![0u8; 92];
        p[4..6].copy_from_slice(&2024u16.to_le_bytes());
        p[6] = 10;
        p[7] = 3;
        p[8] = 22;
        p[9] = 15;
        p[10] = 15;
        p[11] = 0x07;
        p[20] = 3;
        p[21] = 0x01;
        p[23] = 12;
        p[24..28].copy_from_slice(&lon.to_le_bytes());
        p[28..32].copy_from_slice(&lat.to_le_bytes());
        p[32..36].copy_from_slice(&(height + 47000).to_le_bytes());
        p[36..40].copy_from_slice(&height.to_le_bytes());
        p[40..44].copy_from_slice(&hacc.to_le_bytes());
        p[44..48].copy_from_slice(&2500u32.to_le_bytes());
        p[60..64].copy_from_slice(&1234i32.to_le_bytes());
        p[64..68].copy_from_slice(&9_000_000i32.to_le_bytes());
        p[76..78].copy_from_slice(&132u16.to_le_bytes());
        p
    }

    #[test]
    fn nav_pvt() {
        let raw = UbxFrame::new(0x01, 0x07, nav_pvt_payload(515074000, -1278000, 35000, 1500))
            .serialize();
        match UbxMessage::from_bytes(&raw) {
            Ok(UbxMessage::NavPvt(pvt)) => {
                assert_eq!(pvt.lat, 515074000);
                assert_eq!(pvt.lon, -1278000);
                assert_eq!(pvt.hmsl, 35000);
                assert_eq!(pvt.fix_type, 3);
                assert!(pvt.flags.gnss_fix_ok());
                assert_eq!(pvt.flags.carr_soln(), 0);
                assert_eq!(pvt.num_sv, 12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nav_pvt_short() {
        let frame = UbxFrame::new(0x01, 0x07, vec![0; 40]);
        assert!(matches!(
            UbxMessage::decode(&frame),
            Err(ParseError::Length { name: "NAV-PVT", expected: 92, found: 40 })
        ));
    }

    #[test]
    fn nav_sat() {
        let mut p = vec![0u8; 8 + 24];
        p[4] = 1;
        p[5] = 2;
        // GPS 5, 41 dBHz, el 45, az 270, used
        p[8..14].copy_from_slice(&[0, 5, 41, 45, 0x0E, 0x01]);
        p[16..20].copy_from_slice(&0x08u32.to_le_bytes());
        // GLONASS 3, not tracked
        p[20..26].copy_from_slice(&[6, 3, 0, 0xF6, 0x10, 0x00]);
        let msg = UbxMessage::decode(&UbxFrame::new(0x01, 0x35, p)).unwrap();
        let UbxMessage::NavSat(sat) = msg else {
            panic!("expected NAV-SAT");
        };
        assert_eq!(sat.svs.len(), 2);
        assert_eq!(sat.svs[0].azim, 270);
        assert!(sat.svs[0].flags.sv_used());
        assert_eq!(sat.svs[1].elev, -10);
        assert!(!sat.svs[1].flags.sv_used());
    }

    #[test]
    fn relposned_flags() {
        let mut p = vec![0u8; 64];
        p[0] = 1;
        p[20..24].copy_from_slice(&150i32.to_le_bytes());
        p[24..28].copy_from_slice(&9_000_000i32.to_le_bytes());
        // fix ok, diff, valid, carrier fixed, heading valid
        p[60..64].copy_from_slice(&0b1_0001_0111u32.to_le_bytes());
        let UbxMessage::NavRelposned(rel) =
            UbxMessage::decode(&UbxFrame::new(0x01, 0x3C, p)).unwrap()
        else {
            panic!("expected NAV-RELPOSNED");
        };
        assert_eq!(rel.rel_pos_length, Some(150));
        assert_eq!(rel.flags.carr_soln(), 2);
        assert!(rel.flags.rel_pos_heading_valid());
        assert!(!rel.flags.is_moving());
    }

    #[test]
    fn unknown_identity() {
        let frame = UbxFrame::new(0x7E, 0x01, vec![]);
        assert!(matches!(
            UbxMessage::decode(&frame),
            Err(ParseError::UnknownMessage(_))
        ));
    }

    #[test]
    fn generic_identity() {
        let msg = UbxMessage::decode(&UbxFrame::new(0x06, 0x8A, vec![0, 1, 0, 0])).unwrap();
        assert_eq!(msg.identity(), "CFG-VALSET");
    }

    #[test]
    fn mon_ver() {
        let mut p = vec![0u8; 100];
        p[..13].copy_from_slice(b"ROM CORE 3.01");
        p[30..38].copy_from_slice(b"00080000");
        p[40..52].copy_from_slice(b"FWVER=HPG 1.");
        p[70..78].copy_from_slice(b"PROTVER=");
        let UbxMessage::MonVer(ver) = UbxMessage::decode(&UbxFrame::new(0x0A, 0x04, p)).unwrap()
        else {
            panic!("expected MON-VER");
        };
        assert_eq!(ver.sw_version, "ROM CORE 3.01");
        assert_eq!(ver.hw_version, "00080000");
        assert_eq!(ver.extensions.len(), 2);
    }
}

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use log::{debug, info, trace, warn};

use super::{ecef_to_llh, scaled, Update};
use crate::{
    status::{
        Attitude, FixType, ReceiverVersion, RelativePosition, SatelliteInfo, SurveyIn,
    },
    ubx::{self, NavPvt, NavRelposned, UbxAttitude, UbxMessage},
    CommandQueue, GnssId, ParseError,
};

const DEG_1E7: f64 = 1e-7;
const DEG_1E5: f64 = 1e-5;
const MM: f64 = 1e-3;
const CM: f64 = 1e-2;
const DOP: f64 = 0.01;

#[derive(Debug, Default)]
/// Normalizes UBX messages.
pub struct UbxHandler {
    commands: Option<CommandQueue>,
    version_polled: bool,
}

fn utc_time(hour: u8, min: u8, sec: u8, nano: i32) -> Result<NaiveTime, ParseError> {
    let time = NaiveTime::from_hms_opt(hour as u32, min as u32, sec.min(59) as u32)
        .ok_or_else(|| ParseError::Field(format!("time {hour:02}:{min:02}:{sec:02}")))?;
    Ok(time + TimeDelta::nanoseconds(nano as i64))
}

impl UbxHandler {
    /// Handler that polls missing receiver details through `commands`
    pub fn new(commands: Option<CommandQueue>) -> Self {
        Self {
            commands,
            version_polled: false,
        }
    }

    /// Forget per-session state.
    pub fn reset(&mut self) {
        self.version_polled = false;
    }

    pub(crate) fn handle(&mut self, msg: &UbxMessage, up: &mut Update) -> Result<(), ParseError> {
        self.poll_version(up);
        match msg {
            UbxMessage::AckAck { class, id } => {
                debug!("ACK for {}", ubx::message_name(*class, *id).unwrap_or("?"));
            }
            UbxMessage::AckNak { class, id } => {
                warn!(
                    "NAK for {:02X}-{:02X} ({})",
                    class,
                    id,
                    ubx::message_name(*class, *id).unwrap_or("?")
                );
            }
            UbxMessage::NavPvt(pvt) => nav_pvt(pvt, up)?,
            UbxMessage::NavPosllh(pos) => {
                let s = &mut *up.status;
                s.lat = scaled(pos.lat, DEG_1E7);
                s.lon = scaled(pos.lon, DEG_1E7);
                s.alt = scaled(pos.hmsl, MM);
                s.hae = scaled(pos.height, MM);
                s.hacc = scaled(pos.h_acc, MM);
                s.vacc = scaled(pos.v_acc, MM);
            }
            UbxMessage::NavHpposllh(pos) => {
                if pos.invalid_llh {
                    return Err(ParseError::Field("NAV-HPPOSLLH invalidLlh".into()));
                }
                let s = &mut *up.status;
                s.lat = Some((pos.lat as f64 + pos.lat_hp as f64 * 0.01) * DEG_1E7);
                s.lon = Some((pos.lon as f64 + pos.lon_hp as f64 * 0.01) * DEG_1E7);
                s.hae = Some((pos.height as f64 + pos.height_hp as f64 * 0.1) * MM);
                s.alt = Some((pos.hmsl as f64 + pos.hmsl_hp as f64 * 0.1) * MM);
                s.hacc = scaled(pos.h_acc, 1e-4);
                s.vacc = scaled(pos.v_acc, 1e-4);
            }
            UbxMessage::NavStatus(st) => {
                up.status.diff_corr = Some(st.flags.diff_soln());
                set_fix(up, "NAV-STATUS", st.gps_fix);
            }
            UbxMessage::NavDop(dop) => {
                let s = &mut *up.status;
                s.pdop = scaled(dop.pdop, DOP);
                s.hdop = scaled(dop.hdop, DOP);
                s.vdop = scaled(dop.vdop, DOP);
            }
            UbxMessage::NavSol(sol) => {
                set_fix(up, "NAV-SOL", sol.gps_fix);
                let s = &mut *up.status;
                s.sip = Some(sol.num_sv as u32);
                s.pdop = scaled(sol.pdop, DOP);
                s.diff_corr = Some(sol.flags.diff_soln());
                if (sol.ecef_x, sol.ecef_y, sol.ecef_z) != (0, 0, 0) {
                    let (lat, lon, hae) = ecef_to_llh(
                        sol.ecef_x as f64 * CM,
                        sol.ecef_y as f64 * CM,
                        sol.ecef_z as f64 * CM,
                    );
                    s.lat = Some(lat);
                    s.lon = Some(lon);
                    s.hae = Some(hae);
                }
            }
            UbxMessage::NavVelned(vel) => {
                up.status.speed = scaled(vel.g_speed, CM);
                up.status.track = scaled(vel.heading, DEG_1E5);
            }
            UbxMessage::NavTimeutc(t) => {
                // validUTC
                if t.valid & 0x04 == 0 {
                    return Ok(());
                }
                let time = utc_time(t.hour, t.min, t.sec, t.nano)?;
                up.status.utc = Some(time);
                let date = NaiveDate::from_ymd_opt(t.year as i32, t.month as u32, t.day as u32)
                    .ok_or_else(|| ParseError::Field(format!("date {}-{}-{}", t.year, t.month, t.day)))?;
                up.status.timestamp = Some(date.and_time(time).and_utc());
            }
            UbxMessage::NavSat(sat) => {
                let now = up.now;
                let sats: Vec<SatelliteInfo> = sat
                    .svs
                    .iter()
                    .filter_map(|sv| {
                        let Some(gnss) = GnssId::from_ubx(sv.gnss_id) else {
                            trace!("NAV-SAT: unknown gnssId {}", sv.gnss_id);
                            return None;
                        };
                        Some(SatelliteInfo {
                            gnss,
                            svid: sv.sv_id as u16,
                            elev: Some(sv.elev as f64),
                            azim: Some(sv.azim as f64),
                            cno: Some(sv.cno as f64),
                            last_update: now,
                        })
                    })
                    .collect();
                up.status.sip = Some(sat.svs.iter().filter(|sv| sv.flags.sv_used()).count() as u32);
                up.merge_satellites(sats);
            }
            UbxMessage::NavSvinfo(info) => {
                let now = up.now;
                let sats: Vec<SatelliteInfo> = info
                    .channels
                    .iter()
                    .filter_map(|ch| {
                        let (gnss, svid) = GnssId::from_legacy_svid(ch.svid as u16)?;
                        Some(SatelliteInfo {
                            gnss,
                            svid,
                            elev: Some(ch.elev as f64),
                            azim: Some(ch.azim as f64),
                            cno: Some(ch.cno as f64),
                            last_update: now,
                        })
                    })
                    .collect();
                // svUsed
                up.status.sip = Some(info.channels.iter().filter(|ch| ch.flags & 0x01 != 0).count() as u32);
                up.merge_satellites(sats);
            }
            UbxMessage::NavRelposned(rel) => nav_relposned(rel, up),
            UbxMessage::NavSvin(svin) => {
                let position = (svin.obs > 0).then(|| {
                    ecef_to_llh(
                        svin.mean_x as f64 * CM,
                        svin.mean_y as f64 * CM,
                        svin.mean_z as f64 * CM,
                    )
                });
                up.status.survey_in = Some(SurveyIn {
                    active: svin.active,
                    valid: svin.valid,
                    duration: svin.dur,
                    mean_acc: svin.mean_acc as f64 * 1e-4,
                    observations: svin.obs,
                    position,
                });
            }
            UbxMessage::NavAtt(att) => attitude(att, "NAV-ATT", up),
            UbxMessage::HnrAtt(att) => attitude(att, "HNR-ATT", up),
            UbxMessage::HnrPvt(pvt) => {
                set_fix(up, "HNR-PVT", pvt.gps_fix);
                let s = &mut *up.status;
                s.diff_corr = Some(pvt.flags.diff_soln());
                s.lat = scaled(pvt.lat, DEG_1E7);
                s.lon = scaled(pvt.lon, DEG_1E7);
                s.alt = scaled(pvt.hmsl, MM);
                s.hae = scaled(pvt.height, MM);
                s.speed = scaled(pvt.g_speed, MM);
                s.track = scaled(pvt.head_mot, DEG_1E5);
                s.hacc = scaled(pvt.h_acc, MM);
                s.vacc = scaled(pvt.v_acc, MM);
                s.utc = Some(utc_time(pvt.hour, pvt.min, pvt.sec, 0)?);
            }
            UbxMessage::EsfAlg(alg) => {
                let status = match alg.status {
                    0 => "USER DEFINED",
                    1 => "ROLL/PITCH INITIALIZING",
                    2 => "ROLL/PITCH/YAW INITIALIZING",
                    3 => "COARSE",
                    4 => "FINE",
                    _ => "UNKNOWN",
                };
                up.status.attitude = Some(Attitude {
                    roll: scaled(alg.roll, 0.01),
                    pitch: scaled(alg.pitch, 0.01),
                    yaw: scaled(alg.yaw, 0.01),
                    source: "ESF-ALG".into(),
                    status: if alg.errors != 0 {
                        format!("{status} (errors {:#04x})", alg.errors)
                    } else {
                        status.to_string()
                    },
                });
            }
            UbxMessage::MonSpan(blocks) => up.status.spectrum = Some(blocks.clone()),
            UbxMessage::MonSys(sys) => up.status.sysmon = Some(sys.clone()),
            UbxMessage::MonComms(comms) => up.status.comms = Some(comms.clone()),
            UbxMessage::MonVer(ver) => {
                info!("Receiver {} / {}", ver.sw_version, ver.hw_version);
                up.status.version = Some(ReceiverVersion {
                    software: ver.sw_version.clone(),
                    hardware: ver.hw_version.clone(),
                    extensions: ver.extensions.clone(),
                });
            }
            UbxMessage::RxmRtcm(rtcm) => {
                if rtcm.crc_failed {
                    debug!("Receiver rejected RTCM {}", rtcm.msg_type);
                } else {
                    up.status.diff_station = Some(rtcm.ref_station);
                }
            }
            UbxMessage::Generic { name, .. } => trace!("{name} not normalized"),
        }
        Ok(())
    }

    /// Ask for MON-VER the first time UBX traffic shows up.
    fn poll_version(&mut self, up: &Update) {
        if self.version_polled || up.status.version.is_some() {
            return;
        }
        if let Some(commands) = &self.commands {
            debug!("Polling receiver version");
            commands.enqueue(ubx::poll(ubx::class::MON, 0x04));
            self.version_polled = true;
        }
    }
}

fn set_fix(up: &mut Update, family: &str, code: u8) {
    match FixType::translate(family, &code.to_string()) {
        Some(fix) => up.status.fix = Some(fix),
        None => debug!("{family}: unmapped fix type {code}"),
    }
}

fn nav_pvt(pvt: &NavPvt, up: &mut Update) -> Result<(), ParseError> {
    set_fix(up, "NAV-PVT", pvt.fix_type);
    let s = &mut *up.status;
    match pvt.flags.carr_soln() {
        1 => s.fix = Some(FixType::RtkFloat),
        2 => s.fix = Some(FixType::RtkFixed),
        _ => {}
    }
    s.diff_corr = Some(pvt.flags.diff_soln());
    s.sip = Some(pvt.num_sv as u32);
    s.lat = scaled(pvt.lat, DEG_1E7);
    s.lon = scaled(pvt.lon, DEG_1E7);
    s.alt = scaled(pvt.hmsl, MM);
    s.hae = scaled(pvt.height, MM);
    s.hacc = scaled(pvt.h_acc, MM);
    s.vacc = scaled(pvt.v_acc, MM);
    s.speed = scaled(pvt.g_speed, MM);
    s.track = scaled(pvt.head_mot, DEG_1E5);
    s.pdop = scaled(pvt.pdop, DOP);
    // validDate, validTime
    if pvt.valid & 0x02 != 0 {
        let time = utc_time(pvt.hour, pvt.min, pvt.sec, pvt.nano)?;
        s.utc = Some(time);
        if pvt.valid & 0x01 != 0 {
            let date = NaiveDate::from_ymd_opt(pvt.year as i32, pvt.month as u32, pvt.day as u32)
                .ok_or_else(|| {
                    ParseError::Field(format!("date {}-{}-{}", pvt.year, pvt.month, pvt.day))
                })?;
            s.timestamp = Some(date.and_time(time).and_utc());
        }
    }
    Ok(())
}

fn nav_relposned(rel: &NavRelposned, up: &mut Update) {
    let f = rel.flags;
    // cm plus 0.1 mm high precision part
    let length = match (rel.rel_pos_length, rel.rel_pos_hp_length) {
        (Some(len), hp) => Some((len as f64 + hp.unwrap_or(0) as f64 * 0.01) * CM),
        (None, _) => Some(
            ((rel.rel_pos_n as f64).powi(2)
                + (rel.rel_pos_e as f64).powi(2)
                + (rel.rel_pos_d as f64).powi(2))
            .sqrt()
                * CM,
        ),
    };
    let heading = rel
        .rel_pos_heading
        .filter(|_| f.rel_pos_heading_valid())
        .and_then(|h| scaled(h, DEG_1E5));
    up.status.diff_station = Some(rel.ref_station_id);
    up.status.relpos = Some(RelativePosition {
        heading,
        length,
        acc_heading: rel.acc_heading.and_then(|a| scaled(a, DEG_1E5)),
        acc_length: rel.acc_length.and_then(|a| scaled(a, 1e-4)),
        flags: vec![
            ("gnssFixOK", f.gnss_fix_ok() as u8),
            ("diffSoln", f.diff_soln() as u8),
            ("relPosValid", f.rel_pos_valid() as u8),
            ("carrSoln", f.carr_soln()),
            ("isMoving", f.is_moving() as u8),
            ("refPosMiss", f.ref_pos_miss() as u8),
            ("refObsMiss", f.ref_obs_miss() as u8),
            ("relPosHeadingValid", f.rel_pos_heading_valid() as u8),
            ("relPosNormalized", f.rel_pos_normalized() as u8),
        ],
    });
}

fn attitude(att: &UbxAttitude, source: &str, up: &mut Update) {
    up.status.attitude = Some(Attitude {
        roll: scaled(att.roll, DEG_1E5),
        pitch: scaled(att.pitch, DEG_1E5),
        yaw: scaled(att.heading, DEG_1E5),
        source: source.to_string(),
        status: format!(
            "acc {:.2}/{:.2}/{:.2} deg",
            att.acc_roll as f64 * DEG_1E5,
            att.acc_pitch as f64 * DEG_1E5,
            att.acc_heading as f64 * DEG_1E5
        ),
    });
}

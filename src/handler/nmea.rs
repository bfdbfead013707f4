use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};

use super::Update;
use crate::{
    nmea::{NmeaFix, NmeaMessage},
    status::{Attitude, FixType, SatelliteInfo},
    GnssId, ParseError,
};

const KNOTS: f64 = 0.514444;
const KMH: f64 = 1.0 / 3.6;

#[derive(Debug, Default)]
/// Normalizes NMEA 0183 sentences, including u-blox PUBX.
pub struct NmeaHandler;

impl NmeaHandler {
    pub(crate) fn handle(&mut self, msg: &NmeaMessage, up: &mut Update) -> Result<(), ParseError> {
        match msg {
            NmeaMessage::Gga { fix, .. } => {
                apply_fix(fix, up);
                set_fix(up, "GGA", &fix.quality);
                up.status.diff_corr = Some(matches!(fix.quality.as_str(), "2" | "4" | "5"));
            }
            NmeaMessage::Gns { fix, .. } => {
                apply_fix(fix, up);
                // one mode character per constellation, GPS first
                if let Some(mode) = fix.quality.get(..1) {
                    set_fix(up, "GNS", mode);
                    up.status.diff_corr = Some(matches!(mode, "D" | "F" | "R"));
                }
            }
            NmeaMessage::Gll { data, .. } => {
                if data.status != "A" {
                    return Ok(());
                }
                set_position(up, data.lat, data.lon);
                update(&mut up.status.utc, data.time);
                if let Some(mode) = &data.pos_mode {
                    set_fix(up, "GLL", mode);
                }
            }
            NmeaMessage::Gsa { data, .. } => {
                set_fix(up, "GSA", &data.nav_mode);
                let s = &mut *up.status;
                update(&mut s.pdop, data.pdop);
                update(&mut s.hdop, data.hdop);
                update(&mut s.vdop, data.vdop);
            }
            NmeaMessage::Gsv { talker, data } => {
                let now = up.now;
                let sats: Vec<SatelliteInfo> = data
                    .sats
                    .iter()
                    .filter_map(|sat| {
                        let Some((gnss, svid)) = GnssId::from_nmea_svid(talker, sat.svid) else {
                            debug!("{talker}GSV: unmapped satellite {}", sat.svid);
                            return None;
                        };
                        Some(SatelliteInfo {
                            gnss,
                            svid,
                            elev: sat.elev,
                            azim: sat.azim,
                            cno: sat.cno,
                            last_update: now,
                        })
                    })
                    .collect();
                up.merge_satellites(sats);
            }
            NmeaMessage::Rmc { data, .. } => {
                if data.status == "A" {
                    set_position(up, data.lat, data.lon);
                    let s = &mut *up.status;
                    update(&mut s.speed, data.sog.map(|kn| kn * KNOTS));
                    update(&mut s.track, data.cog);
                }
                set_time(up, data.time, data.date);
                if let Some(mode) = &data.pos_mode {
                    set_fix(up, "RMC", mode);
                }
            }
            NmeaMessage::Vtg { data, .. } => {
                let speed = data
                    .sog_kmh
                    .map(|kmh| kmh * KMH)
                    .or(data.sog_kn.map(|kn| kn * KNOTS));
                update(&mut up.status.speed, speed);
                update(&mut up.status.track, data.cogt);
                if let Some(mode) = &data.pos_mode {
                    set_fix(up, "VTG", mode);
                }
            }
            NmeaMessage::Zda { data, .. } => set_time(up, data.time, data.date),
            NmeaMessage::Gst { data, .. } => {
                if let (Some(lat), Some(lon)) = (data.std_lat, data.std_lon) {
                    up.status.hacc = Some(lat.hypot(lon));
                }
                update(&mut up.status.vacc, data.std_alt);
            }
            NmeaMessage::Hdt { heading, .. } => {
                up.status.attitude = Some(Attitude {
                    yaw: *heading,
                    source: "HDT".into(),
                    status: if heading.is_some() { "valid" } else { "invalid" }.into(),
                    ..Default::default()
                });
            }
            NmeaMessage::Txt { talker, text } => info!("{talker}TXT: {text}"),
            NmeaMessage::Pubx00(pos) => {
                set_position(up, pos.lat, pos.lon);
                set_fix(up, "PUBX00", &pos.nav_stat);
                let s = &mut *up.status;
                update(&mut s.utc, pos.time);
                update(&mut s.hae, pos.alt_ref);
                update(&mut s.hacc, pos.h_acc);
                update(&mut s.vacc, pos.v_acc);
                update(&mut s.speed, pos.sog.map(|kmh| kmh * KMH));
                update(&mut s.track, pos.cog);
                update(&mut s.hdop, pos.hdop);
                update(&mut s.vdop, pos.vdop);
                update(&mut s.sip, pos.num_svs.map(u32::from));
                update(&mut s.diff_age, pos.diff_age);
                s.diff_corr = Some(matches!(pos.nav_stat.as_str(), "D2" | "D3" | "RK"));
            }
            NmeaMessage::Pubx03(sats) => {
                let now = up.now;
                let used = sats.iter().filter(|sat| sat.status == "U").count();
                let sats: Vec<SatelliteInfo> = sats
                    .iter()
                    .filter_map(|sat| {
                        let (gnss, svid) = GnssId::from_legacy_svid(sat.svid)?;
                        Some(SatelliteInfo {
                            gnss,
                            svid,
                            elev: sat.elev,
                            azim: sat.azim,
                            cno: sat.cno,
                            last_update: now,
                        })
                    })
                    .collect();
                up.status.sip = Some(used as u32);
                up.merge_satellites(sats);
            }
            NmeaMessage::Pubx04(time) => set_time(up, time.time, time.date),
        }
        Ok(())
    }
}

/// Overwrite only with reported values; empty fields keep the last one.
fn update<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}

fn set_position(up: &mut Update, lat: Option<f64>, lon: Option<f64>) {
    if let (Some(lat), Some(lon)) = (lat, lon) {
        up.status.lat = Some(lat);
        up.status.lon = Some(lon);
    }
}

fn set_time(up: &mut Update, time: Option<NaiveTime>, date: Option<NaiveDate>) {
    update(&mut up.status.utc, time);
    if let (Some(time), Some(date)) = (time, date) {
        up.status.timestamp = Some(date.and_time(time).and_utc());
    }
}

fn set_fix(up: &mut Update, family: &str, code: &str) {
    match FixType::translate(family, code) {
        Some(fix) => up.status.fix = Some(fix),
        None => debug!("{family}: unmapped fix code {code:?}"),
    }
}

fn apply_fix(fix: &NmeaFix, up: &mut Update) {
    set_position(up, fix.lat, fix.lon);
    let s = &mut *up.status;
    update(&mut s.utc, fix.time);
    update(&mut s.alt, fix.alt);
    if let (Some(alt), Some(sep)) = (fix.alt, fix.sep) {
        s.hae = Some(alt + sep);
    }
    update(&mut s.sip, fix.num_sv.map(u32::from));
    update(&mut s.hdop, fix.hdop);
    update(&mut s.diff_age, fix.diff_age);
    update(&mut s.diff_station, fix.diff_station);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        handler::test::{dispatcher, feed},
        nmea::sentence,
    };
    use chrono::{Timelike, Utc};

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    #[test]
    fn gga_position() {
        let mut d = dispatcher();
        feed(&mut d, GGA, Utc::now());
        let s = d.status().snapshot();
        assert!((s.lat.unwrap() - 48.1173).abs() < 1e-4);
        assert!((s.lon.unwrap() - 11.5167).abs() < 1e-4);
        assert_eq!(s.alt, Some(545.4));
        assert!((s.hae.unwrap() - 592.3).abs() < 1e-9);
        assert_eq!(s.fix, Some(FixType::ThreeD));
        assert_eq!(s.sip, Some(8));
        assert_eq!(s.hdop, Some(0.9));
        assert_eq!(s.diff_corr, Some(false));
        assert_eq!(s.utc.map(|t| (t.hour(), t.minute(), t.second())), Some((12, 35, 19)));
    }

    #[test]
    fn repeated_sentence_is_idempotent() {
        let mut d = dispatcher();
        let now = Utc::now();
        feed(&mut d, GGA, now);
        let first = d.status().snapshot();
        feed(&mut d, GGA, now);
        assert_eq!(d.status().snapshot(), first);
    }

    #[test]
    fn invalid_gll_ignored() {
        let mut d = dispatcher();
        feed(&mut d, GGA, Utc::now());
        feed(
            &mut d,
            &sentence("GPGLL", &["5130.444", "N", "00007.668", "W", "123520.00", "V", "N"]),
            Utc::now(),
        );
        let s = d.status().snapshot();
        assert!((s.lat.unwrap() - 48.1173).abs() < 1e-4);
        assert_eq!(s.fix, Some(FixType::ThreeD));
    }

    #[test]
    fn rmc_speed_and_timestamp() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &sentence(
                "GNRMC",
                &["083559.00", "A", "4717.11437", "N", "00833.91522", "E", "10.0", "77.52", "091202", "", "", "D"],
            ),
            Utc::now(),
        );
        let s = d.status().snapshot();
        assert!((s.speed.unwrap() - 5.14444).abs() < 1e-9);
        assert_eq!(s.track, Some(77.52));
        assert_eq!(s.fix, Some(FixType::Dgps));
        assert_eq!(
            s.timestamp.map(|t| t.to_rfc3339()).as_deref(),
            Some("2002-12-09T08:35:59+00:00")
        );
    }

    #[test]
    fn gst_accuracy() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &sentence("GPGST", &["082356.00", "1.8", "", "", "", "3.0", "4.0", "2.5"]),
            Utc::now(),
        );
        let s = d.status().snapshot();
        assert_eq!(s.hacc, Some(5.0));
        assert_eq!(s.vacc, Some(2.5));
    }

    #[test]
    fn pubx03_satellites() {
        let mut d = dispatcher();
        d.set_show_unused(true);
        feed(
            &mut d,
            &sentence("PUBX", &["03", "2", "5", "U", "270", "45", "41", "064", "70", "-", "016", "10", "", "000"]),
            Utc::now(),
        );
        let s = d.status().snapshot();
        // GLONASS 6 is listed without signal
        assert_eq!(s.siv, Some(1));
        assert_eq!(s.sip, Some(1));
        let gps5 = &s.visible[0];
        assert_eq!((gps5.gnss, gps5.svid), (GnssId::Gps, 5));
        assert_eq!(gps5.elev, Some(45.0));
        assert_eq!(gps5.azim, Some(270.0));
        assert_eq!(gps5.cno, Some(41.0));
        let glo6 = &s.visible[1];
        assert_eq!((glo6.gnss, glo6.svid), (GnssId::Glonass, 6));
        assert_eq!(glo6.elev, Some(10.0));
        assert_eq!(glo6.cno, None);
    }

    #[test]
    fn pubx00_position() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &sentence(
                "PUBX",
                &[
                    "00", "081350.00", "4717.113210", "N", "00833.915187", "E", "546.589", "G3",
                    "2.1", "2.0", "36.0", "77.52", "0.007", "", "0.92", "1.19", "0.77", "9", "0",
                    "0",
                ],
            ),
            Utc::now(),
        );
        let s = d.status().snapshot();
        assert_eq!(s.fix, Some(FixType::ThreeD));
        assert_eq!(s.hae, Some(546.589));
        assert_eq!(s.alt, None);
        assert!((s.speed.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(s.sip, Some(9));
        assert_eq!(s.diff_corr, Some(false));
    }

    #[test]
    fn empty_differential_fields_keep_last() {
        let mut d = dispatcher();
        let now = Utc::now();
        let dgps = [
            "123519", "4807.038", "N", "01131.000", "E", "2", "08", "0.9", "545.4", "M", "46.9",
            "M", "2.5", "0120",
        ];
        feed(&mut d, &sentence("GPGGA", &dgps), now);
        feed(&mut d, GGA, now);
        let s = d.status().snapshot();
        assert_eq!(s.diff_age, Some(2.5));
        assert_eq!(s.diff_station, Some(120));
        let mut pubx = [
            "00", "081350.00", "4717.113210", "N", "00833.915187", "E", "546.589", "D3", "2.1",
            "2.0", "36.0", "77.52", "0.007", "", "0.92", "1.19", "0.77", "9", "0", "0",
        ];
        feed(&mut d, &sentence("PUBX", &pubx), now);
        assert_eq!(d.status().snapshot().diff_age, Some(2.5));
        pubx[13] = "3.0";
        feed(&mut d, &sentence("PUBX", &pubx), now);
        let s = d.status().snapshot();
        assert_eq!(s.diff_age, Some(3.0));
        assert_eq!(s.diff_corr, Some(true));
    }

    #[test]
    fn heading_sentence() {
        let mut d = dispatcher();
        feed(&mut d, &sentence("GPHDT", &["123.4", "T"]), Utc::now());
        let att = d.status().snapshot().attitude.unwrap();
        assert_eq!(att.yaw, Some(123.4));
        assert_eq!(att.source, "HDT");
        assert_eq!(att.roll, None);
    }
}

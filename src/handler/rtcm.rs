use log::trace;

use super::{ecef_to_llh, Update};
use crate::{
    rtcm::RtcmMessage,
    status::{BaseStation, SatelliteInfo},
    ParseError,
};

#[derive(Debug, Default)]
/// Normalizes RTCM3 correction messages.
pub struct RtcmHandler;

impl RtcmHandler {
    pub(crate) fn handle(&mut self, msg: &RtcmMessage, up: &mut Update) -> Result<(), ParseError> {
        match msg {
            RtcmMessage::ReferenceStation(arp) => {
                let [x, y, z] = arp.ecef;
                let (lat, lon, hae) = ecef_to_llh(x, y, z);
                up.status.base_station = Some(BaseStation {
                    station_id: arp.station_id,
                    lat,
                    lon,
                    hae,
                    antenna_height: arp.antenna_height,
                });
                up.status.diff_station = Some(arp.station_id);
            }
            RtcmMessage::Msm(msm) => {
                let now = up.now;
                // base observations, kept apart from the rover's own table
                let base = &mut up.status.base_satellites;
                base.retain(|sat| sat.gnss != msm.gnss);
                base.extend(msm.satellites.iter().map(|sat| SatelliteInfo {
                    gnss: msm.gnss,
                    svid: sat.svid,
                    elev: None,
                    azim: None,
                    cno: sat.cno,
                    last_update: now,
                }));
                base.sort_by_key(SatelliteInfo::key);
                up.status.diff_station = Some(msm.station_id);
            }
            RtcmMessage::GlonassBiases { station_id, .. } => {
                up.status.diff_station = Some(*station_id);
            }
            RtcmMessage::Proprietary { number, sub_type } => {
                trace!("RTCM {number} sub-type {sub_type}");
            }
            RtcmMessage::Generic {
                name, station_id, ..
            } => {
                trace!("RTCM {name}");
                if station_id.is_some() {
                    up.status.diff_station = *station_id;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        handler::test::{dispatcher, feed},
        rtcm::{
            frame,
            test::{arp_payload, BitWriter},
        },
        GnssId,
    };
    use chrono::Utc;

    /// MSM4 from station 5 with one signal per satellite
    fn msm4(number: u64, svids: &[u8], cno: u64) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put(number, 12).put(5, 12).put(0, 30).put(0, 19);
        let mask = svids.iter().fold(0u64, |m, svid| m | 1 << (64 - svid));
        w.put(mask, 64).put(1 << 31, 32);
        let n = svids.len();
        w.put((1 << n) - 1, n);
        w.put(0, 18 * n).put(0, 42 * n);
        for _ in svids {
            w.put(cno, 6);
        }
        frame(&w.finish())
    }

    #[test]
    fn reference_station_position() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &frame(&arp_payload(2003, 39_806_080_000, 0, 49_668_620_000)),
            Utc::now(),
        );
        let s = d.status().snapshot();
        let base = s.base_station.unwrap();
        assert_eq!(base.station_id, 2003);
        assert!((base.lat - 51.477).abs() < 1e-2);
        assert!(base.lon.abs() < 1e-9);
        assert!(base.hae.abs() < 100.0);
        assert_eq!(s.diff_station, Some(2003));
        // corrections alone are not a position fix
        assert_eq!(s.lat, None);
        assert_eq!(s.fix, None);
    }

    #[test]
    fn msm_kept_as_base_observations() {
        let now = Utc::now();
        let mut d = dispatcher();
        feed(&mut d, &msm4(1074, &[3, 10], 40), now);
        feed(&mut d, &msm4(1084, &[7], 30), now);
        // a new GPS epoch replaces only the GPS entries
        feed(&mut d, &msm4(1074, &[10, 12], 42), now);
        let s = d.status().snapshot();
        let base: Vec<_> = s
            .base_satellites
            .iter()
            .map(|sat| (sat.gnss, sat.svid, sat.cno))
            .collect();
        assert_eq!(
            base,
            vec![
                (GnssId::Gps, 10, Some(42.0)),
                (GnssId::Gps, 12, Some(42.0)),
                (GnssId::Glonass, 7, Some(30.0)),
            ]
        );
        assert_eq!(s.diff_station, Some(5));
        // the rover's view is untouched
        assert!(s.satellites.is_empty());
        assert!(s.visible.is_empty());
        assert_eq!(s.siv, None);
    }
}

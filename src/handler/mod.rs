//! Protocol handlers: normalize decoded messages into [`GnssStatus`].
//!
//! Handlers never touch the transport. The only outbound path is the
//! optional [`CommandQueue`] given to the [`Dispatcher`].
mod nmea;
mod rtcm;
mod ubx;

use chrono::{DateTime, Utc};
use log::debug;
use nav_types::{ECEF, WGS84};
use num_traits::ToPrimitive;

pub use self::{nmea::NmeaHandler, rtcm::RtcmHandler, ubx::UbxHandler};
use crate::{
    status::{GnssStatus, SatelliteInfo},
    CommandQueue, Frame, Message, SharedStatus, StreamOptions,
};

/// State handed to a handler for one message
pub(crate) struct Update<'a> {
    pub status: &'a mut GnssStatus,
    pub now: DateTime<Utc>,
    pub show_unused: bool,
}

impl Update<'_> {
    /// Replace the table entries for these satellites, then sweep. Only
    /// satellites with signal count as in view.
    pub fn merge_satellites(&mut self, sats: impl IntoIterator<Item = SatelliteInfo>) {
        let table = &mut self.status.satellites;
        for sat in sats {
            table.update(sat);
        }
        self.status.visible = table.sweep(self.now, self.show_unused);
        self.status.siv = Some(table.with_signal() as u32);
    }
}

/// Integer field times its unit
pub(crate) fn scaled<T: ToPrimitive>(raw: T, scale: f64) -> Option<f64> {
    raw.to_f64().map(|val| val * scale)
}

/// ECEF metres to (lat deg, lon deg, m above ellipsoid)
pub(crate) fn ecef_to_llh(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let wgs84: WGS84<f64> = ECEF::new(x, y, z).into();
    (
        wgs84.latitude_degrees(),
        wgs84.longitude_degrees(),
        wgs84.altitude(),
    )
}

/// Routes frames to the handler for their protocol.
pub struct Dispatcher {
    status: SharedStatus,
    show_unused: bool,
    ubx: UbxHandler,
    nmea: NmeaHandler,
    rtcm: RtcmHandler,
}

impl Dispatcher {
    /// Dispatcher writing into `status`
    pub fn new(status: SharedStatus, options: &StreamOptions) -> Self {
        status.write(|s| s.satellites.set_expiry(options.satellite_expiry));
        Self {
            status,
            show_unused: options.show_unused,
            ubx: UbxHandler::default(),
            nmea: NmeaHandler,
            rtcm: RtcmHandler,
        }
    }

    /// Let handlers request extra data from the receiver through `commands`.
    pub fn with_commands(mut self, commands: CommandQueue) -> Self {
        self.ubx = UbxHandler::new(Some(commands));
        self
    }

    /// Status this dispatcher writes into
    pub fn status(&self) -> &SharedStatus {
        &self.status
    }

    /// Include satellites without signal in the visible set.
    pub fn set_show_unused(&mut self, show_unused: bool) {
        self.show_unused = show_unused;
    }

    /// Clear the status and per-session handler state for a new connection.
    pub fn reset(&mut self) {
        self.status.reset();
        self.ubx.reset();
    }

    /// Normalize one frame into the status.
    pub fn process(&mut self, frame: &Frame) {
        self.process_at(frame, Utc::now());
    }

    /// As [`Dispatcher::process`] with an explicit clock.
    pub fn process_at(&mut self, frame: &Frame, now: DateTime<Utc>) {
        let msg = match &frame.message {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Skipping undecoded {} frame: {e}", frame.protocol);
                return;
            }
        };
        let Self {
            status,
            show_unused,
            ubx,
            nmea,
            rtcm,
        } = self;
        status.write(|status| {
            let mut update = Update {
                status,
                now,
                show_unused: *show_unused,
            };
            let res = match msg {
                Message::Ubx(msg) => ubx.handle(msg, &mut update),
                Message::Nmea(msg) => nmea.handle(msg, &mut update),
                Message::Rtcm(msg) => rtcm.handle(msg, &mut update),
            };
            if let Err(e) = res {
                debug!("{}: {e}", msg.identity());
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        nmea as wire_nmea,
        rtcm as wire_rtcm,
        status::FixType,
        ubx::{self as wire_ubx, UbxFrame},
        Framer, GnssId, Protocol,
    };
    use chrono::TimeDelta;

    pub(crate) fn frames(bytes: &[u8]) -> Vec<Frame> {
        let mut framer = Framer::default();
        framer.push(bytes);
        std::iter::from_fn(|| framer.next_frame()).collect()
    }

    pub(crate) fn dispatcher() -> Dispatcher {
        Dispatcher::new(SharedStatus::new(), &StreamOptions::default())
    }

    pub(crate) fn feed(dispatcher: &mut Dispatcher, bytes: &[u8], now: DateTime<Utc>) {
        for frame in frames(bytes) {
            dispatcher.process_at(&frame, now);
        }
    }

    #[test]
    fn ecef_conversion() {
        // Greenwich area, 45 m above the ellipsoid
        let (lat, lon, hae) = ecef_to_llh(3_980_608.0, -0.0, 4_966_862.0);
        assert!((lat - 51.477).abs() < 1e-2, "{lat}");
        assert!(lon.abs() < 1e-9);
        assert!(hae.abs() < 100.0, "{hae}");
    }

    #[test]
    fn satellites_from_all_protocols_share_one_table() {
        let now = Utc::now();
        let mut d = dispatcher();
        // GPS 12 via NAV-SAT
        let mut sat = vec![0u8; 8 + 12];
        sat[5] = 1;
        sat[8] = 0;
        sat[9] = 12;
        sat[10] = 45;
        sat[11] = 30;
        sat[12..14].copy_from_slice(&200i16.to_le_bytes());
        feed(&mut d, &UbxFrame::new(0x01, 0x35, sat).serialize(), now);
        // GLONASS 4 via GSV and GPS 12 again
        feed(
            &mut d,
            &wire_nmea::sentence("GLGSV", &["1", "1", "01", "68", "10", "090", "25"]),
            now,
        );
        feed(
            &mut d,
            &wire_nmea::sentence("GPGSV", &["1", "1", "01", "12", "46", "201", "31"]),
            now,
        );
        let snap = d.status().snapshot();
        assert_eq!(snap.siv, Some(2));
        let keys: Vec<_> = snap.visible.iter().map(|s| (s.gnss, s.svid)).collect();
        assert_eq!(keys, vec![(GnssId::Gps, 12), (GnssId::Glonass, 4)]);
        // latest report replaces the earlier one
        assert_eq!(snap.visible[0].elev, Some(46.0));
        assert_eq!(snap.visible[0].cno, Some(31.0));

        // the base station also tracks GPS 12; the rover entry stays
        let mut w = wire_rtcm::test::BitWriter::new();
        w.put(1074, 12).put(1, 12).put(0, 30).put(0, 19);
        w.put(1 << 52, 64).put(1 << 31, 32).put(1, 1);
        w.put(0, 18).put(0, 42).put(44, 6);
        feed(&mut d, &wire_rtcm::frame(&w.finish()), now);
        let snap = d.status().snapshot();
        assert_eq!(snap.siv, Some(2));
        assert_eq!(snap.visible[0].elev, Some(46.0));
        assert_eq!(snap.visible[0].cno, Some(31.0));
        assert_eq!(snap.diff_station, Some(1));
        assert_eq!(snap.base_satellites.len(), 1);
        assert_eq!(snap.base_satellites[0].cno, Some(44.0));

        // everything has expired ten seconds later
        feed(
            &mut d,
            &wire_nmea::sentence("GAGSV", &["1", "1", "00"]),
            now + TimeDelta::seconds(11),
        );
        assert!(d.status().snapshot().visible.is_empty());
    }

    #[test]
    fn silent_satellites_not_in_view() {
        let now = Utc::now();
        let mut d = dispatcher();
        feed(
            &mut d,
            &wire_nmea::sentence(
                "GPGSV",
                &["1", "1", "03", "02", "40", "100", "38", "07", "05", "310", "00", "09", "12", "045", ""],
            ),
            now,
        );
        let snap = d.status().snapshot();
        assert_eq!(snap.siv, Some(1));
        assert_eq!(snap.visible.len(), 1);
        // showing them does not make them count
        d.set_show_unused(true);
        feed(
            &mut d,
            &wire_nmea::sentence(
                "GPGSV",
                &["1", "1", "03", "02", "40", "100", "38", "07", "05", "310", "00", "09", "12", "045", ""],
            ),
            now,
        );
        let snap = d.status().snapshot();
        assert_eq!(snap.siv, Some(1));
        assert_eq!(snap.visible.len(), 3);
    }

    #[test]
    fn version_polled_once() {
        let queue = CommandQueue::new();
        let mut d = dispatcher().with_commands(queue.clone());
        let now = Utc::now();
        let pvt = UbxFrame::new(0x01, 0x07, wire_ubx::nav_pvt_payload(1, 2, 3, 4)).serialize();
        feed(&mut d, &pvt, now);
        feed(&mut d, &pvt, now);
        assert_eq!(queue.drain(), vec![wire_ubx::poll(0x0A, 0x04)]);
        // a new session polls again
        d.reset();
        feed(&mut d, &pvt, now);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn undecoded_frames_leave_status_alone() {
        let mut d = dispatcher();
        feed(&mut d, b"$GPXYZ,1,2*4F\r\n", Utc::now());
        assert_eq!(d.status().snapshot(), GnssStatus::default());
    }

    #[test]
    fn mixed_stream_fix_follows_latest_message() {
        let now = Utc::now();
        let mut d = dispatcher();
        let mut stream =
            UbxFrame::new(0x01, 0x07, wire_ubx::nav_pvt_payload(515074000, -1278000, 35000, 1500))
                .serialize();
        let mut gsa = vec!["A", "2"];
        gsa.extend([""; 12]);
        gsa.extend(["2.1", "1.1", "1.8", "1"]);
        stream.extend(wire_nmea::sentence("GNGSA", &gsa));
        let parsed = frames(&stream);
        assert_eq!(parsed[1].protocol, Protocol::Nmea);
        for frame in &parsed {
            d.process_at(frame, now);
        }
        let snap = d.status().snapshot();
        assert_eq!(snap.fix, Some(FixType::TwoD));
        assert_eq!(snap.pdop, Some(2.1));
        assert_eq!(snap.hdop, Some(1.1));
        assert_eq!(snap.vdop, Some(1.8));
    }
}

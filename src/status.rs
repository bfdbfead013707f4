//! Normalized receiver state shared between the protocol handlers and
//! whatever displays it.
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use chrono::{DateTime, NaiveTime, Utc};
use lazy_static::lazy_static;
use serde::Serialize;

use crate::{
    ubx::{MonComms, MonSpanBlock, MonSys},
    GnssId,
};

/// Satellites not re-reported within this window are dropped.
pub const DEFAULT_SATELLITE_EXPIRY: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
/// Category of the most recent position solution
pub enum FixType {
    /// No position
    NoFix,
    /// 2D fix
    TwoD,
    /// 3D fix
    ThreeD,
    /// Dead reckoning only
    DeadReckoning,
    /// GNSS combined with dead reckoning
    GnssDr,
    /// RTK with float ambiguities
    RtkFloat,
    /// RTK with fixed ambiguities
    RtkFixed,
    /// Time only (fixed position)
    TimeOnly,
    /// Differential GNSS
    Dgps,
}

impl Display for FixType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            FixType::NoFix => "NO FIX",
            FixType::TwoD => "2D",
            FixType::ThreeD => "3D",
            FixType::DeadReckoning => "DR",
            FixType::GnssDr => "GNSS+DR",
            FixType::RtkFloat => "RTK FLOAT",
            FixType::RtkFixed => "RTK FIXED",
            FixType::TimeOnly => "TIME ONLY",
            FixType::Dgps => "DGPS",
        })
    }
}

lazy_static! {
    // The same code means different things in different message families,
    // so the table is keyed by (message family, raw code).
    static ref FIX_TABLE: HashMap<(&'static str, &'static str), FixType> = {
        use FixType::*;
        let mut table = HashMap::new();
        for (code, fix) in [
            ("0", NoFix),
            ("1", ThreeD),
            ("2", Dgps),
            ("3", ThreeD),
            ("4", RtkFixed),
            ("5", RtkFloat),
            ("6", DeadReckoning),
        ] {
            table.insert(("GGA", code), fix);
        }
        // positioning mode indicator shared by GNS, RMC, GLL and VTG
        for family in ["GNS", "RMC", "GLL", "VTG"] {
            for (code, fix) in [
                ("N", NoFix),
                ("A", ThreeD),
                ("D", Dgps),
                ("E", DeadReckoning),
                ("F", RtkFloat),
                ("R", RtkFixed),
            ] {
                table.insert((family, code), fix);
            }
        }
        for (code, fix) in [("1", NoFix), ("2", TwoD), ("3", ThreeD)] {
            table.insert(("GSA", code), fix);
        }
        for (code, fix) in [
            ("NF", NoFix),
            ("DR", DeadReckoning),
            ("G2", TwoD),
            ("G3", ThreeD),
            ("D2", Dgps),
            ("D3", Dgps),
            ("RK", GnssDr),
            ("TT", TimeOnly),
        ] {
            table.insert(("PUBX00", code), fix);
        }
        for family in ["NAV-PVT", "NAV-STATUS", "NAV-SOL", "HNR-PVT"] {
            for (code, fix) in [
                ("0", NoFix),
                ("1", DeadReckoning),
                ("2", TwoD),
                ("3", ThreeD),
                ("4", GnssDr),
                ("5", TimeOnly),
            ] {
                table.insert((family, code), fix);
            }
        }
        table
    };
}

impl FixType {
    /// Translate a raw quality code reported by a message family such as
    /// `GGA` or `NAV-PVT`.
    pub fn translate(family: &str, code: &str) -> Option<Self> {
        FIX_TABLE.get(&(family, code)).copied()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
/// Protocol-agnostic satellite identity
pub struct SatelliteKey {
    /// Constellation
    pub gnss: GnssId,
    /// Satellite number within the constellation
    pub svid: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Latest report for one satellite
pub struct SatelliteInfo {
    /// Constellation
    pub gnss: GnssId,
    /// Satellite number within the constellation
    pub svid: u16,
    /// Elevation, deg
    pub elev: Option<f64>,
    /// Azimuth, deg
    pub azim: Option<f64>,
    /// Carrier to noise ratio, dBHz
    pub cno: Option<f64>,
    /// When this entry was written
    pub last_update: DateTime<Utc>,
}

impl SatelliteInfo {
    /// Table key
    pub fn key(&self) -> SatelliteKey {
        SatelliteKey {
            gnss: self.gnss,
            svid: self.svid,
        }
    }

    fn has_signal(&self) -> bool {
        self.cno.is_some_and(|cno| cno > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Satellites reported by any protocol, keyed by constellation and number.
pub struct SatelliteTable {
    entries: HashMap<SatelliteKey, SatelliteInfo>,
    expiry: Duration,
}

impl Default for SatelliteTable {
    fn default() -> Self {
        Self::new(DEFAULT_SATELLITE_EXPIRY)
    }
}

impl SatelliteTable {
    /// Empty table with the given expiry window
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            expiry,
        }
    }

    /// Expiry window
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Change the expiry window; applies from the next sweep.
    pub fn set_expiry(&mut self, expiry: Duration) {
        self.expiry = expiry;
    }

    /// Replace the entry for this satellite.
    pub fn update(&mut self, info: SatelliteInfo) {
        self.entries.insert(info.key(), info);
    }

    /// Entry for a satellite, expired or not
    pub fn get(&self, key: &SatelliteKey) -> Option<&SatelliteInfo> {
        self.entries.get(key)
    }

    /// Number of entries, including ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with a positive carrier to noise ratio
    pub fn with_signal(&self) -> usize {
        self.entries.values().filter(|info| info.has_signal()).count()
    }

    fn is_fresh(&self, info: &SatelliteInfo, now: DateTime<Utc>) -> bool {
        match (now - info.last_update).to_std() {
            Ok(age) => age <= self.expiry,
            // reported after `now`
            Err(_) => true,
        }
    }

    /// Drop expired entries and return the visible set ordered by
    /// constellation and number. Entries without signal are left out
    /// unless `show_unused` is set.
    pub fn sweep(&mut self, now: DateTime<Utc>, show_unused: bool) -> Vec<SatelliteInfo> {
        let expired: Vec<SatelliteKey> = self
            .entries
            .values()
            .filter(|info| !self.is_fresh(info, now))
            .map(SatelliteInfo::key)
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }
        let mut visible: Vec<SatelliteInfo> = self
            .entries
            .values()
            .filter(|info| show_unused || info.has_signal())
            .cloned()
            .collect();
        visible.sort_by_key(SatelliteInfo::key);
        visible
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Vehicle attitude, replaced wholesale by the last attitude message
pub struct Attitude {
    /// deg
    pub roll: Option<f64>,
    /// deg
    pub pitch: Option<f64>,
    /// deg
    pub yaw: Option<f64>,
    /// Message that produced this record
    pub source: String,
    /// Source specific status
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Rover position relative to the reference station
pub struct RelativePosition {
    /// deg
    pub heading: Option<f64>,
    /// m
    pub length: Option<f64>,
    /// deg
    pub acc_heading: Option<f64>,
    /// m
    pub acc_length: Option<f64>,
    /// Solution flags in a fixed order
    pub flags: Vec<(&'static str, u8)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Base station survey-in progress
pub struct SurveyIn {
    /// Survey in progress
    pub active: bool,
    /// Position valid and accuracy target met
    pub valid: bool,
    /// s
    pub duration: u32,
    /// m
    pub mean_acc: f64,
    /// Position observations used
    pub observations: u32,
    /// Mean position as (lat deg, lon deg, m above ellipsoid)
    pub position: Option<(f64, f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Reference station announced by the correction stream
pub struct BaseStation {
    /// Station id
    pub station_id: u16,
    /// deg
    pub lat: f64,
    /// deg
    pub lon: f64,
    /// m above ellipsoid
    pub hae: f64,
    /// m
    pub antenna_height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Receiver firmware identification
pub struct ReceiverVersion {
    /// Software version
    pub software: String,
    /// Hardware version
    pub hardware: String,
    /// Extension strings (protocol version, firmware module, ...)
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
/// Latest normalized navigation state. `None` means "no data yet".
pub struct GnssStatus {
    /// UTC time of day
    pub utc: Option<NaiveTime>,
    /// Full timestamp, once a date has been reported
    pub timestamp: Option<DateTime<Utc>>,
    /// deg
    pub lat: Option<f64>,
    /// deg
    pub lon: Option<f64>,
    /// m above mean sea level
    pub alt: Option<f64>,
    /// m above ellipsoid
    pub hae: Option<f64>,
    /// m/s
    pub speed: Option<f64>,
    /// deg
    pub track: Option<f64>,
    /// Fix category
    pub fix: Option<FixType>,
    /// Satellites in view
    pub siv: Option<u32>,
    /// Satellites used in the solution
    pub sip: Option<u32>,
    /// Position DOP
    pub pdop: Option<f64>,
    /// Horizontal DOP
    pub hdop: Option<f64>,
    /// Vertical DOP
    pub vdop: Option<f64>,
    /// Horizontal accuracy estimate, m
    pub hacc: Option<f64>,
    /// Vertical accuracy estimate, m
    pub vacc: Option<f64>,
    /// Differential corrections applied
    pub diff_corr: Option<bool>,
    /// Age of differential corrections, s
    pub diff_age: Option<f64>,
    /// Differential reference station
    pub diff_station: Option<u16>,
    #[serde(skip)]
    /// All satellites reported within the expiry window
    pub satellites: SatelliteTable,
    /// Result of the last satellite sweep
    pub visible: Vec<SatelliteInfo>,
    /// Attitude
    pub attitude: Option<Attitude>,
    /// Relative position to the base
    pub relpos: Option<RelativePosition>,
    /// Survey-in progress
    pub survey_in: Option<SurveyIn>,
    /// Reference station from the correction stream
    pub base_station: Option<BaseStation>,
    /// Satellites observed by the reference station, from the last MSM
    /// message of each constellation
    pub base_satellites: Vec<SatelliteInfo>,
    /// RF spectrum snapshot
    pub spectrum: Option<Vec<MonSpanBlock>>,
    /// System monitor snapshot
    pub sysmon: Option<MonSys>,
    /// Communication port snapshot
    pub comms: Option<MonComms>,
    /// Receiver firmware
    pub version: Option<ReceiverVersion>,
}

#[derive(Debug, Clone, Default)]
/// Shared handle to one [`GnssStatus`].
///
/// Readers take snapshots; only the protocol handlers write.
pub struct SharedStatus(Arc<RwLock<GnssStatus>>);

impl SharedStatus {
    /// New handle with every field unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> GnssStatus {
        self.read(GnssStatus::clone)
    }

    /// Run `f` against the current state without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&GnssStatus) -> R) -> R {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut GnssStatus) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Clear every field, keeping the satellite expiry window.
    pub(crate) fn reset(&self) {
        self.write(|status| {
            let expiry = status.satellites.expiry();
            *status = GnssStatus {
                satellites: SatelliteTable::new(expiry),
                ..Default::default()
            };
        });
    }
}

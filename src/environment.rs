//! Process-wide time and site state, passed around explicitly so tests can
//! substitute a fake clock.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone, Utc};

use crate::astro_math::Degrees;

/// The observing site. Longitude is stored east-positive; the LX200
/// west-positive convention is converted at the protocol boundary.
#[derive(Debug, Clone)]
pub struct ObservingLocation {
    pub name: String,
    pub latitude: Degrees,
    pub longitude: Degrees,
    pub height: f64,
}

impl Default for ObservingLocation {
    fn default() -> Self {
        ObservingLocation {
            name: "Home".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            height: 0.0,
        }
    }
}

#[derive(Debug)]
struct ClockState {
    /// Difference between planetarium-supplied time and the host clock.
    delta: Duration,
    offset: FixedOffset,
    /// Frozen "now" for tests.
    frozen: Option<DateTime<Utc>>,
}

/// Clock with a settable offset.
///
/// A host without internet access or a real-time clock drifts away from the
/// wall time the planetarium software knows. The software sends its own date
/// and time after connecting; the difference with the host clock is kept
/// here and applied to every time read in the process.
#[derive(Debug, Clone)]
pub struct Clock {
    state: Arc<Mutex<ClockState>>,
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            state: Arc::new(Mutex::new(ClockState {
                delta: Duration::zero(),
                offset: *Local::now().offset(),
                frozen: None,
            })),
        }
    }

    /// A clock frozen at the given instant. Test use only.
    pub fn frozen(at: DateTime<Utc>) -> Self {
        let clock = Clock::new();
        clock.state.lock().unwrap().frozen = Some(at);
        clock
    }

    fn host_now(&self) -> DateTime<Utc> {
        let state = self.state.lock().unwrap();
        state.frozen.unwrap_or_else(Utc::now)
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        let state = self.state.lock().unwrap();
        let utc = state.frozen.unwrap_or_else(Utc::now) + state.delta;
        utc.with_timezone(&state.offset)
    }

    /// Seconds since the Unix epoch, corrected by the stored delta.
    pub fn timestamp(&self) -> f64 {
        let now = self.now();
        now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 * 1e-9
    }

    /// Adopt the date and time reported by the planetarium software.
    pub fn set_datetime(&self, datetime: DateTime<FixedOffset>) {
        let host = self.host_now();
        let mut state = self.state.lock().unwrap();
        state.delta = datetime.with_timezone(&Utc) - host;
        state.offset = *datetime.offset();
    }

    /// Set the UTC offset in hours, east-positive.
    pub fn set_utc_offset(&self, hours: f64) {
        if let Some(offset) = FixedOffset::east_opt((hours * 3600.0) as i32) {
            self.state.lock().unwrap().offset = offset;
        }
    }

    pub fn utc_offset_hours(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state.offset.local_minus_utc() as f64 / 3600.0
    }

    pub fn datetime_from_timestamp(timestamp: f64) -> DateTime<Utc> {
        let seconds = timestamp.floor();
        let nanos = ((timestamp - seconds) * 1e9) as u32;
        Utc.timestamp_opt(seconds as i64, nanos).unwrap()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}

/// Clock plus observing location, shared by the command surface and the
/// periodic loops.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    clock: Clock,
    location: Arc<RwLock<ObservingLocation>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        Environment {
            clock,
            location: Arc::new(RwLock::new(ObservingLocation::default())),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current timestamp in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        self.clock.timestamp()
    }

    /// Snapshot of the observing location.
    pub fn location(&self) -> ObservingLocation {
        self.location.read().unwrap().clone()
    }

    pub fn set_latitude(&self, latitude: Degrees) {
        self.location.write().unwrap().latitude = latitude;
    }

    pub fn set_longitude(&self, longitude: Degrees) {
        self.location.write().unwrap().longitude = longitude;
    }

    pub fn set_height(&self, height: f64) {
        self.location.write().unwrap().height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_clock() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let clock = Clock::frozen(at);
        assert_eq!(clock.timestamp(), at.timestamp() as f64);
        assert_eq!(clock.timestamp(), clock.timestamp());
    }

    #[test]
    fn test_set_datetime_shifts_reads() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let clock = Clock::frozen(at);
        let offset = FixedOffset::east_opt(3600).unwrap();
        let reported = offset.with_ymd_and_hms(2023, 6, 1, 14, 30, 0).unwrap();
        clock.set_datetime(reported);
        assert_eq!(clock.now(), reported);
        assert_float_absolute_eq!(clock.utc_offset_hours(), 1.0);
    }

    #[test]
    fn test_set_utc_offset() {
        let clock = Clock::new();
        clock.set_utc_offset(-5.0);
        assert_float_absolute_eq!(clock.utc_offset_hours(), -5.0);
    }

    #[test]
    fn test_environment_location_updates() {
        let env = Environment::new();
        env.set_latitude(40.5);
        env.set_longitude(-3.88);
        let location = env.location();
        assert_eq!(location.latitude, 40.5);
        assert_eq!(location.longitude, -3.88);
        assert_eq!(location.name, "Home");
    }
}

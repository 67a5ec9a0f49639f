use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use radar_proto::Reading;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected(port) => write!(f, "connected to {}", port),
        }
    }
}

/// `true` when no reading arrived in the last `timeout_ms`, or none ever did.
pub fn is_stale(last_data_ms: Option<u64>, now_ms: u64, timeout_ms: u64) -> bool {
    match last_data_ms {
        Some(t) => now_ms.saturating_sub(t) > timeout_ms,
        None => true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RadarState {
    pub connection: ConnectionState,
    pub last_port: Option<String>,
    pub connected_at_ms: Option<u64>,
    pub reading: Reading,
    /// Set by the first reading and never cleared; `Some` doubles as "has ever received data".
    pub last_data_ms: Option<u64>,
}

impl RadarState {
    pub fn has_data(&self) -> bool {
        self.last_data_ms.is_some()
    }

    /// Connected, yet neither a reading nor the connection itself is newer than
    /// `timeout_ms`. A fresh connection gets a full window before it is judged.
    pub fn link_silent(&self, now_ms: u64, timeout_ms: u64) -> bool {
        if !self.connection.is_connected() {
            return false;
        }
        let last_activity = self.last_data_ms.max(self.connected_at_ms);
        is_stale(last_activity, now_ms, timeout_ms)
    }
}

/// The one structure shared between the acquisition loop, the connection
/// manager and the render path. All fields move together under one lock.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<RadarState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_reading(&self, reading: Reading, now_ms: u64) {
        let mut st = self.inner.lock();
        st.reading = reading;
        st.last_data_ms = Some(now_ms);
    }

    pub(crate) fn set_connecting(&self) {
        self.inner.lock().connection = ConnectionState::Connecting;
    }

    pub(crate) fn set_connected(&self, port: &str, now_ms: u64) {
        let mut st = self.inner.lock();
        st.connection = ConnectionState::Connected(port.to_string());
        st.last_port = Some(port.to_string());
        st.connected_at_ms = Some(now_ms);
    }

    /// Returns the previous state.
    pub(crate) fn set_disconnected(&self) -> ConnectionState {
        let mut st = self.inner.lock();
        st.connected_at_ms = None;
        std::mem::take(&mut st.connection)
    }

    /// `Connected -> Disconnected`, leaving any other state alone. Returns the
    /// port that was connected.
    pub(crate) fn drop_connected(&self) -> Option<String> {
        let mut st = self.inner.lock();
        if !st.connection.is_connected() {
            return None;
        }
        st.connected_at_ms = None;
        match std::mem::take(&mut st.connection) {
            ConnectionState::Connected(port) => Some(port),
            _ => None,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.lock().connection.clone()
    }

    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        is_stale(self.inner.lock().last_data_ms, now_ms, timeout_ms)
    }

    pub fn link_silent(&self, now_ms: u64, timeout_ms: u64) -> bool {
        self.inner.lock().link_silent(now_ms, timeout_ms)
    }

    pub fn state(&self) -> RadarState {
        self.inner.lock().clone()
    }

    pub fn snapshot(&self, now_ms: u64) -> RadarSnapshot {
        let st = self.inner.lock();
        RadarSnapshot {
            state: st.connection.clone(),
            port_name: st.last_port.clone(),
            angle_deg: st.reading.angle_deg,
            distance_cm: st.reading.distance_cm,
            has_data: st.has_data(),
            data_age_ms: st.last_data_ms.map(|t| now_ms.saturating_sub(t)),
        }
    }
}

/// How recently data arrived, as the status line shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataActivity {
    None,
    Active,
    Silent { secs: u64 },
}

/// Copy of [`SharedState`] handed to the renderer for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarSnapshot {
    pub state: ConnectionState,
    pub port_name: Option<String>,
    pub angle_deg: i32,
    pub distance_cm: i32,
    pub has_data: bool,
    pub data_age_ms: Option<u64>,
}

impl RadarSnapshot {
    pub fn is_stale(&self, timeout_ms: u64) -> bool {
        self.data_age_ms.map_or(true, |age| age > timeout_ms)
    }

    /// Whether a target should be drawn; otherwise the display reads "Out of Range".
    pub fn target_in_range(&self, max_distance_cm: i32, timeout_ms: u64) -> bool {
        self.has_data && !self.is_stale(timeout_ms) && self.distance_cm < max_distance_cm
    }

    pub fn data_activity(&self) -> DataActivity {
        match self.data_age_ms {
            None => DataActivity::None,
            Some(age) if age < 2000 => DataActivity::Active,
            Some(age) => DataActivity::Silent { secs: age / 1000 },
        }
    }

    pub fn angle_rad(&self) -> f64 {
        (self.angle_deg as f64).to_radians()
    }

    pub fn distance_in(&self) -> f64 {
        self.distance_cm as f64 * 0.393701
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_boundary() {
        let t = 5_000;
        assert!(is_stale(Some(t), t + 1001, 1000));
        assert!(!is_stale(Some(t), t + 999, 1000));
        assert!(!is_stale(Some(t), t + 1000, 1000));
        assert!(is_stale(None, 0, 1000));
    }

    #[test]
    fn reading_is_published_as_a_group() {
        let s = SharedState::new();
        assert!(!s.state().has_data());
        s.publish_reading(Reading { angle_deg: 90, distance_cm: 45 }, 1234);
        let snap = s.snapshot(1300);
        assert_eq!(snap.angle_deg, 90);
        assert_eq!(snap.distance_cm, 45);
        assert!(snap.has_data);
        assert_eq!(snap.data_age_ms, Some(66));
    }

    #[test]
    fn fresh_connection_gets_a_full_window() {
        let s = SharedState::new();
        s.set_connected("COM5", 10_000);
        assert!(!s.link_silent(10_900, 1000));
        assert!(s.link_silent(11_001, 1000));

        // old data from a previous connection does not count against the new one
        s.publish_reading(Reading::default(), 500);
        assert!(!s.link_silent(10_999, 1000));
    }

    #[test]
    fn disconnected_is_never_silent() {
        let s = SharedState::new();
        assert!(!s.link_silent(1_000_000, 1000));
    }

    #[test]
    fn disconnect_keeps_last_port_and_data() {
        let s = SharedState::new();
        s.set_connected("/dev/rfcomm0", 0);
        s.publish_reading(Reading { angle_deg: 10, distance_cm: 20 }, 5);
        assert_eq!(s.set_disconnected(), ConnectionState::Connected("/dev/rfcomm0".into()));
        assert_eq!(s.set_disconnected(), ConnectionState::Disconnected);
        let st = s.state();
        assert_eq!(st.last_port.as_deref(), Some("/dev/rfcomm0"));
        assert!(st.has_data());
    }

    #[test]
    fn only_a_connected_link_can_be_dropped() {
        let s = SharedState::new();
        assert_eq!(s.drop_connected(), None);
        assert_eq!(s.connection(), ConnectionState::Disconnected);

        s.set_connecting();
        assert_eq!(s.drop_connected(), None);
        assert_eq!(s.connection(), ConnectionState::Connecting);

        s.set_connected("COM5", 100);
        assert_eq!(s.drop_connected().as_deref(), Some("COM5"));
        assert_eq!(s.connection(), ConnectionState::Disconnected);
        assert_eq!(s.state().connected_at_ms, None);
    }

    #[test]
    fn snapshot_presentation() {
        let snap = RadarSnapshot {
            state: ConnectionState::Connected("COM5".into()),
            port_name: Some("COM5".into()),
            angle_deg: 90,
            distance_cm: 45,
            has_data: true,
            data_age_ms: Some(16),
        };
        assert!(snap.target_in_range(120, 1000));
        assert_eq!(snap.data_activity(), DataActivity::Active);
        assert!((snap.angle_rad() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((snap.distance_in() - 17.716545).abs() < 1e-6);

        let far = RadarSnapshot { distance_cm: 120, ..snap.clone() };
        assert!(!far.target_in_range(120, 1000));

        let old = RadarSnapshot { data_age_ms: Some(4_500), ..snap };
        assert!(!old.target_in_range(120, 1000));
        assert_eq!(old.data_activity(), DataActivity::Silent { secs: 4 });
    }
}

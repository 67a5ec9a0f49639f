use std::io::Write;

use radar_link::{ConnectionState, DataActivity, RadarSnapshot, Renderer};

/// Prints one status line per change of what the radar screen would show.
pub struct TextRenderer<W: Write + Send> {
    out: W,
    max_distance_cm: i32,
    data_timeout_ms: u64,
    last_line: Option<String>,
}

impl<W: Write + Send> TextRenderer<W> {
    pub fn new(out: W, max_distance_cm: i32, data_timeout_ms: u64) -> Self {
        Self { out, max_distance_cm, data_timeout_ms, last_line: None }
    }

    pub fn status_line(&self, snap: &RadarSnapshot) -> String {
        let port = match &snap.state {
            ConnectionState::Disconnected => return "DISCONNECTED | attempting to reconnect...".to_string(),
            ConnectionState::Connecting => return "CONNECTING | searching for radar...".to_string(),
            ConnectionState::Connected(port) => port,
        };

        let data = match snap.data_activity() {
            DataActivity::None => "data: waiting".to_string(),
            DataActivity::Active => "data: active".to_string(),
            DataActivity::Silent { secs } => format!("data: {}s ago", secs),
        };
        let angle = format!("θ: {} deg ({:.2} rad)", snap.angle_deg, snap.angle_rad());
        let distance = if snap.target_in_range(self.max_distance_cm, self.data_timeout_ms) {
            format!("s: {} cm ({:.2} in)", snap.distance_cm, snap.distance_in())
        } else {
            "s: Out of Range".to_string()
        };
        format!("CONNECTED - {} | {} | {} | {}", port, data, angle, distance)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for TextRenderer<W> {
    fn render(&mut self, snapshot: RadarSnapshot) {
        let line = self.status_line(&snapshot);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return;
        }
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
        self.last_line = Some(line);
    }
}

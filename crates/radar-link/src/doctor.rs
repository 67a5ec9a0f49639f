use anyhow::Result;

use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(cfg.baud > 0, "link.baud must be > 0");
    anyhow::ensure!(cfg.read_timeout_ms > 0, "link.read_timeout_ms must be > 0");
    anyhow::ensure!(cfg.liveness_polls > 0 && cfg.liveness_poll_ms > 0, "link liveness window is empty");
    anyhow::ensure!(cfg.acquire_poll_ms >= 1 && cfg.acquire_poll_ms <= 100, "link.acquire_poll_ms should be 1..100");
    anyhow::ensure!(
        cfg.reconnect_interval_ms >= cfg.data_timeout_ms,
        "link.reconnect_interval_ms should not be shorter than link.data_timeout_ms"
    );
    if let Some(port) = &cfg.port {
        anyhow::ensure!(!port.trim().is_empty(), "link.port is empty");
    }
    if let Some(max) = cfg.max_frame_len {
        // "-2147483648,-2147483648" is the longest valid record
        anyhow::ensure!(max >= 23, "link.max_frame_len too small for a full record");
    }
    Ok(())
}

pub fn check_tick(tick_ms: u64, data_timeout_ms: u64) -> Result<()> {
    anyhow::ensure!(tick_ms >= 1 && tick_ms <= 1000, "display.tick_ms should be 1..1000");
    anyhow::ensure!(data_timeout_ms >= tick_ms, "link.data_timeout_ms shorter than one tick");
    Ok(())
}

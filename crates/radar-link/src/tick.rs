use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::Clock;
use crate::connection::{ConnectionManager, LostCause};
use crate::shutdown::Shutdown;
use crate::state::{ConnectionState, RadarSnapshot};

/// Consumer of one frame's worth of state. Must not feed anything back.
pub trait Renderer: Send {
    fn render(&mut self, snapshot: RadarSnapshot);
}

/// Fixed-rate driver: staleness check, reconnection, redraw.
pub struct TickLoop<R: Renderer> {
    manager: ConnectionManager,
    renderer: R,
    clock: Arc<dyn Clock>,
    period: Duration,
    data_timeout_ms: u64,
    shutdown: Shutdown,
}

impl<R: Renderer> TickLoop<R> {
    pub fn new(
        manager: ConnectionManager,
        renderer: R,
        clock: Arc<dyn Clock>,
        period: Duration,
        data_timeout_ms: u64,
        shutdown: Shutdown,
    ) -> Self {
        let manager = manager.with_shutdown(shutdown.clone());
        Self { manager, renderer, clock, period, data_timeout_ms, shutdown }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// One tick. May block inside `connect()` when a retry is due.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        let shared = self.manager.link();

        if shared.state().link_silent(now, self.data_timeout_ms) {
            self.manager.report_lost(LostCause::Silent);
        }

        if self.manager.state() == ConnectionState::Disconnected {
            self.manager.retry_if_due(now);
        }

        let snapshot = shared.state().snapshot(self.clock.now_ms());
        self.renderer.render(snapshot);
    }

    /// Tick until shutdown, then close the port. Returns the renderer.
    pub fn run(mut self) -> R {
        info!("tick: started ({}ms period)", self.period.as_millis());
        while !self.shutdown.is_triggered() {
            self.tick();
            self.clock.sleep(self.period);
        }
        self.manager.shutdown();
        info!("tick: stopped");
        self.renderer
    }
}

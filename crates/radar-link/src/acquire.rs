use std::sync::Arc;
use std::time::Duration;

use radar_proto::{FrameParser, Reading};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::connection::{LinkHandle, LostCause};
use crate::link::ReadError;
use crate::shutdown::Shutdown;

/// Upper bound on bytes taken per iteration.
const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStep {
    /// No port open.
    Idle,
    /// Port open; `bytes` read, `reading` is the last record they completed.
    Read { bytes: usize, reading: Option<Reading> },
    /// The read failed and the link was reported lost.
    Lost,
}

/// Pulls bytes from the open port into the parser and publishes readings.
///
/// Only stamps timestamps; deciding that a quiet link is dead is the tick
/// loop's job.
pub struct AcquisitionLoop {
    link: LinkHandle,
    parser: FrameParser,
    clock: Arc<dyn Clock>,
    poll: Duration,
    shutdown: Shutdown,
    generation: Option<u64>,
}

impl AcquisitionLoop {
    pub fn new(
        link: LinkHandle,
        parser: FrameParser,
        clock: Arc<dyn Clock>,
        poll: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self { link, parser, clock, poll, shutdown, generation: None }
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    pub fn step(&mut self) -> AcquireStep {
        let polled = self.link.slot().with_link(|generation, port| -> Result<(u64, Vec<u8>), ReadError> {
            let available = port.bytes_available()?;
            if available == 0 {
                return Ok((generation, Vec::new()));
            }
            let mut buf = vec![0u8; available.min(READ_CHUNK)];
            let n = port.read_into(&mut buf)?;
            buf.truncate(n);
            Ok((generation, buf))
        });

        let (generation, bytes) = match polled {
            None => return AcquireStep::Idle,
            Some(Ok(read)) => read,
            Some(Err(e)) => {
                let cause = match e {
                    ReadError::StreamEnded => LostCause::StreamEnded,
                    ReadError::Io(_) => LostCause::ReadFailed,
                };
                debug!("acquire: {}", e);
                self.link.report_lost(cause);
                return AcquireStep::Lost;
            }
        };

        // a partial record from a previous port must not bleed into the new one
        if self.generation != Some(generation) {
            self.parser.reset();
            self.generation = Some(generation);
        }

        let reading = self.parser.feed_all(&bytes);
        if let Some(r) = reading {
            self.link.state().publish_reading(r, self.clock.now_ms());
        }
        AcquireStep::Read { bytes: bytes.len(), reading }
    }

    /// Poll until shutdown.
    pub fn run(mut self) {
        info!("acquisition: started");
        while !self.shutdown.is_triggered() {
            self.step();
            self.clock.sleep(self.poll);
        }
        info!("acquisition: stopped ({} malformed record(s) dropped)", self.parser.discarded());
    }
}

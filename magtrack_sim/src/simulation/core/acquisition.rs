// magtrack_sim/src/simulation/core/acquisition.rs

//! Background sampling of the sensor ring.
//!
//! The producer fills a batch in its own buffer and then swaps the whole batch
//! into a shared slot, so the consumer never sees a half-written cycle. Only
//! the newest batch is kept; anything the consumer did not pick up in time is
//! overwritten.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use magtrack_core::types::{Position, SensorReadings};
use tracing::{debug, info};

/// One raw batch together with the magnet position it was sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub truth: Position,
    pub raw: SensorReadings,
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Frame>,
    published: u64,
    overwritten: u64,
    closed: bool,
}

/// Single-writer / single-reader hand-off holding only the newest frame.
#[derive(Debug, Default)]
pub struct LatestReadings {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl LatestReadings {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking peer cannot leave a half-swapped frame behind, so a poisoned
    // lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces whatever frame is pending with `frame`.
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.lock();
        if slot.latest.replace(frame).is_some() {
            slot.overwritten += 1;
        }
        slot.published += 1;
        drop(slot);
        self.ready.notify_one();
    }

    /// Takes the pending frame without waiting.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().latest.take()
    }

    /// Waits up to `timeout` for a frame. `None` on timeout or once the
    /// producer has closed the slot and nothing is pending.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(frame) = slot.latest.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Marks the producer as gone and wakes any waiting reader.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn stats(&self) -> AcquisitionStats {
        let slot = self.lock();
        AcquisitionStats {
            published: slot.published,
            overwritten: slot.overwritten,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquisitionStats {
    pub published: u64,
    /// Frames replaced before the consumer took them.
    pub overwritten: u64,
}

// =========================================================================
// == Producer Thread ==
// =========================================================================

/// Owns the sampling thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct Acquisition {
    shared: Arc<LatestReadings>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Acquisition {
    /// Starts calling `sampler` at `rate_hz`, publishing every frame it returns.
    pub fn spawn<F>(rate_hz: f64, mut sampler: F) -> Result<Self>
    where
        F: FnMut(u64) -> Frame + Send + 'static,
    {
        let period = Duration::try_from_secs_f64(1.0 / rate_hz)
            .with_context(|| format!("invalid acquisition rate {rate_hz} Hz"))?;
        let shared = Arc::new(LatestReadings::new());
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("acquisition".to_string())
                .spawn(move || {
                    info!(rate_hz, "acquisition thread started");
                    let mut sequence = 0;
                    let mut next_tick = Instant::now();
                    while !stop.load(Ordering::Acquire) {
                        shared.publish(sampler(sequence));
                        sequence += 1;

                        next_tick += period;
                        let now = Instant::now();
                        if next_tick > now {
                            thread::sleep(next_tick - now);
                        } else {
                            next_tick = now;
                        }
                    }
                    shared.close();
                    debug!(frames = sequence, "acquisition thread stopped");
                })
                .context("failed to spawn the acquisition thread")?
        };

        Ok(Self {
            shared,
            stop,
            handle: Some(handle),
        })
    }

    /// Newest frame, waiting up to `timeout` for one to arrive.
    pub fn latest(&self, timeout: Duration) -> Option<Frame> {
        self.shared.take_timeout(timeout)
    }

    /// Stops the producer, joins it and returns its counters.
    pub fn stop(mut self) -> Result<AcquisitionStats> {
        self.shutdown()?;
        Ok(self.shared.stats())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("acquisition thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

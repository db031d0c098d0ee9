//! Fixed-period sampling: one tick draws the current frame, encodes it and hands it
//! to the transport.
//!
//! Ticks fire independently of whether the previous tick finished, so an atomic
//! in-flight flag decides whether a tick may start. Busy ticks are dropped, never
//! queued: a stale frame is worthless once a fresher one exists.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::buffer::CaptureBuffer;
use super::errors::CaptureError;
use super::media::MediaStream;
use super::types::ReadyState;
use crate::transport::{FrameMessage, FrameSender};

/// Clears the in-flight flag on drop, so errors and panics cannot wedge the loop.
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Stopped,
    Paused,
    NotReady,
    InFlight,
}

#[derive(Debug)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// Work was handed to the blocking pool; the handle resolves when it is done.
    Dispatched(JoinHandle<()>),
}

impl TickOutcome {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            TickOutcome::Skipped(reason) => Some(*reason),
            TickOutcome::Dispatched(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStats {
    pub frames_sent: u64,
    pub failures: u64,
    pub dropped_in_flight: u64,
}

struct SamplerShared {
    stream: Arc<dyn MediaStream>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    sender: Arc<dyn FrameSender>,
    quality: u8,
    in_flight: Arc<AtomicBool>,
    active: AtomicBool,
    paused: AtomicBool,
    frames_sent: AtomicU64,
    failures: AtomicU64,
    dropped_in_flight: AtomicU64,
}

/// Lock the capture buffer, recovering from a poisoned lock left by a panicked tick.
pub fn lock_buffer(buffer: &Mutex<CaptureBuffer>) -> MutexGuard<'_, CaptureBuffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct Sampler {
    shared: Arc<SamplerShared>,
}

impl Sampler {
    pub fn new(
        stream: Arc<dyn MediaStream>,
        buffer: Arc<Mutex<CaptureBuffer>>,
        sender: Arc<dyn FrameSender>,
        quality: u8,
    ) -> Self {
        Self {
            shared: Arc::new(SamplerShared {
                stream,
                buffer,
                sender,
                quality,
                in_flight: Arc::new(AtomicBool::new(false)),
                active: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                dropped_in_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Run one sampling tick.
    pub fn tick(&self) -> TickOutcome {
        let shared = &self.shared;

        if !shared.active.load(Ordering::Acquire) {
            return TickOutcome::Skipped(SkipReason::Stopped);
        }
        if shared.paused.load(Ordering::Acquire) {
            return TickOutcome::Skipped(SkipReason::Paused);
        }
        if shared.stream.ready_state() < ReadyState::HaveEnoughData {
            return TickOutcome::Skipped(SkipReason::NotReady);
        }

        let Some(guard) = InFlightGuard::try_acquire(&shared.in_flight) else {
            shared.dropped_in_flight.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped(SkipReason::InFlight);
        };

        let shared = self.shared.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            if let Err(e) = capture_and_send(&shared) {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "capture", "[SAMPLER] Tick failed: {}", e);
            }
        });

        TickOutcome::Dispatched(handle)
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Stop accepting ticks. Work already in flight finishes but its result is dropped.
    pub fn deactivate(&self) {
        self.shared.active.store(false, Ordering::Release);
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
            dropped_in_flight: self.shared.dropped_in_flight.load(Ordering::Relaxed),
        }
    }
}

fn capture_and_send(shared: &SamplerShared) -> Result<(), CaptureError> {
    let frame = shared.stream.current_frame()?;

    let image = {
        let mut buffer = lock_buffer(&shared.buffer);
        if !shared.active.load(Ordering::Acquire) {
            return Ok(());
        }
        buffer.draw(&frame)?;
        buffer.to_data_url(shared.quality)?
    };

    if !shared.active.load(Ordering::Acquire) {
        tracing::debug!(target: "capture", "[SAMPLER] Discarding frame encoded after stop");
        return Ok(());
    }

    shared.sender.send_frame(FrameMessage { image })?;
    shared.frames_sent.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Periodic timer driving a [`Sampler`]. The first tick fires one period after spawn.
pub struct SamplingTimer {
    sampler: Sampler,
    handle: JoinHandle<()>,
}

impl SamplingTimer {
    pub fn spawn(sampler: Sampler, period: Duration) -> Self {
        let ticker = sampler.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if let TickOutcome::Skipped(reason) = ticker.tick() {
                    tracing::trace!(target: "capture", "[SAMPLER] Tick skipped: {:?}", reason);
                    if reason == SkipReason::Stopped {
                        break;
                    }
                }
            }
        });

        Self { sampler, handle }
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Cancel synchronously. Safe to call more than once.
    pub fn cancel(&self) {
        self.sampler.deactivate();
        self.handle.abort();
    }
}

impl Drop for SamplingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

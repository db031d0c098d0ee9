//! Pure state machine for the capture lifecycle.
//!
//! `(State, Event) -> (NewState, Vec<SideEffect>)`
//!
//! Invalid transitions return the current state with empty effects. The loop that
//! owns the hardware executes the effects; this module never performs I/O.

use std::time::Instant;

use super::errors::MediaError;
use super::types::Resolution;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CaptureState {
    /// No stream, no timer.
    #[default]
    Idle,

    /// Waiting for the media request to resolve.
    Acquiring {
        requested_at: Instant,
        device_id: Option<String>,
    },

    /// Stream bound and sampling timer running.
    Active {
        started_at: Instant,
        device_id: String,
        resolution: Resolution,
    },
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, CaptureState::Idle)
    }

    pub fn is_acquiring(&self) -> bool {
        matches!(self, CaptureState::Acquiring { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::Active { .. })
    }

    /// Idle is the only state a start request acts on unconditionally.
    pub fn is_busy(&self) -> bool {
        !self.is_idle()
    }

    pub fn elapsed(&self) -> Option<std::time::Duration> {
        match self {
            CaptureState::Active { started_at, .. } => Some(started_at.elapsed()),
            CaptureState::Acquiring { requested_at, .. } => Some(requested_at.elapsed()),
            CaptureState::Idle => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// User asked to start, optionally on a specific device.
    StartRequested { device_id: Option<String> },

    /// The media request resolved with a stream.
    StreamAcquired {
        device_id: String,
        resolution: Resolution,
    },

    /// The media request was rejected.
    AcquisitionFailed { error: MediaError },

    /// User asked to stop.
    StopRequested,

    /// Host is going away; same cleanup as a stop.
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Issue a media request for the given device (or the preferred one).
    AcquireStream { device_id: Option<String> },

    /// Forget an outstanding media request; a late stream gets released on arrival.
    CancelAcquisition,

    /// Stop every track of the current session.
    ReleaseStream,

    SizeBuffer { resolution: Resolution },

    ClearBuffer,

    BindPreview,

    ClearPreview,

    StartSampling,

    StopSampling,

    /// Remember the device that was just acquired.
    PersistDevice,

    SurfaceError { message: String },

    EmitStateChange { state: CaptureState },
}

pub fn transition(state: CaptureState, event: CaptureEvent) -> (CaptureState, Vec<SideEffect>) {
    match (&state, event) {
        // Idle + StartRequested -> Acquiring
        (CaptureState::Idle, CaptureEvent::StartRequested { device_id }) => {
            let new_state = CaptureState::Acquiring {
                requested_at: Instant::now(),
                device_id: device_id.clone(),
            };
            let effects = vec![
                SideEffect::AcquireStream { device_id },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Acquiring + StartRequested for another device -> re-issue the request
        (
            CaptureState::Acquiring {
                device_id: pending, ..
            },
            CaptureEvent::StartRequested {
                device_id: Some(requested),
            },
        ) if pending.as_deref() != Some(requested.as_str()) => {
            let new_state = CaptureState::Acquiring {
                requested_at: Instant::now(),
                device_id: Some(requested.clone()),
            };
            let effects = vec![
                SideEffect::CancelAcquisition,
                SideEffect::AcquireStream {
                    device_id: Some(requested),
                },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Active + StartRequested for another device -> release, then acquire
        (
            CaptureState::Active { device_id, .. },
            CaptureEvent::StartRequested {
                device_id: Some(requested),
            },
        ) if *device_id != requested => {
            let new_state = CaptureState::Acquiring {
                requested_at: Instant::now(),
                device_id: Some(requested.clone()),
            };
            let effects = vec![
                SideEffect::StopSampling,
                SideEffect::ReleaseStream,
                SideEffect::ClearBuffer,
                SideEffect::ClearPreview,
                SideEffect::AcquireStream {
                    device_id: Some(requested),
                },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Acquiring + StreamAcquired -> Active
        (
            CaptureState::Acquiring { .. },
            CaptureEvent::StreamAcquired {
                device_id,
                resolution,
            },
        ) => {
            let new_state = CaptureState::Active {
                started_at: Instant::now(),
                device_id,
                resolution,
            };
            let effects = vec![
                SideEffect::SizeBuffer { resolution },
                SideEffect::BindPreview,
                SideEffect::StartSampling,
                SideEffect::PersistDevice,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Acquiring + AcquisitionFailed -> Idle
        (CaptureState::Acquiring { .. }, CaptureEvent::AcquisitionFailed { error }) => {
            let new_state = CaptureState::Idle;
            let effects = vec![
                SideEffect::ReleaseStream,
                SideEffect::SurfaceError {
                    message: error.readable(),
                },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Acquiring + StopRequested/Teardown -> Idle (cancel before the stream arrives)
        (
            CaptureState::Acquiring { .. },
            CaptureEvent::StopRequested | CaptureEvent::Teardown,
        ) => {
            let new_state = CaptureState::Idle;
            let effects = vec![
                SideEffect::CancelAcquisition,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Active + StopRequested/Teardown -> Idle
        (CaptureState::Active { .. }, CaptureEvent::StopRequested | CaptureEvent::Teardown) => {
            let new_state = CaptureState::Idle;
            let effects = vec![
                SideEffect::StopSampling,
                SideEffect::ReleaseStream,
                SideEffect::ClearBuffer,
                SideEffect::ClearPreview,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Invalid transition: return current state with no effects
        _ => (state, vec![]),
    }
}

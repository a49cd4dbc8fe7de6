//! Device failures that callers need to tell apart.
//!
//! Library functions return [`anyhow::Result`]. Failures
//! that drive recovery decisions carry a [`DeviceError`]
//! inside the [`anyhow::Error`] and can be recovered with
//! [`DeviceError::find`].
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not open control channel {path}")]
    ControlChannelUnavailable {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("control channel used after close")]
    TransportClosed,

    #[error("could not open video device {path}")]
    VideoUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("video device {path} closed during capture")]
    VideoClosed { path: String },

    #[error("failed to capture frame after {attempts} attempts ({delay:?} apart)")]
    CaptureExhausted { attempts: u32, delay: Duration },

    #[error("frame geometry mismatch: expected {expected} bytes, found {found}")]
    FrameGeometry { expected: usize, found: usize },
}

/// How a failure should be treated by the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The camera cannot be driven at all (no control channel,
    /// no video device). Ends the run whatever the failure
    /// policy.
    FatalAtStartup,
    /// Reinitialize or retry; never ends the run.
    RecoverableTransient,
    /// The capture gave up. Ends the run unless the failure
    /// policy skips the cycle.
    FatalPerRun,
}

impl DeviceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeviceError::ControlChannelUnavailable { .. }
            | DeviceError::TransportClosed
            | DeviceError::VideoUnavailable { .. } => ErrorClass::FatalAtStartup,
            DeviceError::VideoClosed { .. } | DeviceError::FrameGeometry { .. } => {
                ErrorClass::RecoverableTransient
            }
            DeviceError::CaptureExhausted { .. } => ErrorClass::FatalPerRun,
        }
    }

    /// Finds the first `DeviceError` in the chain of `err`.
    pub fn find(err: &anyhow::Error) -> Option<&DeviceError> {
        err.downcast_ref::<DeviceError>()
            .or_else(|| err.chain().find_map(|e| e.downcast_ref::<DeviceError>()))
    }

    /// Class of the first `DeviceError` in `err`, if any.
    pub fn classify(err: &anyhow::Error) -> Option<ErrorClass> {
        Self::find(err).map(DeviceError::class)
    }
}

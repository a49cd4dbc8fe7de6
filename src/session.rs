//! The camera as a whole: control channel plus video source.
//!
//! A session moves `Closed → Initializing → Ready`. The video
//! handle is only stored once the full initialization
//! sequence has completed, so a `Ready` session always has a
//! configured camera behind it. When the handle reports that
//! it is no longer open (e.g. after an unplug), the next
//! capture runs the initialization sequence again. A capture
//! that fails drops the handle, so the one after it starts
//! from a fresh initialization.
use std::{thread, time::Duration};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    error::DeviceError,
    protocol::Command,
    radiometry::RawFrame,
    transport::ControlChannel,
    video::{VideoDevice, VideoSource},
};

/// Fixed waits between protocol steps.
///
/// The camera acknowledges nothing we can rely on, so these
/// delays are the only synchronization with its firmware.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// After each initialization command.
    pub command_settle: Duration,
    /// After a manual NUC, before reading the frame.
    pub nuc_settle: Duration,
    /// Between failed frame reads.
    pub retry_delay: Duration,
    /// Total frame reads per capture, including the first.
    pub max_read_attempts: u32,
    /// After re-enabling auto-NUC on close.
    pub restore_settle: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        SessionTiming {
            command_settle: Duration::from_millis(500),
            nuc_settle: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            max_read_attempts: 10,
            restore_settle: Duration::from_secs(1),
        }
    }
}

impl SessionTiming {
    /// No waits at all; for simulated devices.
    pub fn immediate() -> Self {
        SessionTiming {
            command_settle: Duration::from_millis(0),
            nuc_settle: Duration::from_millis(0),
            retry_delay: Duration::from_millis(0),
            restore_settle: Duration::from_millis(0),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Initializing,
    Ready,
}

const INIT_SEQUENCE: [(Command, &str); 3] = [
    (Command::DisableAutoNuc, "disabling auto-NUC"),
    (Command::SelectY16, "selecting Y16 output"),
    (Command::SetHighGain, "selecting high gain"),
];

pub struct CameraSession<C, D: VideoDevice> {
    channel: C,
    device: D,
    video: Option<D::Source>,
    state: SessionState,
    timing: SessionTiming,
    initializations: usize,
}

impl<C: ControlChannel, D: VideoDevice> CameraSession<C, D> {
    /// Creates a `Closed` session. Nothing is sent to the
    /// camera until [`open`](Self::open) or the first capture.
    pub fn new(channel: C, device: D, timing: SessionTiming) -> Self {
        CameraSession {
            channel,
            device,
            video: None,
            state: SessionState::Closed,
            timing,
            initializations: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of completed initialization sequences.
    pub fn initializations(&self) -> usize {
        self.initializations
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.video.as_ref().map_or(false, |v| v.is_open())
    }

    /// Runs the initialization sequence and stores a fresh
    /// video handle. Any previous handle is released first.
    /// On failure the session is left `Closed`.
    pub fn open(&mut self) -> Result<()> {
        self.release_video();
        self.state = SessionState::Initializing;
        info!("initializing camera {}", self.device.name());

        match self.initialize() {
            Ok(source) => {
                self.video = Some(source);
                self.state = SessionState::Ready;
                self.initializations += 1;
                info!("camera ready");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    fn initialize(&mut self) -> Result<D::Source> {
        for &(command, what) in INIT_SEQUENCE.iter() {
            info!("{}", what);
            self.channel
                .send(command)
                .with_context(|| format!("{} failed", what))?;
            thread::sleep(self.timing.command_settle);
        }

        info!("opening video device {}", self.device.name());
        let mut source = self.device.open()?;

        // NUC once and throw the frame away, so the first real
        // capture starts from a settled correction.
        let name = self.device.name();
        if let Err(e) = nuc_and_read(&mut self.channel, &mut source, name, &self.timing) {
            source.release();
            return Err(e.context("initial capture failed"));
        }
        Ok(source)
    }

    /// Reinitializes unless the session is `Ready` with an
    /// open video handle.
    pub fn ensure_ready(&mut self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        if self.state == SessionState::Ready {
            warn!("video device {} closed, reinitializing", self.device.name());
        }
        self.open()
    }

    /// Runs a manual NUC and reads one frame.
    ///
    /// Failed reads are retried (without another NUC) up to
    /// [`SessionTiming::max_read_attempts`] reads in total. If
    /// the video source closes meanwhile, the camera is
    /// initialized again and the capture repeated once.
    ///
    /// On failure the video handle is released and the session
    /// is left `Closed`.
    pub fn capture(&mut self) -> Result<RawFrame> {
        self.ensure_ready()?;

        let outcome = match self.nuc_and_read() {
            Err(e) if is_video_closed(&e) => {
                warn!("{:#}, reinitializing", e);
                self.open().and_then(|_| self.nuc_and_read())
            }
            outcome => outcome,
        };

        if outcome.is_err() {
            self.release_video();
            self.state = SessionState::Closed;
        }
        outcome
    }

    fn nuc_and_read(&mut self) -> Result<RawFrame> {
        let CameraSession {
            channel,
            device,
            video,
            timing,
            ..
        } = self;
        let source = video.as_mut().ok_or_else(|| anyhow::anyhow!("no video source"))?;
        info!("sending NUC command");
        nuc_and_read(channel, source, device.name(), timing)
    }

    /// Re-enables auto-NUC, releases the video source and
    /// hands the control channel back for closing.
    ///
    /// Failing to restore auto-NUC is logged and otherwise
    /// ignored.
    pub fn close(mut self) -> C {
        info!("re-enabling auto-NUC");
        match self.channel.send(Command::EnableAutoNuc) {
            Ok(_) => thread::sleep(self.timing.restore_settle),
            Err(e) => warn!("could not re-enable auto-NUC: {:#}", e),
        }
        self.release_video();
        self.state = SessionState::Closed;
        self.channel
    }

    fn release_video(&mut self) {
        if let Some(mut source) = self.video.take() {
            info!("releasing video device {}", self.device.name());
            source.release();
        }
    }
}

fn is_video_closed(err: &anyhow::Error) -> bool {
    matches!(DeviceError::find(err), Some(DeviceError::VideoClosed { .. }))
}

fn nuc_and_read<C, S>(
    channel: &mut C,
    source: &mut S,
    name: &str,
    timing: &SessionTiming,
) -> Result<RawFrame>
where
    C: ControlChannel,
    S: VideoSource,
{
    channel.send(Command::ManualNuc).context("manual NUC failed")?;
    thread::sleep(timing.nuc_settle);
    read_with_retry(source, name, timing)
}

/// Reads a frame, retrying failed reads while the source
/// stays open.
fn read_with_retry<S: VideoSource>(
    source: &mut S,
    name: &str,
    timing: &SessionTiming,
) -> Result<RawFrame> {
    let attempts = timing.max_read_attempts.max(1);
    let mut attempt = 1;
    loop {
        match source.read_frame() {
            Ok(frame) => {
                debug!("read {:?} frame on attempt {}", frame.dim(), attempt);
                return Ok(frame);
            }
            Err(e) if !source.is_open() => {
                return Err(e.context(DeviceError::VideoClosed { path: name.into() }));
            }
            Err(e) if attempt >= attempts => {
                return Err(e.context(DeviceError::CaptureExhausted {
                    attempts,
                    delay: timing.retry_delay,
                }));
            }
            Err(e) => {
                warn!("frame read {}/{} failed: {:#}", attempt, attempts, e);
                attempt += 1;
                thread::sleep(timing.retry_delay);
            }
        }
    }
}

//! The acquisition loop.
//!
//! Each cycle captures one frame, converts it and hands it to
//! a [`RecordSink`], then waits for the next capture time.
//! Whatever ends the loop (single shot, elapsed run duration,
//! an interrupt, or a failed cycle), the camera session and
//! the control channel are closed exactly once before
//! [`Scheduler::run`] returns.
use std::{
    cmp::min,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use crate::{
    error::{DeviceError, ErrorClass},
    session::CameraSession,
    sink::{CaptureRecord, RecordSink},
    transport::ControlChannel,
    video::VideoDevice,
};

/// Operator-requested shutdown.
///
/// Clones share the same flag. This is the only state that is
/// written from outside the acquisition loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Turns Ctrl-C (SIGINT) into a request to finish the
    /// current cycle and shut down. Can only be installed once
    /// per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, initiating graceful shutdown");
            flag.set();
        })
        .context("installing interrupt handler")
    }
}

/// What to do when a cycle fails after all retries.
///
/// Applies to exhausted captures and failures without a
/// [`DeviceError`]. A recoverable failure (e.g. the video
/// device closing mid-capture) always skips the cycle; a
/// missing control channel or video device always ends the
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// End the run (after closing the devices).
    Abort,
    /// Log it and carry on with the next cycle.
    SkipCycle,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Time from the start of one capture to the next.
    pub interval: Duration,
    /// Stop after this long. `None` runs until interrupted.
    pub run_duration: Option<Duration>,
    /// Capture once and stop; interval and duration are ignored.
    pub single_shot: bool,
    /// Show a countdown to the next capture on the terminal.
    pub countdown: bool,
    /// Granularity of the wait between captures.
    pub poll_step: Duration,
    pub on_capture_failure: FailurePolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            interval: Duration::from_secs(0),
            run_duration: None,
            single_shot: false,
            countdown: false,
            poll_step: Duration::from_millis(500),
            on_capture_failure: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    SingleShot,
    DurationElapsed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub failed_cycles: usize,
    pub exit: ExitReason,
}

pub struct Scheduler {
    config: ScheduleConfig,
    shutdown: ShutdownFlag,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, shutdown: ShutdownFlag) -> Self {
        Scheduler { config, shutdown }
    }

    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    /// Human readable summary of the schedule, e.g.
    /// `Recording data every 15 minutes until 09:30:00 on 17 Oct 2026`.
    pub fn describe(&self) -> String {
        if self.config.single_shot {
            return "Recording data once".into();
        }
        let mut msg = format!("Recording data {}", describe_interval(self.config.interval));
        if let Some(end) = self
            .config
            .run_duration
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| Local::now().checked_add_signed(d))
        {
            msg += &format!(" until {}", end.format("%H:%M:%S on %d %b %Y"));
        }
        msg
    }

    /// Runs cycles until a stop condition, then closes the
    /// session and its control channel.
    ///
    /// A failed cycle (under [`FailurePolicy::Abort`]) is
    /// returned only after the close sequence has run.
    pub fn run<C, D, S>(&self, mut session: CameraSession<C, D>, sink: &mut S) -> Result<RunSummary>
    where
        C: ControlChannel,
        D: VideoDevice,
        S: RecordSink,
    {
        let outcome = self.cycles(&mut session, sink);

        let mut channel = session.close();
        info!("closing control channel");
        let closed = channel.close().context("closing control channel");

        match (outcome, closed) {
            (Ok(summary), Ok(())) => {
                info!(
                    "finished after {} cycles ({:?})",
                    summary.cycles, summary.exit
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(c) = closed {
                    error!("{:#}", c);
                }
                Err(e)
            }
        }
    }

    fn cycles<C, D, S>(&self, session: &mut CameraSession<C, D>, sink: &mut S) -> Result<RunSummary>
    where
        C: ControlChannel,
        D: VideoDevice,
        S: RecordSink,
    {
        let cfg = &self.config;
        let end = if cfg.single_shot {
            None
        } else {
            cfg.run_duration.map(|d| Instant::now() + d)
        };

        let mut cycles = 0;
        let mut failed_cycles = 0;
        let summary = |cycles, failed_cycles, exit| RunSummary {
            cycles,
            failed_cycles,
            exit,
        };

        loop {
            if self.shutdown.is_set() {
                return Ok(summary(cycles, failed_cycles, ExitReason::Interrupted));
            }

            let next_capture = Instant::now() + cfg.interval;
            match self.cycle(session, sink) {
                Ok(()) => cycles += 1,
                Err(e) if self.skips(&e) => {
                    error!("capture cycle failed, skipping: {:#}", e);
                    failed_cycles += 1;
                }
                Err(e) => return Err(e),
            }

            if cfg.single_shot {
                self.shutdown.set();
                return Ok(summary(cycles, failed_cycles, ExitReason::SingleShot));
            }

            if let Some(exit) = self.wait_until(next_capture, end) {
                return Ok(summary(cycles, failed_cycles, exit));
            }
        }
    }

    fn skips(&self, err: &anyhow::Error) -> bool {
        match DeviceError::classify(err) {
            Some(ErrorClass::RecoverableTransient) => true,
            Some(ErrorClass::FatalAtStartup) => false,
            Some(ErrorClass::FatalPerRun) | None => {
                self.config.on_capture_failure == FailurePolicy::SkipCycle
            }
        }
    }

    fn cycle<C, D, S>(&self, session: &mut CameraSession<C, D>, sink: &mut S) -> Result<()>
    where
        C: ControlChannel,
        D: VideoDevice,
        S: RecordSink,
    {
        let timestamp = Local::now();
        session.ensure_ready()?;
        let raw = session.capture()?;
        let record = CaptureRecord::new(timestamp, raw);
        sink.persist(&record)?;
        Ok(())
    }

    /// Waits for `next_capture`. Returns why the run should end
    /// instead, if it should.
    fn wait_until(&self, next_capture: Instant, end: Option<Instant>) -> Option<ExitReason> {
        let bar = if self.config.countdown {
            Some(countdown_bar())
        } else {
            None
        };

        let exit = loop {
            let now = Instant::now();
            if end.map_or(false, |end| now >= end) {
                info!("run duration elapsed");
                self.shutdown.set();
                break Some(ExitReason::DurationElapsed);
            }
            if self.shutdown.is_set() {
                break Some(ExitReason::Interrupted);
            }
            if now >= next_capture {
                break None;
            }

            let remaining = next_capture - now;
            if let Some(bar) = &bar {
                bar.set_message(format!("next capture in {}", format_hms(remaining)));
                bar.tick();
            }
            thread::sleep(min(self.config.poll_step, remaining));
        };

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        exit
    }
}

fn countdown_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}"));
    bar
}

fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    let parts: Vec<String> = [
        (secs / 3600, "hours"),
        (secs / 60 % 60, "minutes"),
        (secs % 60, "seconds"),
    ]
    .iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, unit)| format!("{} {}", n, unit))
    .collect();
    if parts.is_empty() {
        "continuously".into()
    } else {
        format!("every {}", parts.join(" "))
    }
}

/// `H:MM:SS`, rounded up to the next whole second.
fn format_hms(d: Duration) -> String {
    let secs = (d.as_millis() + 999) / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

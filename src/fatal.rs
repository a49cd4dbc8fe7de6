//! What to do when acquisition cannot even start.
use std::{process::Command, thread, time::Duration};

use log::{error, warn};

pub trait FatalHandler {
    /// Reports `err` and returns the exit code the process
    /// should terminate with.
    fn escalate(&self, err: &anyhow::Error) -> i32;
}

/// Logs the full error chain and asks for exit code 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndAbort;

impl FatalHandler for LogAndAbort {
    fn escalate(&self, err: &anyhow::Error) -> i32 {
        error!("fatal: {:#}", err);
        1
    }
}

/// Power-cycles the host after a grace period.
///
/// Meant for unattended field units where a reboot is the
/// only way to get a wedged USB serial adapter back.
#[derive(Debug, Clone)]
pub struct RebootHost {
    pub delay: Duration,
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RebootHost {
    fn default() -> Self {
        RebootHost {
            delay: Duration::from_secs(5),
            program: "sudo".into(),
            args: vec!["reboot".into()],
        }
    }
}

impl FatalHandler for RebootHost {
    fn escalate(&self, err: &anyhow::Error) -> i32 {
        let code = LogAndAbort.escalate(err);
        warn!("rebooting host in {:?}", self.delay);
        thread::sleep(self.delay);
        match Command::new(&self.program).args(&self.args).status() {
            Ok(status) if status.success() => {}
            Ok(status) => error!("reboot command exited with {}", status),
            Err(e) => error!("could not run reboot command: {}", e),
        }
        code
    }
}

mod args;

use std::process;

use anyhow::Result;
use chrono::Local;
use log::info;

use helios::{
    fatal::{FatalHandler, LogAndAbort},
    schedule::{RunSummary, Scheduler, ShutdownFlag},
    session::{CameraSession, SessionTiming},
    sink::FileSink,
    transport::SerialTransport,
    video::V4lDevice,
};

use args::Args;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::from_cmd_line();
    info!("[START] capture at {}", Local::now().to_rfc3339());

    process::exit(exit_code(run(&args), &LogAndAbort));
}

fn run(args: &Args) -> Result<RunSummary> {
    let layout = args.layout();
    layout.create()?;
    let mut sink = FileSink::new(args.sink_config(&layout))?;

    let transport = match SerialTransport::open(args.serial_config()) {
        Ok(transport) => transport,
        Err(e) => process::exit(args.fatal_handler().escalate(&e)),
    };

    let shutdown = ShutdownFlag::new();
    shutdown.install_interrupt_handler()?;

    let scheduler = Scheduler::new(args.schedule_config(), shutdown);
    info!("{}", scheduler.describe());

    let session = CameraSession::new(
        transport,
        V4lDevice::new(args.device.as_str()),
        SessionTiming::default(),
    );
    scheduler.run(session, &mut sink)
}

/// Errors that end a run take the same logged path as
/// startup failures.
fn exit_code(outcome: Result<RunSummary>, handler: &dyn FatalHandler) -> i32 {
    match outcome {
        Ok(summary) => {
            info!(
                "captured {} frames ({} failed cycles)",
                summary.cycles, summary.failed_cycles
            );
            0
        }
        Err(e) => handler.escalate(&e),
    }
}

//! Library to run timed radiometric captures on ICI Helios
//! LWIR cameras.
//!
//! The camera exposes two channels: a serial control
//! channel speaking a small framed command protocol, and a
//! video device delivering 16-bit raw counts. This crate
//! provides:
//!
//! 1. The [control protocol](protocol) and a half-duplex
//! [serial transport](transport::SerialTransport).
//!
//! 2. A [camera session](session::CameraSession) that runs
//! the initialization sequence (manual NUC, Y16 output,
//! high gain), triggers a NUC before every capture, retries
//! failed reads and reinitializes the camera after it was
//! unplugged.
//!
//! 3. Conversion of raw counts to
//! [temperatures](radiometry::TemperatureFrame).
//!
//! 4. An [acquisition loop](schedule::Scheduler) persisting
//! every capture through a [sink](sink::FileSink) as CSV
//! files and a float32 TIFF.
//!
//! # Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "v4l")]
//! # fn test_compile() -> anyhow::Result<()> {
//! use helios::{
//!     schedule::{ScheduleConfig, Scheduler, ShutdownFlag},
//!     session::{CameraSession, SessionTiming},
//!     sink::{FileSink, SinkConfig},
//!     transport::{SerialConfig, SerialTransport},
//!     video::V4lDevice,
//! };
//!
//! let transport = SerialTransport::open(SerialConfig::default())?;
//! let session = CameraSession::new(
//!     transport,
//!     V4lDevice::new("/dev/video0"),
//!     SessionTiming::default(),
//! );
//! let mut sink = FileSink::new(SinkConfig::in_dir("data"))?;
//!
//! let shutdown = ShutdownFlag::new();
//! shutdown.install_interrupt_handler()?;
//! let config = ScheduleConfig {
//!     single_shot: true,
//!     ..Default::default()
//! };
//! Scheduler::new(config, shutdown).run(session, &mut sink)?;
//! # Ok(())
//! # }
//! ```
//!
//! Only converting counts to temperature:
//!
//! ```rust
//! use helios::radiometry::{kelvin_from_raw, TemperatureFrame};
//! use ndarray::arr2;
//!
//! assert!((kelvin_from_raw(8300) - 333.333).abs() < 1e-3);
//! let temps = TemperatureFrame::from_raw(&arr2(&[[8300u16, 9300]]));
//! assert_eq!(temps.celsius[(0, 1)], 400.0 - 273.15);
//! ```

pub mod error;
pub mod fatal;
pub mod protocol;
pub mod radiometry;
pub mod schedule;
pub mod session;
pub mod sink;
pub mod transport;
pub mod video;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::error::DeviceError;
pub use crate::radiometry::{RawFrame, TemperatureFrame};

//! Half-duplex request/reply exchange over the serial
//! control channel.
use std::{
    io::{self, Read, Write},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use serialport::SerialPort;

use crate::{
    error::DeviceError,
    protocol::{is_terminated, Command},
};

/// Settings of the serial control channel.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// Upper bound on waiting for a terminated reply.
    pub read_timeout: Duration,
    /// Log every frame and reply at `info` level.
    pub echo: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            path: "/dev/ttyACM0".into(),
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
            echo: false,
        }
    }
}

/// Something commands can be sent over.
///
/// Exchanges take `&mut self`: there is never more than one
/// request in flight.
pub trait ControlChannel {
    /// Sends `command` and returns whatever reply bytes were
    /// received. The reply may be incomplete if the device
    /// did not terminate it in time.
    fn send(&mut self, command: Command) -> Result<Vec<u8>>;

    /// Releases the channel. Any later `send` fails.
    fn close(&mut self) -> Result<()>;
}

pub struct SerialTransport<P> {
    port: Option<P>,
    config: SerialConfig,
}

impl SerialTransport<Box<dyn SerialPort>> {
    /// Opens the serial port described by `config`.
    ///
    /// Failure is reported as
    /// [`DeviceError::ControlChannelUnavailable`]: without the
    /// control channel nothing can be captured.
    pub fn open(config: SerialConfig) -> Result<Self> {
        let port = serialport::new(config.path.as_str(), config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| DeviceError::ControlChannelUnavailable {
                path: config.path.clone(),
                source,
            })?;
        info!("opened serial port {} at {} baud", config.path, config.baud_rate);
        Ok(Self::from_port(port, config))
    }
}

impl<P: Read + Write> SerialTransport<P> {
    pub fn from_port(port: P, config: SerialConfig) -> Self {
        SerialTransport {
            port: Some(port),
            config,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn log_bytes(&self, dir: &str, bytes: &[u8]) {
        let hex = bytes.iter().format_with("", |b, f| f(&format_args!("{:02x}", b)));
        if self.config.echo {
            info!("{} {}", dir, hex);
        } else {
            trace!("{} {}", dir, hex);
        }
    }
}

impl<P: Read + Write> ControlChannel for SerialTransport<P> {
    fn send(&mut self, command: Command) -> Result<Vec<u8>> {
        let frame = command.frame();
        self.log_bytes("send", frame.as_bytes());

        let timeout = self.config.read_timeout;
        let port = self.port.as_mut().ok_or(DeviceError::TransportClosed)?;
        let reply = exchange(port, frame.as_bytes(), timeout)
            .with_context(|| format!("serial exchange failed for {:?}", command))?;

        self.log_bytes("recv", &reply);
        if !is_terminated(&reply) {
            warn!(
                "reply to {:?} not terminated within {:?} ({} bytes)",
                command,
                timeout,
                reply.len()
            );
        }
        Ok(reply)
    }

    fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(mut port) => {
                port.flush().context("flushing serial port on close")?;
                info!("closed serial port {}", self.config.path);
            }
            None => debug!("serial port {} already closed", self.config.path),
        }
        Ok(())
    }
}

/// Writes `frame` and reads one byte at a time until the end
/// marker arrives or `timeout` elapses.
fn exchange<P: Read + Write>(port: &mut P, frame: &[u8], timeout: Duration) -> io::Result<Vec<u8>> {
    port.flush()?;
    port.write_all(frame)?;
    port.flush()?;

    let deadline = Instant::now() + timeout;
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    while !is_terminated(&reply) && Instant::now() < deadline {
        match port.read(&mut byte) {
            Ok(0) => thread::sleep(Duration::from_millis(10)),
            Ok(_) => reply.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(reply)
}

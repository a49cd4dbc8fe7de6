#![allow(dead_code)]
use std::{cell::RefCell, collections::VecDeque, io, rc::Rc};

use anyhow::{bail, Result};
use ndarray::{arr2, Array2};

use helios::{
    protocol::Command,
    session::SessionTiming,
    transport::ControlChannel,
    video::{VideoDevice, VideoSource},
    DeviceError,
};

pub const INIT_COMMANDS: [Command; 3] = [
    Command::DisableAutoNuc,
    Command::SelectY16,
    Command::SetHighGain,
];

pub fn test_frame() -> Array2<u16> {
    arr2(&[[7300, 7301, 8300], [9300, 0, u16::MAX]])
}

pub fn timing(max_read_attempts: u32) -> SessionTiming {
    SessionTiming {
        max_read_attempts,
        ..SessionTiming::immediate()
    }
}

#[derive(Debug, Default)]
pub struct ChannelLog {
    pub sent: Vec<Command>,
    pub closes: usize,
    pub sends_after_close: usize,
    pub failing: Vec<Command>,
}

/// Records every command; replies with a terminated frame.
#[derive(Clone, Default)]
pub struct MockChannel {
    pub log: Rc<RefCell<ChannelLog>>,
    closed: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Command> {
        self.log.borrow().sent.clone()
    }

    pub fn count(&self, command: Command) -> usize {
        self.log.borrow().sent.iter().filter(|&&c| c == command).count()
    }

    pub fn closes(&self) -> usize {
        self.log.borrow().closes
    }
}

impl ControlChannel for MockChannel {
    fn send(&mut self, command: Command) -> Result<Vec<u8>> {
        let mut log = self.log.borrow_mut();
        if self.closed {
            log.sends_after_close += 1;
            return Err(DeviceError::TransportClosed.into());
        }
        log.sent.push(command);
        if log.failing.contains(&command) {
            bail!("no reply to {:?}", command);
        }
        Ok(vec![0x55, 0xEB, 0xAA])
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.log.borrow_mut().closes += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct VideoLog {
    pub opens: usize,
    pub releases: usize,
    pub reads: usize,
    pub reads_while_released: usize,
    /// Outcome of upcoming reads, `false` fails. Reads succeed
    /// once the script is exhausted.
    pub script: VecDeque<bool>,
    pub refuse_open: bool,
    /// Makes every source opened so far report closed.
    pub unplugged: bool,
    /// Read numbers (1-based, across all sources) that fail
    /// because the camera was unplugged during the read.
    pub unplug_on_reads: Vec<usize>,
}

#[derive(Clone, Default)]
pub struct MockDevice {
    pub log: Rc<RefCell<VideoLog>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: &[bool]) {
        self.log.borrow_mut().script = outcomes.iter().copied().collect();
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.log.borrow_mut().script = std::iter::repeat(false).take(n).collect();
    }

    pub fn unplug_on_reads(&self, reads: &[usize]) {
        self.log.borrow_mut().unplug_on_reads = reads.to_vec();
    }
}

impl VideoDevice for MockDevice {
    type Source = MockSource;

    fn open(&mut self) -> Result<MockSource> {
        let mut log = self.log.borrow_mut();
        if log.refuse_open {
            return Err(DeviceError::VideoUnavailable {
                path: "mock".into(),
                source: io::ErrorKind::NotFound.into(),
            }
            .into());
        }
        log.opens += 1;
        log.unplugged = false;
        Ok(MockSource {
            log: self.log.clone(),
            open: true,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockSource {
    log: Rc<RefCell<VideoLog>>,
    open: bool,
}

impl VideoSource for MockSource {
    fn is_open(&self) -> bool {
        self.open && !self.log.borrow().unplugged
    }

    fn read_frame(&mut self) -> Result<Array2<u16>> {
        let mut log = self.log.borrow_mut();
        log.reads += 1;
        if !self.open {
            log.reads_while_released += 1;
            bail!("source released");
        }
        if log.unplug_on_reads.contains(&log.reads) {
            log.unplugged = true;
            bail!("device vanished");
        }
        match log.script.pop_front() {
            Some(false) => bail!("no frame"),
            _ => Ok(test_frame()),
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.log.borrow_mut().releases += 1;
        }
    }
}

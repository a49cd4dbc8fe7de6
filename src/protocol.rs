//! Framing of the camera's serial control protocol.
//!
//! Every command travels in a frame of the form:
//!
//! - 0x0: start marker `0xAA`
//! - 0x1: length = 1 (start marker) + command length
//! - 0x2..: command bytes
//! - checksum: sum of every preceding byte, mod 256
//! - end marker `0xEB 0xAA`
//!
//! Marker bytes inside a command are not escaped. This is
//! only sound because the set of commands is closed (see
//! [`Command`]) and none of them contains the end marker.
//! Do not feed arbitrary payloads through [`encode`].

pub const START_MARKER: [u8; 1] = [0xAA];
pub const END_MARKER: [u8; 2] = [0xEB, 0xAA];

/// The commands this crate knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Switch the camera to manual-only NUC. The camera
    /// forgets this setting when it is unplugged.
    DisableAutoNuc,
    EnableAutoNuc,
    /// Run one non-uniformity correction now.
    ManualNuc,
    /// Deliver Y16 (16-bit linear) frames. Without it the
    /// camera reports implausibly hot scenes (>1700K).
    SelectY16,
    /// High sensitivity gain. Without it raw counts sit
    /// below ~400 and temperatures read far too cold.
    SetHighGain,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::DisableAutoNuc,
        Command::EnableAutoNuc,
        Command::ManualNuc,
        Command::SelectY16,
        Command::SetHighGain,
    ];

    pub fn payload(self) -> &'static [u8] {
        match self {
            Command::DisableAutoNuc => &[0x00, 0x15, 0x01, 0x00],
            Command::EnableAutoNuc => &[0x00, 0x15, 0x01, 0x01],
            Command::ManualNuc => &[0x00, 0x16, 0x01, 0x00],
            Command::SelectY16 => &[0x01, 0x5D, 0x02, 0x02, 0x00],
            Command::SetHighGain => &[0x07, 0x01, 0x01, 0x00],
        }
    }

    pub fn frame(self) -> CommandFrame {
        CommandFrame(encode(self.payload()))
    }
}

/// An encoded command, ready to be written to the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(Vec<u8>);

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len_field(&self) -> u8 {
        self.0[START_MARKER.len()]
    }

    pub fn checksum(&self) -> u8 {
        self.0[self.0.len() - END_MARKER.len() - 1]
    }
}

pub(crate) fn encode(command: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(START_MARKER.len() + command.len() + 4);
    frame.extend_from_slice(&START_MARKER);
    frame.push((START_MARKER.len() + command.len()) as u8);
    frame.extend_from_slice(command);

    let checksum = frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame.push(checksum);
    frame.extend_from_slice(&END_MARKER);
    frame
}

/// Whether a reply buffer ends with the end marker.
pub fn is_terminated(buf: &[u8]) -> bool {
    buf.ends_with(&END_MARKER)
}

//! The video channel: where raw frames come from.
//!
//! A [`VideoDevice`] knows how to open (and configure) a
//! [`VideoSource`]; the session reopens it whenever the
//! source reports that it is no longer open, e.g. after the
//! camera was unplugged.
use anyhow::Result;
use byteordered::ByteOrdered;
use ndarray::Array2;

use crate::{error::DeviceError, radiometry::RawFrame};

/// An open handle delivering single-channel 16-bit frames.
pub trait VideoSource {
    fn is_open(&self) -> bool;

    /// Reads the next frame. A failure leaves the source in
    /// place; callers may retry or check [`is_open`].
    ///
    /// [`is_open`]: VideoSource::is_open
    fn read_frame(&mut self) -> Result<RawFrame>;

    fn release(&mut self);
}

pub trait VideoDevice {
    type Source: VideoSource;

    /// Opens the device and configures it for Y16 delivery
    /// without any colour conversion.
    fn open(&mut self) -> Result<Self::Source>;

    fn name(&self) -> &str;
}

/// Decodes a little-endian Y16 buffer with `stride` bytes
/// per line into a `(height, width)` frame.
pub fn decode_y16(buf: &[u8], width: usize, height: usize, stride: usize) -> Result<RawFrame> {
    let stride = stride.max(2 * width);
    let expected = stride * height.saturating_sub(1) + 2 * width;
    if buf.len() < expected || width == 0 || height == 0 {
        return Err(DeviceError::FrameGeometry {
            expected,
            found: buf.len(),
        }
        .into());
    }

    let mut data = Vec::with_capacity(width * height);
    for line in buf.chunks(stride).take(height) {
        let mut rdr = ByteOrdered::le(&line[..2 * width]);
        for _ in 0..width {
            data.push(rdr.read_u16()?);
        }
    }
    Ok(Array2::from_shape_vec((height, width), data)?)
}

#[cfg(feature = "v4l")]
pub use self::v4l2::{V4lDevice, V4lSource};

#[cfg(feature = "v4l")]
mod v4l2 {
    use std::path::Path;

    use anyhow::{bail, ensure, Context, Result};
    use log::{debug, info, warn};
    use v4l::{
        buffer::Type,
        io::{mmap::Stream, traits::CaptureStream},
        video::Capture,
        Device, FourCC,
    };

    use super::{decode_y16, VideoDevice, VideoSource};
    use crate::{error::DeviceError, radiometry::RawFrame};

    const Y16: &[u8; 4] = b"Y16 ";
    const BUFFER_COUNT: u32 = 4;

    /// A V4L2 capture node such as `/dev/video0`.
    #[derive(Debug, Clone)]
    pub struct V4lDevice {
        path: String,
    }

    impl V4lDevice {
        pub fn new<S: Into<String>>(path: S) -> Self {
            V4lDevice { path: path.into() }
        }
    }

    impl VideoDevice for V4lDevice {
        type Source = V4lSource;

        fn open(&mut self) -> Result<V4lSource> {
            let device =
                Device::with_path(&self.path).map_err(|source| DeviceError::VideoUnavailable {
                    path: self.path.clone(),
                    source,
                })?;

            let mut format = device.format().context("reading video format")?;
            format.fourcc = FourCC::new(Y16);
            let format = device
                .set_format(&format)
                .context("requesting Y16 video format")?;
            ensure!(
                format.fourcc == FourCC::new(Y16),
                "{} refused Y16 delivery (offered {})",
                self.path,
                format.fourcc
            );
            info!(
                "opened {} as {}x{} Y16 (stride {})",
                self.path, format.width, format.height, format.stride
            );

            let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .context("mapping capture buffers")?;

            Ok(V4lSource {
                path: self.path.clone(),
                width: format.width as usize,
                height: format.height as usize,
                stride: format.stride as usize,
                stream: Some(stream),
                device: Some(device),
            })
        }

        fn name(&self) -> &str {
            &self.path
        }
    }

    pub struct V4lSource {
        path: String,
        width: usize,
        height: usize,
        stride: usize,
        stream: Option<Stream<'static>>,
        device: Option<Device>,
    }

    impl VideoSource for V4lSource {
        fn is_open(&self) -> bool {
            self.stream.is_some() && Path::new(&self.path).exists()
        }

        fn read_frame(&mut self) -> Result<RawFrame> {
            let (width, height, stride) = (self.width, self.height, self.stride);
            let next = match self.stream.as_mut() {
                Some(stream) => stream.next().map(|(buf, meta)| {
                    debug!("frame #{} ({} bytes)", meta.sequence, meta.bytesused);
                    decode_y16(buf, width, height, stride)
                }),
                None => bail!("{} is released", self.path),
            };

            match next {
                Ok(frame) => frame,
                Err(e) => {
                    if !Path::new(&self.path).exists() {
                        warn!("{} disappeared", self.path);
                        self.release();
                    }
                    Err(e).with_context(|| format!("reading frame from {}", self.path))
                }
            }
        }

        fn release(&mut self) {
            self.stream.take();
            if self.device.take().is_some() {
                info!("released {}", self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_rows() {
        let buf = [0x01, 0x00, 0x00, 0x01, 0x34, 0x12, 0xFF, 0xFF];
        let frame = decode_y16(&buf, 2, 2, 4).unwrap();
        assert_eq!(frame, ndarray::arr2(&[[1u16, 256], [0x1234, u16::MAX]]));
    }

    #[test]
    fn skips_line_padding() {
        // one padding byte pair at the end of each line
        let buf = [0x02, 0x00, 0xAA, 0xAA, 0x03, 0x00, 0xAA, 0xAA];
        let frame = decode_y16(&buf, 1, 2, 4).unwrap();
        assert_eq!(frame, ndarray::arr2(&[[2u16], [3]]));
    }

    #[test]
    fn short_buffer_is_a_geometry_error() {
        let err = decode_y16(&[0u8; 6], 2, 2, 4).unwrap_err();
        assert!(matches!(
            DeviceError::find(&err),
            Some(DeviceError::FrameGeometry {
                expected: 8,
                found: 6
            })
        ));
    }
}

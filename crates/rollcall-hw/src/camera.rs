//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use image::RgbImage;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Number of driver buffers queued for streaming capture.
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

/// Anything that yields frames until it is exhausted or fails.
///
/// A read error means the source is no longer usable.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 buffer I/O method used for streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureBackend {
    /// Driver-allocated buffers mapped into the process.
    #[default]
    Mmap,
    /// Application-allocated buffers handed to the driver.
    Userptr,
}

impl FromStr for CaptureBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "mmap" | "" => Ok(Self::Mmap),
            "userptr" => Ok(Self::Userptr),
            other => Err(format!("unknown capture backend {other:?} (expected default, mmap or userptr)")),
        }
    }
}

impl std::fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmap => f.write_str("mmap"),
            Self::Userptr => f.write_str("userptr"),
        }
    }
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// Motion JPEG, one compressed image per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"RGB3" => Some(Self::Rgb3),
            b"MJPG" => Some(Self::Mjpeg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    /// Convert one raw driver buffer to an RGB image.
    fn to_rgb(self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
        let data = match self {
            Self::Mjpeg => return frame::mjpeg_to_rgb(buf),
            Self::Yuyv => frame::yuyv_to_rgb(buf, width, height)?,
            Self::Rgb3 => frame::rgb24(buf, width, height)?,
            Self::Grey => frame::grey_to_rgb(buf, width, height)?,
        };
        RgbImage::from_raw(width, height, data).ok_or(FrameError::Dimensions { width, height })
    }
}

enum Stream {
    Mmap(MmapStream<'static>),
    Userptr(UserptrStream),
}

/// Streaming V4L2 camera. The stream is stopped and the device released on drop.
pub struct Camera {
    stream: Stream,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pub backend: CaptureBackend,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Path of the V4L2 node for a device index.
    pub fn device_path(index: u32) -> String {
        format!("/dev/video{index}")
    }

    /// Open the camera at `index` and start streaming with `backend`.
    pub fn open_index(index: u32, backend: CaptureBackend) -> Result<Self, CameraError> {
        Self::open(&Self::device_path(index), backend)
    }

    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and start streaming.
    pub fn open(device_path: &str, backend: CaptureBackend) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let cap_flags = caps.capabilities;
        if !cap_flags.contains(v4l::capability::Flags::VIDEO_CAPTURE)
            || !cap_flags.contains(v4l::capability::Flags::STREAMING)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Keep the driver's resolution; ask for YUYV and accept whatever
        // supported format the driver settles on.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, RGB3, MJPG, or GREY)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            %backend,
            "negotiated format"
        );

        let stream = match backend {
            CaptureBackend::Mmap => {
                MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
                    .map(Stream::Mmap)
            }
            CaptureBackend::Userptr => {
                UserptrStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
                    .map(Stream::Userptr)
            }
        }
        .map_err(|e| CameraError::CaptureFailed(format!("failed to create {backend} stream: {e}")))?;

        Ok(Self {
            stream,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            backend,
            pixel_format,
        })
    }

    /// Capture a single frame, converting it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (width, height, pixel_format) = (self.width, self.height, self.pixel_format);

        let (buf, meta) = match &mut self.stream {
            Stream::Mmap(s) => s.next(),
            Stream::Userptr(s) => s.next(),
        }
        .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let sequence = meta.sequence;
        let image = pixel_format.to_rgb(buf, width, height)?;

        Ok(Frame { image, sequence })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for index in 0..16u32 {
            let path = Self::device_path(index);
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                index,
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("default".parse::<CaptureBackend>().unwrap(), CaptureBackend::Mmap);
        assert_eq!("MMAP".parse::<CaptureBackend>().unwrap(), CaptureBackend::Mmap);
        assert_eq!(" userptr ".parse::<CaptureBackend>().unwrap(), CaptureBackend::Userptr);
        assert!("dshow".parse::<CaptureBackend>().is_err());
    }

    #[test]
    fn test_device_path() {
        assert_eq!(Camera::device_path(2), "/dev/video2");
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_pixel_format_grey_to_rgb() {
        let img = PixelFormat::Grey.to_rgb(&[5, 6, 7, 8], 2, 2).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [8, 8, 8]);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/does-not-exist-rollcall", CaptureBackend::Mmap)
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}

//! rollcall-hw: Hardware abstraction for camera capture.
//!
//! Provides V4L2-based streaming capture with selectable buffer I/O and
//! conversion of the negotiated pixel format to RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CaptureBackend, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{downscale, Frame, FrameError};

//! V4L2 camera capture via the `v4l` crate.

use crate::devices::get_usb_ids;
use glance_core::frame::{self, Frame};
use glance_core::CameraError;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Frame size requested when the caller has no preference.
pub const DEFAULT_FRAME_SIZE: (u32, u32) = (640, 480);

/// Buffers queued with the driver while streaming.
const CAPTURE_BUFFERS: u32 = 4;

/// Highest `/dev/videoN` index scanned during discovery.
pub const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("access to {0} denied")]
    PermissionDenied(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("{0} does not support video capture")]
    StreamingNotSupported(String),
}

impl From<DeviceError> for CameraError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(_) => CameraError::PermissionDenied(err.to_string()),
            DeviceError::CaptureFailed(_) => CameraError::CaptureFailed(err.to_string()),
            DeviceError::DeviceNotFound(_)
            | DeviceError::DeviceBusy(_)
            | DeviceError::FormatNegotiationFailed(_)
            | DeviceError::StreamingNotSupported(_) => {
                CameraError::DeviceUnavailable(err.to_string())
            }
        }
    }
}

/// Map an OS error from opening a device node to a [`DeviceError`].
pub(crate) fn classify_open_error(device_path: &str, err: &io::Error) -> DeviceError {
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => {
            DeviceError::PermissionDenied(device_path.to_string())
        }
        Some(libc::EBUSY) => DeviceError::DeviceBusy(device_path.to_string()),
        _ => DeviceError::DeviceNotFound(format!("{device_path}: {err}")),
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
    /// USB vendor:product, when the device sits on USB.
    pub usb_ids: Option<(u16, u16)>,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// An open V4L2 capture device. Dropping it closes the device node.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub name: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    ///
    /// `frame_size` is a hint; the driver picks the nearest size it supports.
    pub fn open(device_path: &str, frame_size: Option<(u32, u32)>) -> Result<Self, DeviceError> {
        if !Path::new(device_path).exists() {
            return Err(DeviceError::DeviceNotFound(device_path.to_string()));
        }

        let device =
            Device::with_path(device_path).map_err(|e| classify_open_error(device_path, &e))?;

        let caps = device.query_caps().map_err(|e| {
            DeviceError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(DeviceError::StreamingNotSupported(device_path.to_string()));
        }

        let (width, height) = frame_size.unwrap_or(DEFAULT_FRAME_SIZE);
        let mut fmt = device.format().map_err(|e| {
            DeviceError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            DeviceError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            DeviceError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "opened camera"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            name: caps.card,
            fourcc,
            pixel_format,
        })
    }

    /// Map capture buffers for this device. Streaming starts on the first
    /// dequeue and stops when the stream is dropped.
    fn mmap_stream(&self) -> Result<MmapStream<'static>, DeviceError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, CAPTURE_BUFFERS)
            .map_err(|e| DeviceError::CaptureFailed(format!("failed to create mmap stream: {e}")))
    }

    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(DeviceError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
        };
        converted.map_err(|e| DeviceError::CaptureFailed(format!("{:?}: {e}", self.pixel_format)))
    }

    /// List available V4L2 video capture devices in node order.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..MAX_VIDEO_NODES {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let dev = match Device::with_path(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    tracing::debug!(device = %path, error = %e, "skipping unopenable node");
                    continue;
                }
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            let usb_ids = get_usb_ids(&path);
            devices.push(DeviceInfo {
                path,
                name: caps.card,
                driver: caps.driver,
                bus: caps.bus,
                usb_ids,
            });
        }

        devices
    }
}

/// A camera that is streaming. The buffers stay mapped and queued between
/// frames, so each read is a single dequeue rather than a stream restart.
pub struct LiveCapture {
    // Declared first so STREAMOFF and unmapping happen before the node closes.
    stream: MmapStream<'static>,
    camera: Camera,
}

impl LiveCapture {
    pub fn start(camera: Camera) -> Result<Self, DeviceError> {
        let stream = camera.mmap_stream()?;
        Ok(Self { stream, camera })
    }

    /// Dequeue the next frame, converting to grayscale. Blocks until the
    /// driver delivers one.
    pub fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| DeviceError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let gray = self.camera.buf_to_grayscale(buf)?;
        Ok(Frame::from_gray(
            gray,
            self.camera.width,
            self.camera.height,
            meta.sequence,
        ))
    }
}

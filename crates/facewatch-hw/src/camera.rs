//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use crate::frame_source::FrameGrabber;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("camera read failed: {0}")]
    CaptureFailed(String),
    #[error("camera is in use by another process")]
    DeviceBusy,
    #[error("cannot agree on a capture format: {0}")]
    FormatNegotiationFailed(String),
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("camera read timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A V4L2 node that can capture video.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    /// Card name reported by the driver.
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted with BT.601.
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit grayscale, replicated to three channels.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// Requested capture parameters. The driver may negotiate a different size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    /// Depth of the mmap buffer queue.
    pub buffers: u32,
    /// Upper bound on a single dequeue.
    pub read_timeout: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            buffers: 2,
            read_timeout: Duration::from_secs(2),
        }
    }
}

/// Accept a bare index (`"1"`) or a device path.
pub fn resolve_device(spec: &str) -> String {
    let spec = spec.trim();
    if !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{spec}")
    } else {
        spec.to_string()
    }
}

/// Open V4L2 capture device with a running mmap stream.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    read_timeout: Duration,
}

impl Camera {
    /// Open a V4L2 camera by index or path (e.g. "0" or "/dev/video2").
    pub fn open(device: &str, settings: &CameraSettings) -> Result<Self, CameraError> {
        let device_path = resolve_device(device);
        let (device, info) = probe(&device_path)?;
        tracing::info!(device = %info.path, card = %info.name, driver = %info.driver, "opened camera");

        // YUYV is preferred; drivers that cannot deliver it at this size
        // usually fall back to MJPG.
        let mut requested = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("query: {e}")))?;
        requested.fourcc = FourCC::new(b"YUYV");
        requested.width = settings.width;
        requested.height = settings.height;
        let format = device
            .set_format(&requested)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("set: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "driver offered {:?}, supported are YUYV, MJPG and GREY",
                format.fourcc
            ))
        })?;
        tracing::info!(
            width = format.width,
            height = format.height,
            fourcc = ?format.fourcc,
            buffers = settings.buffers,
            "capture format"
        );

        let mut stream =
            MmapStream::with_buffers(&device, BufType::VideoCapture, settings.buffers.max(1))
                .map_err(|e| CameraError::CaptureFailed(format!("mmap stream: {e}")))?;
        stream.set_timeout(settings.read_timeout);

        Ok(Self {
            stream,
            width: format.width,
            height: format.height,
            device_path,
            fourcc: format.fourcc,
            pixel_format,
            read_timeout: settings.read_timeout,
        })
    }

    /// Dequeue the next buffer and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self.stream.next().map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                CameraError::Timeout(self.read_timeout)
            } else {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            }
        })?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let data = &buf[..used];

        let image = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(data, self.width, self.height)?,
            PixelFormat::Grey => frame::grey_to_rgb(data, self.width, self.height)?,
            PixelFormat::Mjpeg => frame::decode_mjpeg(data)?,
        };

        Ok(Frame::new(image, meta.sequence))
    }

    /// Capture-capable nodes among `/dev/video0` to `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| probe(&path).ok().map(|(_, info)| info))
            .collect()
    }
}

/// Open `path` and check that it captures video.
fn probe(path: &str) -> Result<(Device, DeviceInfo), CameraError> {
    if !Path::new(path).exists() {
        return Err(CameraError::DeviceNotFound(path.to_string()));
    }
    let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
        Some(16) => CameraError::DeviceBusy,
        _ => CameraError::DeviceNotFound(format!("{path}: {e}")),
    })?;
    let caps = device
        .query_caps()
        .map_err(|e| CameraError::CaptureFailed(format!("{path}: capabilities: {e}")))?;
    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        return Err(CameraError::NotCaptureDevice(path.to_string()));
    }
    let info = DeviceInfo {
        path: path.to_string(),
        name: caps.card,
        driver: caps.driver,
        bus: caps.bus,
    };
    Ok((device, info))
}

impl FrameGrabber for Camera {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device() {
        assert_eq!(resolve_device("0"), "/dev/video0");
        assert_eq!(resolve_device(" 12 "), "/dev/video12");
        assert_eq!(resolve_device("/dev/video3"), "/dev/video3");
        assert_eq!(resolve_device(""), "");
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), None);
    }

    #[test]
    fn test_missing_device() {
        let err = Camera::open("/dev/definitely-not-a-camera", &CameraSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}

//! facewatch-hw: hardware side of the watch loop.
//!
//! V4L2 webcam capture, a latest-frame capture thread, and monitor geometry.

pub mod camera;
pub mod frame;
pub mod frame_source;
pub mod monitor;

pub use camera::{Camera, CameraError, CameraSettings, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use frame_source::{FrameGrabber, FrameSource, SourceState};
pub use monitor::{list_monitors, select_monitor, Monitor, MonitorError};

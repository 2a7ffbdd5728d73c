//! facewatch-ui: preview annotation and the transparent monitor overlay.

pub mod compositor;
pub mod window;

pub use compositor::{load_font, Compositor, OverlayGeometry, RenderError, DEFAULT_PADDING, KEY_COLOR};
pub use window::{OverlayWindow, PreviewWindow};

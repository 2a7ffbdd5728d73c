//! Detection drawing for the preview frame and the monitor overlay.

use ab_glyph::{FontVec, PxScale};
use facewatch_core::{Detection, FaceRect};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size, Canvas};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overlay pixels with this value are see-through.
pub const KEY_COLOR: Rgba<u8> = Rgba([255, 255, 255, 0]);
pub const DEFAULT_PADDING: i32 = 20;
/// Height of the filled label bar on the preview.
pub const LABEL_BAR_HEIGHT: i32 = 35;

const RED: [u8; 3] = [255, 0, 0];
const WHITE: [u8; 3] = [255, 255, 255];
const TEXT_SCALE: f32 = 24.0;
const TEXT_INSET: i32 = 6;
/// Overlay label box margins around the text.
const LABEL_PAD_X: i32 = 3;
const LABEL_PAD_Y: i32 = 5;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid font file: {0}")]
    FontParse(PathBuf),
    #[error("window: {0}")]
    Window(String),
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    let data = std::fs::read(path).map_err(|source| RenderError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(data).map_err(|_| RenderError::FontParse(path.to_path_buf()))
}

/// Camera-to-monitor mapping for overlay rectangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub camera_width: u32,
    pub camera_height: u32,
    pub monitor_width: u32,
    pub monitor_height: u32,
    /// Pixels added on every side of a mapped rectangle.
    pub padding: i32,
}

impl OverlayGeometry {
    fn scale(&self) -> (f32, f32) {
        (
            self.monitor_width as f32 / self.camera_width.max(1) as f32,
            self.monitor_height as f32 / self.camera_height.max(1) as f32,
        )
    }

    /// Map a camera-frame rectangle to monitor coordinates, grown by
    /// `padding` on every side.
    ///
    /// `offset` is the preview window position relative to the monitor origin.
    pub fn map_rect(&self, rect: FaceRect, offset: (i32, i32)) -> FaceRect {
        let r = self.scale_rect(rect, offset);
        FaceRect {
            top: r.top - self.padding,
            right: r.right + self.padding,
            bottom: r.bottom + self.padding,
            left: r.left - self.padding,
        }
    }

    /// Scaled and offset, without padding.
    fn scale_rect(&self, rect: FaceRect, offset: (i32, i32)) -> FaceRect {
        let (sx, sy) = self.scale();
        let (ox, oy) = offset;
        let x = |v: i32| (v as f32 * sx).round() as i32 + ox;
        let y = |v: i32| (v as f32 * sy).round() as i32 + oy;
        FaceRect {
            top: y(rect.top),
            right: x(rect.right),
            bottom: y(rect.bottom),
            left: x(rect.left),
        }
    }
}

pub struct Compositor {
    font: Option<FontVec>,
    geometry: OverlayGeometry,
}

impl Compositor {
    pub fn new(font: Option<FontVec>, geometry: OverlayGeometry) -> Self {
        if font.is_none() {
            tracing::warn!("no font loaded, labels will not be drawn");
        }
        Self { font, geometry }
    }

    /// Draw each detection onto the camera frame in place.
    pub fn annotate_preview(&self, frame: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            let r = detection.rect;
            outline(frame, r, Rgb(RED));
            if let Some(bar) = rect(r.left, r.bottom - LABEL_BAR_HEIGHT, r.width(), LABEL_BAR_HEIGHT) {
                draw_filled_rect_mut(frame, bar, Rgb(RED));
            }
            if let Some(font) = &self.font {
                let (_, th) = text_size(PxScale::from(TEXT_SCALE), font, &detection.label);
                let top = r.bottom - TEXT_INSET - th as i32;
                draw_text_mut(
                    frame,
                    Rgb(WHITE),
                    r.left + TEXT_INSET,
                    top,
                    PxScale::from(TEXT_SCALE),
                    font,
                    &detection.label,
                );
            }
        }
    }

    /// Render a fresh monitor-sized overlay for `detections`.
    ///
    /// Each face gets a padded outline, with the label box inside it at the
    /// bottom-left corner of the unpadded face. Everything else is
    /// [`KEY_COLOR`].
    pub fn compose_overlay(&self, detections: &[Detection], offset: (i32, i32)) -> RgbaImage {
        let g = &self.geometry;
        let mut overlay = RgbaImage::from_pixel(g.monitor_width, g.monitor_height, KEY_COLOR);

        for detection in detections {
            outline(&mut overlay, g.map_rect(detection.rect, offset), Rgba([RED[0], RED[1], RED[2], 255]));

            let face = g.scale_rect(detection.rect, offset);
            let (tw, th) = self.label_size(&detection.label);
            let (tw, th) = (tw as i32, th as i32);
            let label_top = face.bottom - th - 2 * LABEL_PAD_Y;
            if let Some(label_box) = rect(face.left, label_top, tw + 2 * LABEL_PAD_X, th + 2 * LABEL_PAD_Y) {
                draw_filled_rect_mut(&mut overlay, label_box, Rgba([RED[0], RED[1], RED[2], 255]));
            }
            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut overlay,
                    Rgba([WHITE[0], WHITE[1], WHITE[2], 255]),
                    face.left + LABEL_PAD_X,
                    label_top + LABEL_PAD_Y,
                    PxScale::from(TEXT_SCALE),
                    font,
                    &detection.label,
                );
            }
        }
        overlay
    }

    fn label_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(TEXT_SCALE), font, label),
            None => (label.chars().count() as u32 * 7, 11),
        }
    }
}

fn rect(x: i32, y: i32, width: i32, height: i32) -> Option<Rect> {
    (width > 0 && height > 0).then(|| Rect::at(x, y).of_size(width as u32, height as u32))
}

/// 2-px outline drawn inward from `r`.
fn outline<C: Canvas>(canvas: &mut C, r: FaceRect, color: C::Pixel) {
    for inset in 0..2 {
        let w = r.width() - 2 * inset;
        let h = r.height() - 2 * inset;
        if let Some(border) = rect(r.left + inset, r.top + inset, w, h) {
            draw_hollow_rect_mut(canvas, border, color);
        }
    }
}

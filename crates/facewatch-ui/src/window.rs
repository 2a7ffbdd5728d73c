//! `minifb` windows: the camera preview and the monitor overlay.

use crate::compositor::RenderError;
use facewatch_hw::Monitor;
use image::{RgbImage, RgbaImage};
use minifb::{Key, Window, WindowOptions};

/// Pack RGB pixels as `0x00RRGGBB`.
pub fn pack_rgb(image: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        image
            .pixels()
            .map(|p| (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32),
    );
}

/// Pack RGBA pixels as `0xAARRGGBB`, keeping alpha for transparent windows.
pub fn pack_rgba(image: &RgbaImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(image.pixels().map(|p| {
        (p[3] as u32) << 24 | (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32
    }));
}

fn window_err(e: minifb::Error) -> RenderError {
    RenderError::Window(e.to_string())
}

/// Titled window showing the annotated camera frame.
pub struct PreviewWindow {
    window: Window,
    buffer: Vec<u32>,
}

impl PreviewWindow {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, RenderError> {
        let window = Window::new(title, width as usize, height as usize, WindowOptions::default())
            .map_err(window_err)?;
        Ok(Self {
            window,
            buffer: Vec::new(),
        })
    }

    pub fn show(&mut self, frame: &RgbImage) -> Result<(), RenderError> {
        pack_rgb(frame, &mut self.buffer);
        self.window
            .update_with_buffer(&self.buffer, frame.width() as usize, frame.height() as usize)
            .map_err(window_err)
    }

    /// Top-left corner on the virtual screen.
    pub fn position(&self) -> (i32, i32) {
        let (x, y) = self.window.get_position();
        (x as i32, y as i32)
    }

    /// `q`, `Esc`, or the window was closed.
    pub fn quit_requested(&self) -> bool {
        !self.window.is_open()
            || self.window.is_key_down(Key::Q)
            || self.window.is_key_down(Key::Escape)
    }
}

/// Borderless, topmost, transparent window covering one monitor.
pub struct OverlayWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl OverlayWindow {
    pub fn new(monitor: &Monitor) -> Result<Self, RenderError> {
        let (width, height) = (monitor.width as usize, monitor.height as usize);
        let options = WindowOptions {
            borderless: true,
            title: false,
            topmost: true,
            transparency: true,
            ..WindowOptions::default()
        };
        let mut window = Window::new("facewatch overlay", width, height, options).map_err(window_err)?;
        window.set_position(monitor.x as isize, monitor.y as isize);

        tracing::info!(
            monitor = %monitor.name,
            x = monitor.x,
            y = monitor.y,
            width,
            height,
            "overlay window opened"
        );

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    /// Replace the displayed overlay. `overlay` must be monitor-sized.
    pub fn show(&mut self, overlay: &RgbaImage) -> Result<(), RenderError> {
        if (overlay.width() as usize, overlay.height() as usize) != (self.width, self.height) {
            return Err(RenderError::Window(format!(
                "overlay is {}x{}, window is {}x{}",
                overlay.width(),
                overlay.height(),
                self.width,
                self.height
            )));
        }
        pack_rgba(overlay, &mut self.buffer);
        self.refresh()
    }

    /// Present the last overlay again and pump window events.
    pub fn refresh(&mut self) -> Result<(), RenderError> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(window_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::KEY_COLOR;
    use image::{Rgb, Rgba};

    #[test]
    fn test_pack_rgb() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([0x12, 0x34, 0x56]));
        image.put_pixel(1, 0, Rgb([255, 0, 0]));
        let mut out = vec![7; 10];
        pack_rgb(&image, &mut out);
        assert_eq!(out, vec![0x0012_3456, 0x00FF_0000]);
    }

    #[test]
    fn test_pack_rgba_keeps_alpha() {
        let mut image = RgbaImage::from_pixel(2, 1, KEY_COLOR);
        image.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        pack_rgba(&image, &mut out);
        assert_eq!(out, vec![0x00FF_FFFF, 0xFFFF_0000]);
    }
}

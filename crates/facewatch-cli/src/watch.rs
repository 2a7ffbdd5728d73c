use crate::config::Config;
use anyhow::{bail, Context, Result};
use facewatch_core::{EncodingCache, KnownFaces, MatchLoop, OnnxPipeline, ARCFACE_ENCODING_DIM};
use facewatch_hw::{Camera, FrameSource, Monitor};
use facewatch_ui::{load_font, Compositor, OverlayGeometry, OverlayWindow, PreviewWindow};

const PREVIEW_TITLE: &str = "facewatch";

/// A failure streak is re-reported every this many frames.
const FAILURE_REPORT_EVERY: u64 = 100;

/// Collapses runs of per-frame processing errors into a few log lines.
#[derive(Debug, Default)]
struct FailureLog {
    streak: u64,
    last_error: Option<String>,
}

impl FailureLog {
    /// Record a failed frame. Returns true when it should be logged: the
    /// first failure of a streak, a changed error message, or every
    /// [`FAILURE_REPORT_EVERY`]th repeat.
    fn failed(&mut self, error: &str) -> bool {
        self.streak += 1;
        let changed = self.last_error.as_deref() != Some(error);
        if changed {
            self.last_error = Some(error.to_string());
        }
        changed || self.streak % FAILURE_REPORT_EVERY == 0
    }

    /// Record a successful frame. Returns the length of the streak it ended.
    fn succeeded(&mut self) -> Option<u64> {
        self.last_error = None;
        match std::mem::take(&mut self.streak) {
            0 => None,
            n => Some(n),
        }
    }
}

fn resolve_monitor(config: &Config) -> Result<Monitor> {
    if let Some(pinned) = config.overlay.geometry {
        return Ok(pinned.to_monitor());
    }
    let monitors = facewatch_hw::list_monitors().context("querying monitors")?;
    Ok(facewatch_hw::select_monitor(&monitors, config.overlay.monitor)?)
}

pub fn run(config: &Config) -> Result<()> {
    let cache = EncodingCache::load(&config.cache_path)
        .with_context(|| format!("loading {}", config.cache_path.display()))?;
    let known = KnownFaces::from_cache(&cache, ARCFACE_ENCODING_DIM)?;

    let monitor = resolve_monitor(config)?;
    tracing::info!(
        name = %monitor.name,
        width = monitor.width,
        height = monitor.height,
        x = monitor.x,
        y = monitor.y,
        "overlay monitor"
    );

    let pipeline = OnnxPipeline::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let mut match_loop = MatchLoop::new(
        pipeline,
        known,
        config.matching.policy,
        config.matching.threshold,
    );

    let device = config.camera.device.clone();
    let settings = config.camera.settings();
    let mut source = FrameSource::spawn(move || Camera::open(&device, &settings))
        .with_context(|| format!("opening camera {}", config.camera.device))?;

    let first = source.read();
    let (cam_w, cam_h) = (first.width(), first.height());

    let font = config.overlay.font.as_deref().and_then(|path| match load_font(path) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "continuing without label text");
            None
        }
    });
    let compositor = Compositor::new(
        font,
        OverlayGeometry {
            camera_width: cam_w,
            camera_height: cam_h,
            monitor_width: monitor.width,
            monitor_height: monitor.height,
            padding: config.overlay.padding,
        },
    );

    let mut preview = PreviewWindow::new(PREVIEW_TITLE, cam_w, cam_h)?;
    let mut overlay = OverlayWindow::new(&monitor)?;

    tracing::info!(
        policy = %config.matching.policy,
        threshold = config.matching.threshold,
        "watching, press q or Esc to quit"
    );

    let mut failures = FailureLog::default();
    let result = (|| -> Result<()> {
        loop {
            if !source.is_running() {
                bail!("camera stopped delivering frames");
            }

            let mut frame = source.read();
            let detections = match match_loop.process(&frame.image) {
                Ok(detections) => {
                    if let Some(frames) = failures.succeeded() {
                        tracing::info!(frames, "frame processing recovered");
                    }
                    detections
                }
                Err(e) => {
                    let error = e.to_string();
                    if failures.failed(&error) {
                        tracing::warn!(
                            error = %error,
                            seq = frame.sequence,
                            streak = failures.streak,
                            "frame processing failed"
                        );
                    }
                    Vec::new()
                }
            };
            tracing::debug!(seq = frame.sequence, ?detections, "frame processed");

            compositor.annotate_preview(&mut frame.image, &detections);
            preview.show(&frame.image)?;
            if preview.quit_requested() {
                return Ok(());
            }

            let (wx, wy) = preview.position();
            let offset = (wx - monitor.x, wy - monitor.y);
            overlay.show(&compositor.compose_overlay(&detections, offset))?;
        }
    })();

    source.stop();
    drop(overlay);
    drop(preview);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_failure_logged_once_per_period() {
        let mut log = FailureLog::default();
        let logged = (0..FAILURE_REPORT_EVERY * 2)
            .filter(|_| log.failed("inference failed"))
            .count();
        // First failure, then the 100th and 200th repeats.
        assert_eq!(logged, 3);
        assert_eq!(log.streak, FAILURE_REPORT_EVERY * 2);
    }

    #[test]
    fn test_new_error_is_logged() {
        let mut log = FailureLog::default();
        assert!(log.failed("a"));
        assert!(!log.failed("a"));
        assert!(log.failed("b"));
        assert!(!log.failed("b"));
    }

    #[test]
    fn test_success_ends_streak() {
        let mut log = FailureLog::default();
        assert_eq!(log.succeeded(), None);

        log.failed("a");
        log.failed("a");
        assert_eq!(log.succeeded(), Some(2));
        assert_eq!(log.succeeded(), None);

        // The same error after recovery starts a fresh, logged streak.
        assert!(log.failed("a"));
    }
}

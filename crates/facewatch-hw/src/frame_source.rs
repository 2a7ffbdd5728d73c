//! Latest-frame camera source.
//!
//! A background thread grabs frames as fast as the device delivers them and
//! overwrites a single shared slot. Readers get a clone of whatever is in the
//! slot; they never wait for a fresh frame. A failed read is fatal for the
//! source: the thread exits, releases the device, and the state flips to
//! [`SourceState::Stopped`].

use crate::camera::CameraError;
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Something that yields camera frames, one blocking call at a time.
pub trait FrameGrabber {
    fn grab(&mut self) -> Result<Frame, CameraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Running,
    Stopped,
}

struct Shared {
    slot: Mutex<Frame>,
    running: AtomicBool,
    captured: AtomicU64,
}

pub struct FrameSource {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Start capturing from an already opened grabber.
    pub fn start<G>(grabber: G) -> Result<Self, CameraError>
    where
        G: FrameGrabber + Send + 'static,
    {
        Self::spawn(move || Ok(grabber))
    }

    /// Open the grabber on the capture thread and start capturing.
    ///
    /// Blocks until the device is open and the first frame has been read;
    /// either failure is returned here and no thread is left behind.
    pub fn spawn<G, F>(open: F) -> Result<Self, CameraError>
    where
        G: FrameGrabber,
        F: FnOnce() -> Result<G, CameraError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let handle = std::thread::Builder::new()
            .name("facewatch-capture".into())
            .spawn(move || {
                let first = open().and_then(|mut grabber| {
                    let frame = grabber.grab()?;
                    Ok((grabber, frame))
                });
                let (grabber, frame) = match first {
                    Ok(ok) => ok,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let shared = Arc::new(Shared {
                    slot: Mutex::new(frame),
                    running: AtomicBool::new(true),
                    captured: AtomicU64::new(1),
                });
                if ready_tx.send(Ok(Arc::clone(&shared))).is_err() {
                    return;
                }
                capture_loop(grabber, &shared);
            })
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| CameraError::CaptureFailed("capture thread exited during startup".into()));
        let shared = match ready.and_then(|r| r) {
            Ok(shared) => shared,
            Err(e) => {
                let _ = handle.join();
                return Err(e);
            }
        };

        tracing::info!("frame source started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Clone of the most recent frame.
    pub fn read(&self) -> Frame {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> SourceState {
        if self.shared.running.load(Ordering::Acquire) {
            SourceState::Running
        } else {
            SourceState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SourceState::Running
    }

    /// Frames written into the slot so far, including the first.
    pub fn frames_captured(&self) -> u64 {
        self.shared.captured.load(Ordering::Relaxed)
    }

    /// Stop capturing and join the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("capture thread panicked");
            }
            tracing::info!(frames = self.frames_captured(), "frame source stopped");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<G: FrameGrabber>(mut grabber: G, shared: &Shared) {
    while shared.running.load(Ordering::Acquire) {
        match grabber.grab() {
            Ok(frame) => {
                *shared.slot.lock().unwrap_or_else(PoisonError::into_inner) = frame;
                shared.captured.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(error = %e, "camera read failed, stopping capture");
                shared.running.store(false, Ordering::Release);
            }
        }
    }
    drop(grabber);
    tracing::debug!("capture thread exiting");
}

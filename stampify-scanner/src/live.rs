//! Live scanning loop
//!
//! Samples the most recent camera frame at a fixed interval, decodes it and
//! hands any code found to a `CodeHandler`. Frames are pushed into a
//! `FrameFeed` by whatever owns the camera stream; only the newest frame is
//! kept, older ones are dropped unseen.
//!
//! The camera is exclusive: a `Camera` hands out a single lease, and the lease
//! is held by the sampling task until it exits. Stopping cancels the task
//! before the next decode; a code decoded concurrently with the stop request
//! is discarded, never delivered.

use crate::decoder::{CodeDecoder, DecodedCode, Frame};
use async_trait::async_trait;
use stampify_common::events::{EventBus, ScanEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Live scanning errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LiveError {
    #[error("Camera is already in use by another scanning session")]
    CameraBusy,
}

/// Exclusive access to the camera device
#[derive(Debug, Clone)]
pub struct Camera {
    lease: Arc<Semaphore>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            lease: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the camera, failing immediately if someone else holds it
    pub fn acquire(&self) -> Result<OwnedSemaphorePermit, LiveError> {
        Arc::clone(&self.lease)
            .try_acquire_owned()
            .map_err(|_| LiveError::CameraBusy)
    }

    pub fn is_available(&self) -> bool {
        self.lease.available_permits() > 0
    }
}

/// Producer side of the latest-frame slot
#[derive(Debug, Clone)]
pub struct FramePublisher {
    tx: Arc<watch::Sender<Option<Arc<Frame>>>>,
}

impl FramePublisher {
    /// Replace the current frame; never blocks
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }
}

/// Consumer side of the latest-frame slot
#[derive(Debug)]
pub struct FrameFeed {
    rx: watch::Receiver<Option<Arc<Frame>>>,
}

/// Create a connected publisher/feed pair
pub fn frame_channel() -> (FramePublisher, FrameFeed) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx: Arc::new(tx) }, FrameFeed { rx })
}

/// Where the sampling loop gets frames from
pub trait FrameSource: Send + 'static {
    /// Newest frame not yet seen by this source, if any
    fn take_latest(&mut self) -> Option<Arc<Frame>>;
}

impl FrameSource for FrameFeed {
    fn take_latest(&mut self) -> Option<Arc<Frame>> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }
}

/// Receives decoded codes from the live loop
#[async_trait]
pub trait CodeHandler: Send + Sync + 'static {
    async fn on_code(&self, code: DecodedCode);
}

/// Sampling parameters
#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    /// Gap between decode attempts (100 ms ≈ 10 attempts/s)
    pub sample_interval: Duration,
    /// The same text is not re-delivered within this window
    pub duplicate_cooldown: Duration,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            duplicate_cooldown: Duration::from_secs(3),
        }
    }
}

/// Handle to a running live scan
pub struct LiveSession {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LiveSession {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop sampling and wait until the camera is released
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Live scanning task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start sampling `source` with the camera lease held for the session's lifetime
pub fn start_live_scan<S, H>(
    camera: &Camera,
    mut source: S,
    decoder: Arc<dyn CodeDecoder>,
    handler: Arc<H>,
    event_bus: EventBus,
    settings: LiveSettings,
) -> Result<LiveSession, LiveError>
where
    S: FrameSource,
    H: CodeHandler,
{
    let permit = camera.acquire()?;
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        let _permit = permit;
        info!(interval = ?settings.sample_interval, "Live scanning started");
        event_bus.emit_lossy(ScanEvent::ScannerStarted {
            timestamp: stampify_common::time::now(),
        });

        let mut ticker = tokio::time::interval(settings.sample_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_delivered: Option<(String, Instant)> = None;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(frame) = source.take_latest() else {
                continue;
            };
            let decoded = tokio::task::spawn_blocking({
                let decoder = Arc::clone(&decoder);
                move || decoder.decode(&frame)
            })
            .await;
            let code = match decoded {
                Ok(Some(code)) => code,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Frame decode task failed: {}", e);
                    continue;
                }
            };

            // stop requested while decoding: drop the result
            if token.is_cancelled() {
                break;
            }

            let now = Instant::now();
            if let Some((text, at)) = &last_delivered {
                if *text == code.text && now.duration_since(*at) < settings.duplicate_cooldown {
                    debug!("Same code still in view, not re-delivering");
                    continue;
                }
            }
            last_delivered = Some((code.text.clone(), now));

            event_bus.emit_lossy(ScanEvent::CodeDetected {
                text: code.text.clone(),
                corners: code.corner_tuples(),
                timestamp: stampify_common::time::now(),
            });

            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.on_code(code).await });
        }

        event_bus.emit_lossy(ScanEvent::ScannerStopped {
            timestamp: stampify_common::time::now(),
        });
        info!("Live scanning stopped, camera released");
    });

    Ok(LiveSession {
        cancel,
        handle: Some(handle),
    })
}

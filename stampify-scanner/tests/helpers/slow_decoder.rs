//! Decoder stub that takes a fixed time per frame

use stampify_scanner::decoder::{CodeDecoder, DecodedCode, Frame, Point};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct SlowDecoder {
    delay: Duration,
    text: Option<String>,
    started: AtomicBool,
    finished: AtomicBool,
}

impl SlowDecoder {
    /// Finds nothing after `delay`
    pub fn blank(delay: Duration) -> Self {
        Self::new(delay, None)
    }

    /// Finds `text` after `delay`
    pub fn finding(delay: Duration, text: &str) -> Self {
        Self::new(delay, Some(text.to_string()))
    }

    fn new(delay: Duration, text: Option<String>) -> Self {
        Self {
            delay,
            text,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Poll until a decode has begun
    pub async fn wait_started(&self) {
        for _ in 0..200 {
            if self.started() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("decoder was never called");
    }
}

impl CodeDecoder for SlowDecoder {
    fn decode(&self, _frame: &Frame) -> Option<DecodedCode> {
        self.started.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.finished.store(true, Ordering::SeqCst);
        self.text.clone().map(|text| DecodedCode {
            text,
            corners: [
                Point { x: 0, y: 0 },
                Point { x: 10, y: 0 },
                Point { x: 10, y: 10 },
                Point { x: 0, y: 10 },
            ],
        })
    }
}

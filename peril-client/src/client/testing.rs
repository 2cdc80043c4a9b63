//! Test doubles for the publisher and console seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::bus::{BusError, Encoding, Publisher};
use crate::client::console::Console;

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn decode<T: DeserializeOwned>(&self) -> T {
        let encoding = match self.content_type.as_str() {
            "application/json" => Encoding::Json,
            _ => Encoding::Bincode,
        };
        encoding.decode(&self.payload).unwrap()
    }
}

/// Records every publish; optionally fails all of them after recording.
#[derive(Default)]
pub struct RecordingPublisher {
    fail: bool,
    published: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            payload,
        });
        if self.fail {
            Err(BusError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

/// Captures printed text and counts prompt refreshes.
#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
}

impl RecordingConsole {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }
}

impl Console for RecordingConsole {
    fn print(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn refresh_prompt(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

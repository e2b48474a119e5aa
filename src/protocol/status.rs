//! Status side channel
//!
//! Lifecycle events go to a stream separate from the response stream
//! (stderr), one JSON object per line, flushed as soon as written. A
//! supervisor can then tell "still loading" from "dead" without mixing
//! them up with embedding responses.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::models::Device;

/// Service lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusEvent {
    /// About to load `model` onto `device`; `requested` is the preference given at startup
    Ready {
        model: String,
        device: String,
        requested: String,
    },
    /// Model loaded; requests are being served
    Loaded { device: String },
    /// Startup failure or fatal fault
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        traceback: Option<String>,
    },
}

impl StatusEvent {
    pub fn ready(model: &str, device: Device, requested: &str) -> Self {
        StatusEvent::Ready {
            model: model.to_string(),
            device: device.to_string(),
            requested: requested.to_string(),
        }
    }

    pub fn loaded(device: Device) -> Self {
        StatusEvent::Loaded {
            device: device.to_string(),
        }
    }

    pub fn error(message: impl Into<String>, traceback: Option<String>) -> Self {
        StatusEvent::Error {
            message: message.into(),
            traceback,
        }
    }
}

/// Write-only status stream
#[derive(Debug)]
pub struct StatusChannel<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> StatusChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one event line and flush it
    pub async fn emit(&mut self, event: &StatusEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_written_as_lines() {
        let mut channel = StatusChannel::new(Vec::new());
        channel
            .emit(&StatusEvent::ready("all-MiniLM-L6-v2", Device::Cpu, "cuda"))
            .await
            .unwrap();
        channel.emit(&StatusEvent::loaded(Device::Cpu)).await.unwrap();

        let written = String::from_utf8(channel.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"type":"ready","model":"all-MiniLM-L6-v2","device":"cpu","requested":"cuda"}"#,
                r#"{"type":"loaded","device":"cpu"}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_event_traceback_is_optional() {
        let mut channel = StatusChannel::new(Vec::new());
        channel
            .emit(&StatusEvent::error("Failed to load model: nope", None))
            .await
            .unwrap();
        channel
            .emit(&StatusEvent::error("Fatal error: broken pipe", Some("broken pipe".to_string())))
            .await
            .unwrap();

        let written = String::from_utf8(channel.into_inner()).unwrap();
        let events: Vec<StatusEvent> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events[0], StatusEvent::error("Failed to load model: nope", None));
        assert!(!written.lines().next().unwrap().contains("traceback"));
        assert_eq!(
            events[1],
            StatusEvent::Error {
                message: "Fatal error: broken pipe".to_string(),
                traceback: Some("broken pipe".to_string()),
            }
        );
    }
}

use std::io::Write;

use mimic_common::{Error, Result};
use tokio::sync::mpsc;

/// Transport to the host process. Each message is one JSON text.
pub trait HostChannel: Send + Sync {
    fn post_message(&self, message: String) -> Result<()>;
}

/// Writes one message per line to stdout.
#[derive(Debug, Default)]
pub struct StdoutChannel;

impl HostChannel for StdoutChannel {
    fn post_message(&self, message: String) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{message}")?;
        out.flush()?;
        Ok(())
    }
}

/// In-process channel for embedders and tests.
#[derive(Debug, Clone)]
pub struct QueueChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl QueueChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostChannel for QueueChannel {
    fn post_message(&self, message: String) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::bridge("host channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_channel_delivers_in_order() {
        let (channel, mut rx) = QueueChannel::new();
        channel.post_message("a".into()).unwrap();
        channel.post_message("b".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_queue_channel_reports_closed_host() {
        let (channel, rx) = QueueChannel::new();
        drop(rx);
        assert!(channel.post_message("lost".into()).is_err());
    }
}

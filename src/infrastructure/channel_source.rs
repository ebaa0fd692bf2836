// Channel-backed reading source - Payloads pushed in by the embedding process
use crate::application::reading_source::{PayloadStream, ReadingSource};
use crate::error::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Sender = mpsc::UnboundedSender<Result<Bytes, StreamError>>;

#[derive(Debug, Default)]
struct Connections {
    senders: HashMap<String, Vec<Sender>>,
    opens: HashMap<String, usize>,
}

/// Source fed by whoever holds it: a message-bus consumer, a webhook
/// handler, or a test.
#[derive(Debug, Default)]
pub struct ChannelSource {
    connections: Mutex<Connections>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a raw payload to every open connection of the farm.
    pub fn push(&self, farm_id: &str, payload: impl Into<Bytes>) {
        self.send(farm_id, Ok(payload.into()));
    }

    /// Break every open connection of the farm with a transport error.
    pub fn fail(&self, farm_id: &str, reason: &str) {
        self.send(
            farm_id,
            Err(StreamError::Transport {
                farm_id: farm_id.to_string(),
                reason: reason.to_string(),
            }),
        );
        self.close(farm_id);
    }

    /// End every open connection of the farm.
    pub fn close(&self, farm_id: &str) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.senders.remove(farm_id);
    }

    /// How many times the farm's stream has been opened.
    pub fn open_count(&self, farm_id: &str) -> usize {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.opens.get(farm_id).copied().unwrap_or(0)
    }

    fn send(&self, farm_id: &str, item: Result<Bytes, StreamError>) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(senders) = connections.senders.get_mut(farm_id) {
            senders.retain(|tx| tx.send(item.clone()).is_ok());
        }
    }
}

#[async_trait]
impl ReadingSource for ChannelSource {
    async fn open(&self, farm_id: &str) -> Result<PayloadStream, StreamError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections
            .senders
            .entry(farm_id.to_string())
            .or_default()
            .push(tx);
        *connections.opens.entry(farm_id.to_string()).or_default() += 1;

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_open_stream() {
        let source = ChannelSource::new();
        let mut stream = source.open("farm1").await.unwrap();
        source.push("farm1", "hello");
        source.push("farm2", "ignored");

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("hello"));
        assert_eq!(source.open_count("farm1"), 1);
        assert_eq!(source.open_count("farm2"), 0);
    }

    #[tokio::test]
    async fn test_fail_then_end() {
        let source = ChannelSource::new();
        let mut stream = source.open("farm1").await.unwrap();
        source.fail("farm1", "reset");

        assert!(matches!(
            stream.next().await.unwrap(),
            Err(StreamError::Transport { .. })
        ));
        assert!(stream.next().await.is_none());
    }
}

// Reading source trait - Seam to the live per-farm payload stream
use crate::error::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Raw payloads of one farm, in delivery order. An `Err` item or the end of
/// the stream both mean the connection is gone.
pub type PayloadStream = BoxStream<'static, Result<Bytes, StreamError>>;

#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Open a new connection for the farm. No replay of earlier payloads is
    /// assumed, so a reopened stream may have a gap.
    async fn open(&self, farm_id: &str) -> Result<PayloadStream, StreamError>;
}

use std::sync::Arc;

use crate::entity::CatalogRecord;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("catalog rejected records: {0}")]
    Rejected(String),
}

/// Where discovered records are published.
///
/// The engine only writes: `apply_delta` adds, `apply_full` replaces
/// everything previously attributed to `source_id`.
#[async_trait::async_trait]
pub trait CatalogSink: Send + Sync {
    async fn apply_delta(&self, source_id: &str, added: &[CatalogRecord]) -> Result<(), SinkError>;

    async fn apply_full(&self, source_id: &str, entities: &[CatalogRecord])
    -> Result<(), SinkError>;
}

#[async_trait::async_trait]
impl<T: CatalogSink + ?Sized> CatalogSink for Arc<T> {
    async fn apply_delta(&self, source_id: &str, added: &[CatalogRecord]) -> Result<(), SinkError> {
        (**self).apply_delta(source_id, added).await
    }

    async fn apply_full(
        &self,
        source_id: &str,
        entities: &[CatalogRecord],
    ) -> Result<(), SinkError> {
        (**self).apply_full(source_id, entities).await
    }
}

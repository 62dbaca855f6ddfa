use std::sync::Arc;

use super::{StoreConnector, StoreError};
use crate::retry::RetryPolicy;

/// Startup gate for the vector store.
///
/// Opens a fresh handle and runs the count probe under the connectivity
/// retry schedule. The server must not begin serving (or seeding) until
/// this succeeds.
pub struct StoreInitializer {
    connector: Arc<dyn StoreConnector>,
    policy: RetryPolicy,
}

impl StoreInitializer {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self::with_policy(connector, RetryPolicy::connectivity())
    }

    pub fn with_policy(connector: Arc<dyn StoreConnector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// Probe the store, retrying transient connectivity failures. Returns
    /// the document count on success.
    pub async fn verify_connection(&self) -> Result<usize, StoreError> {
        let count = self
            .policy
            .run("vector store probe", StoreError::is_transient, || {
                let connector = Arc::clone(&self.connector);
                async move {
                    tokio::task::spawn_blocking(move || {
                        // Fresh handle per attempt, like the rest of the
                        // pipeline: nothing is reused across failures.
                        let store = connector.connect()?;
                        store.count_documents()
                    })
                    .await
                    .map_err(|e| StoreError::Background(e.to_string()))?
                }
            })
            .await?;

        tracing::info!(documents = count, "Vector store connection verified");
        Ok(count)
    }
}

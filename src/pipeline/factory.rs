//! Assembles the indexing and query pipelines.
//!
//! Component initialization can be slow (store handshakes, reranker
//! warm-up), so each component is built on the blocking pool with
//! concurrency capped at three quarters of the available cores. A
//! pipeline is only returned once every stage initialized and the wiring
//! validated; any failure aborts the whole build.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::components::ComponentFactory;
use super::graph::PipelineGraph;
use super::PipelineError;

fn init_pool_size() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 3 / 4).max(1)
}

pub struct PipelineFactory {
    components: Arc<dyn ComponentFactory>,
    init_pool: Arc<Semaphore>,
}

impl PipelineFactory {
    pub fn new(components: Arc<dyn ComponentFactory>) -> Self {
        Self {
            components,
            init_pool: Arc::new(Semaphore::new(init_pool_size())),
        }
    }

    /// Build one component on the blocking pool, gated by the init
    /// semaphore.
    async fn init<T, F>(&self, task: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ComponentFactory) -> Result<T, PipelineError> + Send + 'static,
    {
        let permit = Arc::clone(&self.init_pool)
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Background(e.to_string()))?;
        let components = Arc::clone(&self.components);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task(components.as_ref())
        })
        .await
        .map_err(|e| PipelineError::Background(e.to_string()))?
    }

    pub async fn create_indexing_pipeline(&self) -> Result<PipelineGraph, PipelineError> {
        tracing::info!("Creating indexing pipeline");
        let graph = self.build_indexing_pipeline().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to create indexing pipeline");
            e
        })?;
        tracing::info!("Indexing pipeline created");
        Ok(graph)
    }

    pub async fn create_query_pipeline(&self) -> Result<PipelineGraph, PipelineError> {
        tracing::info!("Creating query pipeline");
        let graph = self.build_query_pipeline().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to create query pipeline");
            e
        })?;
        tracing::info!("Query pipeline created");
        Ok(graph)
    }

    async fn build_indexing_pipeline(&self) -> Result<PipelineGraph, PipelineError> {
        // Step 1: store handle and both document embedders, concurrently.
        let (store, sparse_embedder, dense_embedder) = tokio::try_join!(
            self.init(|c| c.create_document_store()),
            self.init(|c| c.create_sparse_document_embedder()),
            self.init(|c| c.create_dense_document_embedder()),
        )?;

        // Step 2: the writer needs the store handle from step 1.
        let writer_store = Arc::clone(&store);
        let writer = self.init(move |c| c.create_writer(writer_store)).await?;

        // Step 3: wire documents through both embedders into the writer.
        let mut graph = PipelineGraph::new();
        graph.add_stage("sparse_embedder", sparse_embedder)?;
        graph.add_stage("dense_embedder", dense_embedder)?;
        graph.add_stage("writer", writer)?;
        graph.connect("sparse_embedder", "dense_embedder")?;
        graph.connect("dense_embedder", "writer")?;
        graph.validate()?;
        Ok(graph)
    }

    async fn build_query_pipeline(&self) -> Result<PipelineGraph, PipelineError> {
        // Step 1: store handle and both text embedders, concurrently.
        let (store, sparse_embedder, dense_embedder) = tokio::try_join!(
            self.init(|c| c.create_document_store()),
            self.init(|c| c.create_sparse_text_embedder()),
            self.init(|c| c.create_dense_text_embedder()),
        )?;

        // Step 2: the remaining components, concurrently. Reranker
        // creation includes its warm-up request.
        let retriever_store = Arc::clone(&store);
        let (retriever, reranker, generator, prompt_builder) = tokio::try_join!(
            self.init(move |c| c.create_retriever(retriever_store)),
            self.init(|c| c.create_reranker()),
            self.init(|c| c.create_generator()),
            self.init(|c| c.create_prompt_builder()),
        )?;

        // Step 3: both embedding spaces feed the retriever; from there the
        // chain is linear through reranker, prompt and model.
        let mut graph = PipelineGraph::new();
        graph.add_stage("sparse_embedder", sparse_embedder)?;
        graph.add_stage("dense_embedder", dense_embedder)?;
        graph.add_stage("retriever", retriever)?;
        graph.add_stage("reranker", reranker)?;
        graph.add_stage("prompt_builder", prompt_builder)?;
        graph.add_stage("llm", generator)?;

        graph.connect("sparse_embedder.sparse_embedding", "retriever.query_sparse_embedding")?;
        graph.connect("dense_embedder.embedding", "retriever.query_embedding")?;
        graph.connect("retriever.documents", "reranker.documents")?;
        graph.connect("reranker", "prompt_builder.documents")?;
        graph.connect("prompt_builder", "llm")?;
        graph.validate()?;
        Ok(graph)
    }
}

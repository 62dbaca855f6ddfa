//! Pipeline stages and the factory seam that builds them.
//!
//! Stages adapt the model-service clients and the document store to the
//! graph's port protocol. The [`ComponentFactory`] trait is the boundary
//! between pipeline assembly and the outside world; the service-backed
//! implementation talks to real endpoints while [`MockComponentFactory`]
//! runs everything in process for tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::embedding::{
    DenseEmbedder, DenseEmbeddingClient, MockDenseEmbedder, MockSparseEmbedder, SparseEmbedder,
    SparseEmbeddingClient,
};
use super::graph::{
    take_documents, take_embedding, take_sparse_embedding, take_text, Stage, StageValue,
};
use super::ollama::{LlmGenerate, MockLlm, OllamaClient};
use super::prompt::render_medication_ner;
use super::rerank::{MockRerank, Rerank, RerankApiClient};
use super::PipelineError;
use crate::config::Settings;
use crate::store::{DocumentStore, InMemoryDocumentStore, QdrantConnector, StoreConnector};

fn single_output(port: &str, value: StageValue) -> BTreeMap<String, StageValue> {
    let mut outputs = BTreeMap::new();
    outputs.insert(port.to_string(), value);
    outputs
}

// ═══════════════════════════════════════════════════════════════════════════
// Query-side stages
// ═══════════════════════════════════════════════════════════════════════════

/// Embeds the query text into a sparse vector.
pub struct SparseTextEmbedderStage {
    embedder: Arc<dyn SparseEmbedder>,
}

impl SparseTextEmbedderStage {
    const NAME: &'static str = "sparse_embedder";

    pub fn new(embedder: Arc<dyn SparseEmbedder>) -> Self {
        Self { embedder }
    }
}

impl Stage for SparseTextEmbedderStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["text"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["sparse_embedding"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let text = take_text(&mut inputs, Self::NAME, "text")?;
        let mut vectors = self.embedder.embed_batch(&[text])?;
        let vector = vectors.pop().ok_or_else(|| {
            PipelineError::Wiring(format!("{} produced no vector", Self::NAME))
        })?;
        Ok(single_output(
            "sparse_embedding",
            StageValue::SparseEmbedding(vector),
        ))
    }
}

/// Embeds the query text into a dense vector.
pub struct DenseTextEmbedderStage {
    embedder: Arc<dyn DenseEmbedder>,
}

impl DenseTextEmbedderStage {
    const NAME: &'static str = "dense_embedder";

    pub fn new(embedder: Arc<dyn DenseEmbedder>) -> Self {
        Self { embedder }
    }
}

impl Stage for DenseTextEmbedderStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["text"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["embedding"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let text = take_text(&mut inputs, Self::NAME, "text")?;
        let mut vectors = self.embedder.embed_batch(&[text])?;
        let vector = vectors.pop().ok_or_else(|| {
            PipelineError::Wiring(format!("{} produced no vector", Self::NAME))
        })?;
        Ok(single_output("embedding", StageValue::Embedding(vector)))
    }
}

/// Hybrid retrieval over both embedding spaces.
pub struct RetrieverStage {
    store: Arc<dyn DocumentStore>,
    top_k: usize,
}

impl RetrieverStage {
    const NAME: &'static str = "retriever";

    pub fn new(store: Arc<dyn DocumentStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }
}

impl Stage for RetrieverStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["query_embedding", "query_sparse_embedding"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let embedding = take_embedding(&mut inputs, Self::NAME, "query_embedding")?;
        let sparse = take_sparse_embedding(&mut inputs, Self::NAME, "query_sparse_embedding")?;
        let documents = self.store.hybrid_retrieval(&embedding, &sparse, self.top_k)?;
        Ok(single_output("documents", StageValue::Documents(documents)))
    }
}

/// Reorders retrieved documents with a cross-encoder and keeps the best.
pub struct RerankerStage {
    reranker: Arc<dyn Rerank>,
    top_k: usize,
}

impl RerankerStage {
    const NAME: &'static str = "reranker";

    pub fn new(reranker: Arc<dyn Rerank>, top_k: usize) -> Self {
        Self { reranker, top_k }
    }
}

impl Stage for RerankerStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["query", "documents"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let query = take_text(&mut inputs, Self::NAME, "query")?;
        let documents = take_documents(&mut inputs, Self::NAME, "documents")?;
        if documents.is_empty() {
            return Ok(single_output("documents", StageValue::Documents(Vec::new())));
        }

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let mut scores = self.reranker.rerank(&query, &contents)?;
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let reranked: Vec<_> = scores
            .into_iter()
            .take(self.top_k)
            .filter_map(|scored| {
                documents.get(scored.index).cloned().map(|mut document| {
                    document.score = Some(scored.score);
                    document
                })
            })
            .collect();
        Ok(single_output("documents", StageValue::Documents(reranked)))
    }
}

/// Renders the few-shot extraction prompt.
pub struct PromptBuilderStage;

impl PromptBuilderStage {
    const NAME: &'static str = "prompt_builder";
}

impl Stage for PromptBuilderStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["query", "documents"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["prompt"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let query = take_text(&mut inputs, Self::NAME, "query")?;
        let documents = take_documents(&mut inputs, Self::NAME, "documents")?;
        let prompt = render_medication_ner(&query, &documents);
        Ok(single_output("prompt", StageValue::Text(prompt)))
    }
}

/// Sends the prompt to the language model.
pub struct GeneratorStage {
    llm: Arc<dyn LlmGenerate>,
}

impl GeneratorStage {
    const NAME: &'static str = "llm";

    pub fn new(llm: Arc<dyn LlmGenerate>) -> Self {
        Self { llm }
    }
}

impl Stage for GeneratorStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["prompt"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["replies"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let prompt = take_text(&mut inputs, Self::NAME, "prompt")?;
        let replies = self.llm.generate(&prompt)?;
        Ok(single_output("replies", StageValue::Replies(replies)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Indexing-side stages
// ═══════════════════════════════════════════════════════════════════════════

/// Attaches sparse vectors to a batch of documents.
pub struct SparseDocumentEmbedderStage {
    embedder: Arc<dyn SparseEmbedder>,
}

impl SparseDocumentEmbedderStage {
    const NAME: &'static str = "sparse_embedder";

    pub fn new(embedder: Arc<dyn SparseEmbedder>) -> Self {
        Self { embedder }
    }
}

impl Stage for SparseDocumentEmbedderStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let mut documents = take_documents(&mut inputs, Self::NAME, "documents")?;
        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&contents)?;
        for (document, vector) in documents.iter_mut().zip(vectors) {
            document.sparse_embedding = Some(vector);
        }
        Ok(single_output("documents", StageValue::Documents(documents)))
    }
}

/// Attaches dense vectors to a batch of documents.
pub struct DenseDocumentEmbedderStage {
    embedder: Arc<dyn DenseEmbedder>,
}

impl DenseDocumentEmbedderStage {
    const NAME: &'static str = "dense_embedder";

    pub fn new(embedder: Arc<dyn DenseEmbedder>) -> Self {
        Self { embedder }
    }
}

impl Stage for DenseDocumentEmbedderStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let mut documents = take_documents(&mut inputs, Self::NAME, "documents")?;
        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&contents)?;
        for (document, vector) in documents.iter_mut().zip(vectors) {
            document.embedding = Some(vector);
        }
        Ok(single_output("documents", StageValue::Documents(documents)))
    }
}

/// Writes fully embedded documents into the store, overwriting by id.
pub struct WriterStage {
    store: Arc<dyn DocumentStore>,
}

impl WriterStage {
    const NAME: &'static str = "writer";

    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl Stage for WriterStage {
    fn input_ports(&self) -> &'static [&'static str] {
        &["documents"]
    }
    fn output_ports(&self) -> &'static [&'static str] {
        &["documents_written"]
    }
    fn run(
        &self,
        mut inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError> {
        let documents = take_documents(&mut inputs, Self::NAME, "documents")?;
        let written = self.store.write_documents(&documents)?;
        Ok(single_output("documents_written", StageValue::Count(written)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Factory seam
// ═══════════════════════════════════════════════════════════════════════════

/// Builds stages and the store handle they share. Pipeline assembly only
/// sees this trait, so tests swap in in-process components wholesale.
pub trait ComponentFactory: Send + Sync {
    fn create_document_store(&self) -> Result<Arc<dyn DocumentStore>, PipelineError>;
    fn create_sparse_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_dense_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_sparse_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_dense_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_retriever(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_reranker(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_prompt_builder(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_generator(&self) -> Result<Box<dyn Stage>, PipelineError>;
    fn create_writer(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError>;
}

/// Factory backed by the real Qdrant, embedding, reranking and Ollama
/// services named in [`Settings`].
pub struct ServiceComponentFactory {
    settings: Arc<Settings>,
    connector: Arc<dyn StoreConnector>,
}

impl ServiceComponentFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        let connector = Arc::new(QdrantConnector::new(Arc::clone(&settings)));
        Self {
            settings,
            connector,
        }
    }

    pub fn with_connector(settings: Arc<Settings>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            settings,
            connector,
        }
    }
}

impl ComponentFactory for ServiceComponentFactory {
    fn create_document_store(&self) -> Result<Arc<dyn DocumentStore>, PipelineError> {
        Ok(self.connector.connect()?)
    }

    fn create_sparse_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client = SparseEmbeddingClient::new(
            &self.settings.embedding_api_url,
            &self.settings.sparse_embedding_model,
        );
        Ok(Box::new(SparseTextEmbedderStage::new(Arc::new(client))))
    }

    fn create_dense_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client = DenseEmbeddingClient::new(
            &self.settings.embedding_api_url,
            &self.settings.dense_embedding_model,
        );
        Ok(Box::new(DenseTextEmbedderStage::new(Arc::new(client))))
    }

    fn create_sparse_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client = SparseEmbeddingClient::new(
            &self.settings.embedding_api_url,
            &self.settings.sparse_embedding_model,
        );
        Ok(Box::new(SparseDocumentEmbedderStage::new(Arc::new(client))))
    }

    fn create_dense_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client = DenseEmbeddingClient::new(
            &self.settings.embedding_api_url,
            &self.settings.dense_embedding_model,
        );
        Ok(Box::new(DenseDocumentEmbedderStage::new(Arc::new(client))))
    }

    fn create_retriever(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(RetrieverStage::new(
            store,
            self.settings.retriever_top_k,
        )))
    }

    fn create_reranker(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client =
            RerankApiClient::new(&self.settings.reranker_api_url, &self.settings.reranker_model);
        client.warm_up()?;
        Ok(Box::new(RerankerStage::new(
            Arc::new(client),
            self.settings.reranker_top_k,
        )))
    }

    fn create_prompt_builder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(PromptBuilderStage))
    }

    fn create_generator(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let client = OllamaClient::new(
            &self.settings.ollama_api_url,
            &self.settings.ollama_model,
            self.settings.ollama_temperature,
            self.settings.ollama_max_tokens,
            self.settings.ollama_max_context,
        );
        Ok(Box::new(GeneratorStage::new(Arc::new(client))))
    }

    fn create_writer(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(WriterStage::new(store)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-process factory for tests
// ═══════════════════════════════════════════════════════════════════════════

/// Fully in-process factory: deterministic embedders, overlap reranker,
/// scripted generator, shared in-memory store. Handles to the mocks stay
/// available so tests can seed replies and inspect what happened.
pub struct MockComponentFactory {
    store: Arc<InMemoryDocumentStore>,
    reranker: Arc<MockRerank>,
    llm: Arc<MockLlm>,
    embedding_dim: usize,
    retriever_top_k: usize,
    reranker_top_k: usize,
}

impl MockComponentFactory {
    pub fn new(llm: MockLlm) -> Self {
        Self {
            store: Arc::new(InMemoryDocumentStore::new()),
            reranker: Arc::new(MockRerank::new()),
            llm: Arc::new(llm),
            embedding_dim: 16,
            retriever_top_k: 4,
            reranker_top_k: 2,
        }
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self::new(MockLlm::new(replies))
    }

    pub fn store(&self) -> Arc<InMemoryDocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn reranker(&self) -> Arc<MockRerank> {
        Arc::clone(&self.reranker)
    }

    pub fn llm(&self) -> Arc<MockLlm> {
        Arc::clone(&self.llm)
    }
}

impl ComponentFactory for MockComponentFactory {
    fn create_document_store(&self) -> Result<Arc<dyn DocumentStore>, PipelineError> {
        Ok(Arc::clone(&self.store) as Arc<dyn DocumentStore>)
    }

    fn create_sparse_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(SparseTextEmbedderStage::new(Arc::new(
            MockSparseEmbedder,
        ))))
    }

    fn create_dense_text_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(DenseTextEmbedderStage::new(Arc::new(
            MockDenseEmbedder::new(self.embedding_dim),
        ))))
    }

    fn create_sparse_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(SparseDocumentEmbedderStage::new(Arc::new(
            MockSparseEmbedder,
        ))))
    }

    fn create_dense_document_embedder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(DenseDocumentEmbedderStage::new(Arc::new(
            MockDenseEmbedder::new(self.embedding_dim),
        ))))
    }

    fn create_retriever(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(RetrieverStage::new(store, self.retriever_top_k)))
    }

    fn create_reranker(&self) -> Result<Box<dyn Stage>, PipelineError> {
        let reranker: Arc<dyn Rerank> = Arc::clone(&self.reranker) as Arc<dyn Rerank>;
        reranker.warm_up()?;
        Ok(Box::new(RerankerStage::new(reranker, self.reranker_top_k)))
    }

    fn create_prompt_builder(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(PromptBuilderStage))
    }

    fn create_generator(&self) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(GeneratorStage::new(
            Arc::clone(&self.llm) as Arc<dyn LlmGenerate>
        )))
    }

    fn create_writer(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Box<dyn Stage>, PipelineError> {
        Ok(Box::new(WriterStage::new(store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use serde_json::json;

    fn doc(id: &str, content: &str) -> Document {
        Document::new(id, content, json!({"drug_name": [content]}))
    }

    fn documents_input(documents: Vec<Document>) -> BTreeMap<String, StageValue> {
        let mut inputs = BTreeMap::new();
        inputs.insert("documents".to_string(), StageValue::Documents(documents));
        inputs
    }

    #[test]
    fn text_embedders_emit_one_vector_each() {
        let sparse = SparseTextEmbedderStage::new(Arc::new(MockSparseEmbedder));
        let dense = DenseTextEmbedderStage::new(Arc::new(MockDenseEmbedder::new(8)));

        let mut inputs = BTreeMap::new();
        inputs.insert(
            "text".to_string(),
            StageValue::Text("naproxen 250mg".into()),
        );
        let outputs = sparse.run(inputs.clone()).unwrap();
        assert!(matches!(
            outputs.get("sparse_embedding"),
            Some(StageValue::SparseEmbedding(_))
        ));

        let outputs = dense.run(inputs).unwrap();
        match outputs.get("embedding") {
            Some(StageValue::Embedding(vector)) => assert_eq!(vector.len(), 8),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn document_embedders_attach_vectors_to_every_document() {
        let sparse = SparseDocumentEmbedderStage::new(Arc::new(MockSparseEmbedder));
        let dense = DenseDocumentEmbedderStage::new(Arc::new(MockDenseEmbedder::new(8)));

        let documents = vec![doc("0", "aspirin"), doc("1", "metformin")];
        let outputs = sparse.run(documents_input(documents)).unwrap();
        let Some(StageValue::Documents(documents)) = outputs.get("documents").cloned() else {
            panic!("sparse embedder produced no documents");
        };
        assert!(documents.iter().all(|d| d.sparse_embedding.is_some()));
        assert!(documents.iter().all(|d| d.embedding.is_none()));

        let outputs = dense.run(documents_input(documents)).unwrap();
        let Some(StageValue::Documents(documents)) = outputs.get("documents").cloned() else {
            panic!("dense embedder produced no documents");
        };
        assert!(documents.iter().all(|d| d.embedding.is_some()));
        assert!(documents.iter().all(|d| d.sparse_embedding.is_some()));
        assert_eq!(documents[0].id, "0");
        assert_eq!(documents[1].content, "metformin");
    }

    #[test]
    fn reranker_stage_reorders_and_truncates() {
        let stage = RerankerStage::new(Arc::new(MockRerank::new()), 2);
        let documents = vec![
            doc("0", "unrelated filler text"),
            doc("1", "warfarin 5mg tablet"),
            doc("2", "warfarin dose adjustment"),
        ];

        let mut inputs = documents_input(documents);
        inputs.insert(
            "query".to_string(),
            StageValue::Text("warfarin 5mg".into()),
        );
        let outputs = stage.run(inputs).unwrap();
        let Some(StageValue::Documents(reranked)) = outputs.get("documents") else {
            panic!("reranker produced no documents");
        };
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].id, "1");
        assert!(reranked[0].score.unwrap() >= reranked[1].score.unwrap());
    }

    #[test]
    fn reranker_stage_passes_empty_batch_through() {
        let stage = RerankerStage::new(Arc::new(MockRerank::new()), 2);
        let mut inputs = documents_input(Vec::new());
        inputs.insert("query".to_string(), StageValue::Text("anything".into()));
        let outputs = stage.run(inputs).unwrap();
        assert!(matches!(
            outputs.get("documents"),
            Some(StageValue::Documents(documents)) if documents.is_empty()
        ));
    }

    #[test]
    fn prompt_builder_stage_renders_query_and_examples() {
        let stage = PromptBuilderStage;
        let mut inputs = documents_input(vec![doc("0", "aspirin 81mg")]);
        inputs.insert(
            "query".to_string(),
            StageValue::Text("two ibuprofen".into()),
        );
        let outputs = stage.run(inputs).unwrap();
        match outputs.get("prompt") {
            Some(StageValue::Text(prompt)) => {
                assert!(prompt.contains("Query: aspirin 81mg"));
                assert!(prompt.contains("two ibuprofen"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn generator_stage_returns_replies() {
        let stage = GeneratorStage::new(Arc::new(MockLlm::single("{\"drug_name\":[]}")));
        let mut inputs = BTreeMap::new();
        inputs.insert("prompt".to_string(), StageValue::Text("prompt".into()));
        let outputs = stage.run(inputs).unwrap();
        assert!(matches!(
            outputs.get("replies"),
            Some(StageValue::Replies(replies)) if replies.len() == 1
        ));
    }

    #[test]
    fn writer_stage_reports_written_count() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let stage = WriterStage::new(Arc::clone(&store) as Arc<dyn DocumentStore>);

        let mut first = doc("0", "aspirin");
        first.embedding = Some(vec![1.0, 0.0]);
        first.sparse_embedding = Some(crate::models::SparseVector {
            indices: vec![1],
            values: vec![1.0],
        });
        let outputs = stage.run(documents_input(vec![first])).unwrap();
        assert!(matches!(
            outputs.get("documents_written"),
            Some(StageValue::Count(1))
        ));
        assert_eq!(store.count_documents().unwrap(), 1);
    }

    #[test]
    fn mock_factory_shares_one_store_between_writer_and_retriever() {
        let factory = MockComponentFactory::with_replies(Vec::new());
        let store = factory.create_document_store().unwrap();

        let writer = factory.create_writer(Arc::clone(&store)).unwrap();
        let sparse = factory.create_sparse_document_embedder().unwrap();
        let dense = factory.create_dense_document_embedder().unwrap();

        let documents = vec![doc("0", "atorvastatin 20mg")];
        let outputs = sparse.run(documents_input(documents)).unwrap();
        let Some(StageValue::Documents(documents)) = outputs.get("documents").cloned() else {
            panic!("no documents");
        };
        let outputs = dense.run(documents_input(documents)).unwrap();
        let Some(StageValue::Documents(documents)) = outputs.get("documents").cloned() else {
            panic!("no documents");
        };
        writer.run(documents_input(documents)).unwrap();

        assert_eq!(factory.store().count_documents().unwrap(), 1);

        let retriever = factory.create_retriever(store).unwrap();
        let embedder = MockDenseEmbedder::new(16);
        let query_vectors = embedder
            .embed_batch(&["atorvastatin 20mg".to_string()])
            .unwrap();
        let sparse_vectors = MockSparseEmbedder
            .embed_batch(&["atorvastatin 20mg".to_string()])
            .unwrap();
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "query_embedding".to_string(),
            StageValue::Embedding(query_vectors.into_iter().next().unwrap()),
        );
        inputs.insert(
            "query_sparse_embedding".to_string(),
            StageValue::SparseEmbedding(sparse_vectors.into_iter().next().unwrap()),
        );
        let outputs = retriever.run(inputs).unwrap();
        assert!(matches!(
            outputs.get("documents"),
            Some(StageValue::Documents(documents)) if documents.len() == 1
        ));
    }

    #[test]
    fn mock_factory_warms_up_reranker_on_creation() {
        let factory = MockComponentFactory::with_replies(Vec::new());
        assert_eq!(factory.reranker().warm_up_count(), 0);
        factory.create_reranker().unwrap();
        assert_eq!(factory.reranker().warm_up_count(), 1);
    }
}

//! Evaluation CLI.
//!
//! Loads `data/eval_dataset.json`, runs the first 10 items through the
//! query pipeline against the live stack, and prints the resulting report
//! as JSON.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use rxtract::config::{self, Settings};
use rxtract::evaluation::Evaluator;
use rxtract::pipeline::{
    ComponentFactory, PipelineFactory, PipelineService, ServiceComponentFactory,
};
use rxtract::seed;

const EVAL_ITEMS: usize = 10;

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let settings = Arc::new(Settings::from_env());
    let test_data = seed::load_medications(&settings.eval_dataset_path())
        .map_err(|e| format!("Failed to load evaluation data: {e}"))?;
    if test_data.is_empty() {
        tracing::warn!("Evaluation dataset is empty, nothing to evaluate");
        return Ok(());
    }

    let components = Arc::new(ServiceComponentFactory::new(Arc::clone(&settings)));
    let evaluator = Evaluator::new(PipelineService::new(PipelineFactory::new(
        components as Arc<dyn ComponentFactory>,
    )));

    let sample = &test_data[..test_data.len().min(EVAL_ITEMS)];
    let report = evaluator
        .run(sample)
        .await
        .map_err(|e| format!("Evaluation failed: {e}"))?;

    let rendered =
        serde_json::to_string_pretty(&report).map_err(|e| format!("Report serialization: {e}"))?;
    println!("{rendered}");
    Ok(())
}

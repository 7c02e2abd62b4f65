use forge_sdk::orchestrator::GenerationOutput;
use forge_sdk::{Forge, ForgeConfig, GenerationService, ReviewService};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Config with fast retries and no background loop
pub fn test_config() -> ForgeConfig {
    let mut config = ForgeConfig::default();
    config.memory.auto_consolidate = false;
    config.jobs.retry_backoff_ms = 1;
    config
}

pub fn forge(
    config: ForgeConfig,
    generator: Arc<dyn GenerationService>,
    reviewer: Option<Arc<dyn ReviewService>>,
) -> Forge {
    let mut builder = Forge::builder(config).generator(generator);
    if let Some(reviewer) = reviewer {
        builder = builder.reviewer(reviewer);
    }
    builder.build().unwrap()
}

/// Successful single-file output scored `quality` by the generator
pub fn html_output(quality: f64) -> GenerationOutput {
    let mut artifacts = BTreeMap::new();
    artifacts.insert("index.html".to_string(), "<main><form></form></main>".to_string());
    GenerationOutput::success(artifacts).with_quality(quality)
}

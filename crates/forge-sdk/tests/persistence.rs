mod common;

use common::{html_output, test_config};
use forge_sdk::curriculum::TaskDefinition;
use forge_sdk::orchestrator::fixtures::{FixedReviewer, ScriptedGenerator};
use forge_sdk::types::Difficulty;
use forge_sdk::{CurriculumConfig, Forge, ForgeConfig, GenerationRequest};
use std::sync::Arc;
use tempfile::TempDir;

fn sqlite_config(dir: &TempDir) -> ForgeConfig {
    let mut config = test_config();
    config.database_path = Some(dir.path().join("forge.db"));
    config.memory.short_term_capacity = 2;
    config.curriculum = CurriculumConfig {
        tasks: Some(vec![TaskDefinition::new("landing", "ui", Difficulty::Beginner)]),
        ..Default::default()
    };
    config
}

fn open(config: ForgeConfig) -> Forge {
    Forge::builder(config)
        .generator(Arc::new(ScriptedGenerator::always(html_output(80.0))))
        .reviewer(Arc::new(FixedReviewer::new(85.0)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    let (pattern_ids, stat_rows) = {
        let forge = open(sqlite_config(&dir));
        for _ in 0..6 {
            let resp = forge
                .handle(GenerationRequest::new("product landing page", "ui").with_task("landing"))
                .await;
            assert!(resp.success);
            forge.wait_idle().await;
        }
        let result = forge.consolidate().await.unwrap();
        assert_eq!(result.created_patterns.len(), 1);
        assert!(result.persist_failures.is_empty());
        forge.shutdown().await;

        let ids: Vec<String> = forge.memory().patterns().unwrap().into_iter().map(|p| p.id).collect();
        (ids, forge.selector().stats().all().unwrap())
    };

    let forge = open(sqlite_config(&dir));
    assert_eq!(forge.memory().history(100).unwrap().len(), 6);
    let restored: Vec<String> = forge.memory().patterns().unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(restored, pattern_ids);

    let task = forge.curriculum().task("landing").unwrap();
    assert_eq!(task.attempts(), 6);
    assert!(task.mastered());

    let restored_rows = forge.selector().stats().all().unwrap();
    assert_eq!(restored_rows.len(), stat_rows.len());
    for (restored, original) in restored_rows.iter().zip(&stat_rows) {
        assert_eq!(restored.key(), original.key());
        assert_eq!(restored.usage_count, original.usage_count);
        assert!((restored.avg_quality - original.avg_quality).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_restored_patterns_are_offered_to_the_generator() {
    let dir = TempDir::new().unwrap();
    {
        let forge = open(sqlite_config(&dir));
        for _ in 0..6 {
            forge.handle(GenerationRequest::new("product landing page", "ui")).await;
            forge.wait_idle().await;
        }
        forge.consolidate().await.unwrap();
        forge.shutdown().await;
    }

    let generator = Arc::new(ScriptedGenerator::always(html_output(80.0)));
    let forge = Forge::builder(sqlite_config(&dir))
        .generator(generator.clone())
        .build()
        .unwrap();
    forge.handle(GenerationRequest::new("landing page for a bakery", "ui")).await;

    let inputs = generator.inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].relevant_patterns.len(), 1);
    assert_eq!(inputs[0].relevant_patterns[0].domain, "ui");
}

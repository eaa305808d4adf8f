use std::sync::Arc;

use tierwise_foundation::backend::SimulatedLoader;
use tierwise_foundation::classifier::{ClassifierArtifact, TaskClassifier};
use tierwise_foundation::{RegistryConfig, TaskComplexity};
use tierwise_kernel::{ComplexityClassifier, ComplexityLabel, ModelTier, RouteMode, RoutingError};
use tierwise_testing::{
    GB, ProxyHarness, ScriptedClassifier, assert_routed, keyword_artifact,
    legacy_keyword_artifact, write_artifact,
};

fn keyword_classifier() -> Arc<TaskClassifier> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(
        dir.path(),
        "classifier.json",
        &ClassifierArtifact::Current(keyword_artifact()),
    );
    Arc::new(TaskClassifier::from_path(&path).unwrap())
}

#[tokio::test]
async fn trained_classifier_routes_by_keyword() {
    let harness = ProxyHarness::new(keyword_classifier());
    let proxy = &harness.proxy;

    let result = proxy
        .adaptive_generate("What is the capital of France?", RouteMode::Adaptive)
        .await
        .unwrap();
    assert_routed!(result, ModelTier::Small);
    assert_eq!(result.task_complexity, TaskComplexity::Label(ComplexityLabel::Simple));

    let result = proxy
        .adaptive_generate("Prove the theorem for all n", RouteMode::Adaptive)
        .await
        .unwrap();
    assert_routed!(result, ModelTier::Large);
    assert_eq!(result.memory_saved_bytes, 0);

    let result = proxy
        .adaptive_generate("hello there", RouteMode::Adaptive)
        .await
        .unwrap();
    assert_routed!(result, ModelTier::Tiny);
}

#[tokio::test]
async fn split_verdict_is_served_as_medium() {
    let harness = ProxyHarness::new(keyword_classifier());
    let result = harness
        .proxy
        .adaptive_generate("Explain the theorem", RouteMode::Adaptive)
        .await
        .unwrap();

    assert_routed!(result, ModelTier::Mid);
    assert_eq!(result.task_complexity.as_str(), "medium");
    assert!(result.confidence.unwrap() < 0.6);
}

#[test]
fn legacy_and_current_artifacts_agree() {
    let current = TaskClassifier::from_artifact(ClassifierArtifact::Current(keyword_artifact())).unwrap();
    let legacy =
        TaskClassifier::from_artifact(ClassifierArtifact::Legacy(legacy_keyword_artifact())).unwrap();

    for prompt in ["capital of France", "prove it", "explain tides", "xyz"] {
        let a = current.classify(prompt).unwrap();
        let b = legacy.classify(prompt).unwrap();
        assert_eq!(a.argmax().0, b.argmax().0, "prompt {prompt:?}");
    }
}

#[test]
fn migrated_legacy_artifact_loads_as_current() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_path = write_artifact(
        dir.path(),
        "legacy.json",
        &ClassifierArtifact::Legacy(legacy_keyword_artifact()),
    );
    let out = dir.path().join("current.json");

    tierwise_gateway::commands::migrate_classifier(&legacy_path, &out).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(raw.is_object());
    assert_eq!(raw["features"], serde_json::json!(["char_count"]));

    let migrated = TaskClassifier::from_path(&out).unwrap();
    let (label, _) = migrated.classify("capital of France").unwrap().argmax();
    assert_eq!(label, ComplexityLabel::Simple);
}

#[tokio::test]
async fn cache_keeps_the_two_most_recent_tiers() {
    let harness = ProxyHarness::new(Arc::new(ScriptedClassifier::new()));
    let proxy = &harness.proxy;

    for tier in [ModelTier::Tiny, ModelTier::Small, ModelTier::Tiny, ModelTier::Mid] {
        let result = proxy.adaptive_generate("hi", RouteMode::Tier(tier)).await.unwrap();
        assert_routed!(result, tier);
    }

    let registry = proxy.registry();
    assert_eq!(registry.lru_order(), vec![ModelTier::Tiny, ModelTier::Mid]);
    assert_eq!(harness.loader.loads(), 3);
    assert_eq!(harness.loader.unloads(), 1);
}

#[tokio::test]
async fn memory_pressure_returns_error_and_recovers() {
    let harness = ProxyHarness::new(Arc::new(ScriptedClassifier::new()));
    // Small needs 16 GB * 1.5 = 24 GB strictly below what is available.
    harness.probe.set_available(24 * GB);

    let result = harness
        .proxy
        .adaptive_generate("hi", RouteMode::Adaptive)
        .await
        .unwrap();
    let failure = result.error.clone().unwrap();
    assert!(matches!(
        failure.error,
        RoutingError::InsufficientMemory { shortfall_bytes: 1, .. }
    ));

    harness.probe.set_available(24 * GB + 1);
    let result = harness
        .proxy
        .adaptive_generate("hi", RouteMode::Adaptive)
        .await
        .unwrap();
    assert_routed!(result, ModelTier::Small);

    let stats = harness.proxy.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.model_usage.values().sum::<u64>(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_load() {
    let loader = SimulatedLoader::new().with_load_delay(std::time::Duration::from_millis(50));
    let harness = ProxyHarness::with_loader(
        Arc::new(ScriptedClassifier::new().always(ComplexityLabel::Complex)),
        RegistryConfig::default(),
        loader,
    );

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let proxy = harness.proxy.clone();
            tokio::spawn(async move {
                proxy
                    .adaptive_generate(&format!("request {i}"), RouteMode::Adaptive)
                    .await
            })
        })
        .collect();
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_routed!(result, ModelTier::Large);
    }

    assert_eq!(harness.loader.loads(), 1);
    let stats = harness.proxy.stats();
    assert_eq!(stats.total_requests, 16);
    assert_eq!(stats.model_usage.get(&ModelTier::Large), Some(&16));
}

#[tokio::test]
async fn classifier_failure_is_not_error_shaped() {
    let classifier = Arc::new(ScriptedClassifier::new());
    let harness = ProxyHarness::new(classifier.clone());
    classifier.fail_with(RoutingError::ClassifierFormatError("bad weights".into()));

    let err = harness
        .proxy
        .adaptive_generate("hi", RouteMode::Adaptive)
        .await
        .unwrap_err();
    assert!(err.is_classifier_failure());

    // Pinned routes never touch the classifier.
    let result = harness
        .proxy
        .adaptive_generate("hi", RouteMode::Complexity(ComplexityLabel::VerySimple))
        .await
        .unwrap();
    assert_routed!(result, ModelTier::Tiny);
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn shutdown_unloads_every_tier() {
    let harness = ProxyHarness::new(Arc::new(ScriptedClassifier::new()));
    for tier in [ModelTier::Tiny, ModelTier::Small] {
        harness.proxy.adaptive_generate("hi", RouteMode::Tier(tier)).await.unwrap();
    }
    harness.proxy.shutdown().await;

    assert!(harness.proxy.registry().is_empty());
    assert_eq!(harness.loader.unloads(), 2);
}

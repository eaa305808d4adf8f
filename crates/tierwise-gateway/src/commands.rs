//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use error_stack::Report;
use tracing::{info, warn};

use tierwise_foundation::classifier::TaskClassifier;
use tierwise_foundation::routing;
use tierwise_foundation::{ModelRegistry, SystemMemoryProbe};
use tierwise_kernel::{ComplexityClassifier, KernelError, ModelTier};

use crate::config::AppConfig;
use crate::server::GatewayServer;

fn report(err: Report<KernelError>) -> anyhow::Error {
    anyhow!("{err:?}")
}

/// `tierwise serve`
pub async fn serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load(config_path).map_err(report)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        addr = %config.bind_address(),
        classifier = %config.classifier.path.display(),
        backend = ?config.backend.kind,
        cache_capacity = config.registry.cache_capacity,
        "Starting tierwise"
    );
    let proxy = config.proxy().build().map_err(report)?;

    GatewayServer::new(config.bind_address(), Arc::new(proxy), config.server.api_key.clone())
        .start()
        .await
        .context("gateway server failed")
}

/// `tierwise classify <prompt>`
pub fn classify(config_path: Option<&Path>, prompt: &str) -> anyhow::Result<()> {
    let config = AppConfig::load(config_path).map_err(report)?;
    let classifier = TaskClassifier::from_path(&config.classifier.path).with_context(|| {
        format!("loading classifier from {}", config.classifier.path.display())
    })?;

    let distribution = classifier.classify(prompt)?;
    let result =
        classifier.classify_with_confidence(prompt, config.classifier.confidence_threshold)?;
    let label = result.resolved_label();

    for (label, prob) in distribution.iter() {
        println!("{:>12}  {:.3}", label.as_str(), prob);
    }
    if result.is_uncertain() {
        println!(
            "verdict: uncertain (best guess {} at {:.3}), routed as {}",
            result.best_guess, result.confidence, label
        );
    } else {
        println!("verdict: {} ({:.3})", label, result.confidence);
    }
    println!("tier: {}", routing::tier_for(label));
    Ok(())
}

/// `tierwise warm <tier|all>`
///
/// Tiers are loaded one at a time and released after the test prompt so
/// the largest ones never share memory.
pub async fn warm(config_path: Option<&Path>, tier: &str, prompt: &str) -> anyhow::Result<()> {
    let config = AppConfig::load(config_path).map_err(report)?;
    let proxy_config = config.proxy();

    let tiers: Vec<ModelTier> = if tier.trim().eq_ignore_ascii_case("all") {
        proxy_config.tiers.keys().copied().collect()
    } else {
        vec![tier.parse::<ModelTier>()?]
    };

    let registry = ModelRegistry::new(
        proxy_config.registry.to_registry_config(),
        proxy_config.tier_table(),
        proxy_config.backend.build_loader().map_err(report)?,
        Arc::new(SystemMemoryProbe::new()),
    );

    let mut failures = 0usize;
    for tier in tiers {
        let started = Instant::now();
        let handle = match registry.acquire(tier).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Warm-up load failed");
                println!("{tier}: load failed: {e}");
                failures += 1;
                continue;
            }
        };
        let load_time = started.elapsed();
        let backend = handle.describe().await;

        let started = Instant::now();
        match handle.generate(prompt).await {
            Ok(text) => println!(
                "{tier} ({backend}): loaded in {:.2}s, generated in {:.2}s: {}",
                load_time.as_secs_f64(),
                started.elapsed().as_secs_f64(),
                text.trim()
            ),
            Err(e) => {
                println!(
                    "{tier} ({backend}): loaded in {:.2}s, generation failed: {e}",
                    load_time.as_secs_f64()
                );
                failures += 1;
            }
        }
        drop(handle);
        registry.release_tier(tier).await;
    }

    if failures > 0 {
        return Err(anyhow!("{failures} tier(s) failed to warm"));
    }
    Ok(())
}

/// `tierwise migrate-classifier <in> <out>`
pub fn migrate_classifier(input: &Path, output: &Path) -> anyhow::Result<()> {
    let classifier = TaskClassifier::from_path(input)
        .with_context(|| format!("loading classifier from {}", input.display()))?;
    classifier.save_model(output).map_err(report)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        labels = classifier.labels().len(),
        "Classifier migrated"
    );
    Ok(())
}

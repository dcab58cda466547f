//! End-to-end tests against a live Docker daemon
//!
//! Tests are feature-gated behind `docker-tests` and talk to the daemon at
//! `DOCKER_HOST` (default: the local daemon socket).
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features docker-tests --test e2e_docker
//! DOCKER_HOST=tcp://127.0.0.1:2375 cargo test --features docker-tests --test e2e_docker
//! ```

#![cfg(feature = "docker-tests")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use parallel_pull::{
    CancellationToken, Config, FailureKind, Orchestrator, Registry, RegistryConfig, cleanup,
    registry,
};
use std::sync::Arc;

fn client() -> Arc<dyn Registry> {
    let endpoint = std::env::var("DOCKER_HOST")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| RegistryConfig::default().endpoint);
    registry::connect(&RegistryConfig { endpoint }).unwrap()
}

#[tokio::test]
async fn daemon_answers_ping() {
    client().ping().await.unwrap();
}

#[tokio::test]
async fn pulls_small_images_and_cleans_up() {
    let client = client();
    let config = Config {
        max_concurrency: 2,
        max_retries: 1,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(client.clone(), &config).unwrap();

    let tasks = vec![
        "hello-world:latest".to_string(),
        "busybox:latest".to_string(),
        "does-not-exist-parallel-pull:nope".to_string(),
    ];
    let report = orchestrator.run(tasks, &CancellationToken::new()).await;

    assert!(report.results[0].succeeded, "{:?}", report.results[0]);
    assert!(report.results[1].succeeded, "{:?}", report.results[1]);
    assert!(report.results[0].content_digest.is_some());
    assert_eq!(report.results[2].failure_kind, Some(FailureKind::Exhausted));
    assert_eq!(report.results[2].attempts_used, 2);

    let summary = cleanup::remove_pulled(client.as_ref(), &report.results).await;
    assert_eq!(summary.failed, 0);
}

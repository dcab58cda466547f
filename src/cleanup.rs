//! Removal of pulled images after a run

use crate::registry::Registry;
use crate::security::sanitize;
use crate::types::TaskResult;

/// Counts from a cleanup pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Images removed
    pub removed: usize,
    /// Images that were already gone
    pub missing: usize,
    /// Images whose removal failed
    pub failed: usize,
}

/// Remove every successfully pulled image, one at a time
///
/// A missing image counts as cleaned up. Other failures are logged and
/// counted but never abort the pass.
pub async fn remove_pulled(registry: &dyn Registry, results: &[TaskResult]) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    for result in results.iter().filter(|r| r.succeeded) {
        let shown = sanitize(&result.task);
        match registry.remove(&result.task).await {
            Ok(()) => {
                tracing::debug!(identifier = %shown, "Removed image");
                summary.removed += 1;
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(identifier = %shown, "Image already removed");
                summary.missing += 1;
            }
            Err(e) => {
                tracing::warn!(
                    identifier = %shown,
                    error = %sanitize(&e.to_string()),
                    "Failed to remove image"
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        removed = summary.removed,
        missing = summary.missing,
        failed = summary.failed,
        "Cleanup finished"
    );
    summary
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::registry::DockerEngineClient;
    use crate::types::FailureKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn removes_only_successful_pulls_and_tolerates_missing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/images/alpine"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/images/busybox"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/images/nginx"))
            .respond_with(ResponseTemplate::new(409).set_body_string("image in use"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/images/broken"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = DockerEngineClient::new(&RegistryConfig {
            endpoint: server.uri(),
        })
        .unwrap();

        let ok = |name: &str| TaskResult::success(name, 1, Duration::ZERO, 1, None);
        let results = vec![
            ok("alpine"),
            ok("busybox"),
            ok("nginx"),
            TaskResult::failure("broken", FailureKind::Exhausted, 2, Duration::ZERO, "boom"),
        ];

        let summary = remove_pulled(&client, &results).await;
        assert_eq!(
            summary,
            CleanupSummary {
                removed: 1,
                missing: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn logs_redact_registry_host_addresses() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/images/10.0.0.1:5000/app:v1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DockerEngineClient::new(&RegistryConfig {
            endpoint: server.uri(),
        })
        .unwrap();
        let results = vec![TaskResult::success(
            "10.0.0.1:5000/app:v1",
            1,
            Duration::ZERO,
            1,
            None,
        )];

        let (logs, _guard) = crate::test_support::CapturedLogs::install();
        let summary = remove_pulled(&client, &results).await;
        assert_eq!(summary.removed, 1);

        let output = logs.contents();
        assert!(output.contains("[IP_REDACTED]:5000/app:v1"), "{output}");
        assert!(!output.contains("10.0.0.1"), "{output}");
    }
}

//! 外部包仓库客户端
//!
//! 查询包的最新发布版本。临时失败按线性退避重试，未知包不重试。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};

/// 包版本查询
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// `package` 的最新发布版本
    ///
    /// # Errors
    /// 包不存在或仓库不可达时返回 `AppError::ExternalLookupError`。
    async fn resolve_latest_version(&self, package: &str) -> AppResult<String>;
}

/// pub.dev API 客户端（`GET {base}/{package}`）
pub struct PubDevRegistry {
    base_url: String,
    http_client: reqwest::Client,
    attempts: u32,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    latest: LatestVersion,
}

#[derive(Debug, Deserialize)]
struct LatestVersion {
    version: String,
}

/// 单次请求尝试的结果
enum Attempt {
    Done(AppResult<String>),
    Retry(String),
}

impl PubDevRegistry {
    /// 根据配置创建客户端
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.package_lookup_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(
            config.package_registry_url.clone(),
            http_client,
            config.package_lookup_retries,
        ))
    }

    pub fn with_client(base_url: String, http_client: reqwest::Client, attempts: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            attempts: attempts.max(1),
            backoff: Duration::from_millis(200),
        }
    }

    /// 覆盖两次尝试之间的基础延迟
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn attempt(&self, package: &str) -> Attempt {
        let url = format!("{}/{}", self.base_url, package);

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(format!("无法连接到包仓库: {}", e)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Attempt::Done(Err(AppError::ExternalLookupError(format!(
                "Failed to fetch package {} from pub.dev",
                package
            ))));
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry(format!("包仓库返回 HTTP {}", status));
        }
        if !status.is_success() {
            return Attempt::Done(Err(AppError::ExternalLookupError(format!(
                "包仓库返回 HTTP {} ({})",
                status, package
            ))));
        }

        Attempt::Done(
            response
                .json::<PackageInfo>()
                .await
                .map(|info| info.latest.version)
                .map_err(|e| AppError::ExternalLookupError(format!("包仓库返回无效响应: {}", e))),
        )
    }
}

#[async_trait]
impl PackageRegistry for PubDevRegistry {
    async fn resolve_latest_version(&self, package: &str) -> AppResult<String> {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.attempt(package).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(reason) => {
                    tracing::warn!(package = %package, attempt, error = %reason, "包版本查询失败");
                    last_error = reason;
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        Err(AppError::ExternalLookupError(format!(
            "{} (after {} attempts)",
            last_error, self.attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    /// 假包仓库；`left_pad` 先失败 `flaky` 次再返回结果
    async fn fake_registry(flaky: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/packages/{name}",
            get(move |Path(name): Path<String>| {
                let counter = counter.clone();
                async move {
                    let seen = counter.fetch_add(1, Ordering::SeqCst);
                    match name.as_str() {
                        "left_pad" if seen < flaky => {
                            (StatusCode::SERVICE_UNAVAILABLE, Json(Value::Null))
                        }
                        "left_pad" => (
                            StatusCode::OK,
                            Json(json!({"name": "left_pad", "latest": {"version": "1.3.0"}})),
                        ),
                        "garbage" => (StatusCode::OK, Json(json!({"nope": true}))),
                        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/api/packages", addr), hits)
    }

    fn registry(base_url: String, attempts: u32) -> PubDevRegistry {
        PubDevRegistry::with_client(base_url, reqwest::Client::new(), attempts)
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_resolves_latest_version() {
        let (url, hits) = fake_registry(0).await;
        let version = registry(url, 3).resolve_latest_version("left_pad").await.unwrap();
        assert_eq!(version, "1.3.0");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_package_is_not_retried() {
        let (url, hits) = fake_registry(0).await;
        let err = registry(url, 3)
            .resolve_latest_version("no_such_pkg")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalLookupError(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (url, hits) = fake_registry(2).await;
        let version = registry(url, 3).resolve_latest_version("left_pad").await.unwrap();
        assert_eq!(version, "1.3.0");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_configured_attempts() {
        let (url, hits) = fake_registry(10).await;
        let err = registry(url, 2)
            .resolve_latest_version("left_pad")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalLookupError(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_lookup_error() {
        let (url, _) = fake_registry(0).await;
        let err = registry(url, 3).resolve_latest_version("garbage").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalLookupError(_)));
    }
}

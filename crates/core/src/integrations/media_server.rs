//! Media-server library refresh (notify-all model).
//!
//! After a subtitle lands on disk, every configured media server is told to
//! re-scan the affected item, in parallel, each behind its own circuit
//! breaker. One failing server never blocks the others or the pipeline; the
//! caller gets a summary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::breaker::BreakerRegistry;
use crate::config::{MediaServerConfig, MediaServerKind};

use super::IntegrationError;

/// Breaker kind for media servers.
pub const BREAKER_KIND: &str = "media_server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    Episode,
    Movie,
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    fn instance_name(&self) -> &str;

    async fn refresh_item(&self, path: &str, kind: RefreshKind) -> Result<(), IntegrationError>;

    async fn health_check(&self) -> (bool, String);
}

/// Summary of a notify-all round.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<RefreshFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub instance: String,
    pub error: String,
}

pub struct MediaServerManager {
    servers: Vec<Arc<dyn MediaServer>>,
    breakers: Arc<BreakerRegistry>,
}

impl MediaServerManager {
    pub fn new(servers: Vec<Arc<dyn MediaServer>>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { servers, breakers }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Notify every server in parallel. Per-instance errors are logged,
    /// counted against that instance's breaker and returned in the summary;
    /// this method itself never fails.
    pub async fn refresh_all(&self, path: &str, kind: RefreshKind) -> RefreshSummary {
        let mut summary = RefreshSummary {
            total: self.servers.len(),
            ..Default::default()
        };

        let refreshes = self.servers.iter().filter_map(|server| {
            let breaker = self.breakers.get(BREAKER_KIND, server.instance_name());
            if !breaker.allow() {
                summary.skipped += 1;
                tracing::debug!(
                    instance = server.instance_name(),
                    "Skipping media server, breaker open"
                );
                return None;
            }
            let server = Arc::clone(server);
            let path = path.to_string();
            Some(async move {
                let result = server.refresh_item(&path, kind).await;
                (server.instance_name().to_string(), result)
            })
        });

        let results = futures::future::join_all(refreshes).await;
        for (instance, result) in results {
            let breaker = self.breakers.get(BREAKER_KIND, &instance);
            match result {
                Ok(()) => {
                    breaker.record_success();
                    summary.succeeded += 1;
                }
                Err(e) => {
                    breaker.record_failure();
                    tracing::warn!(instance = %instance, error = %e, "Media server refresh failed");
                    summary.failed.push(RefreshFailure {
                        instance,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary
    }
}

// --- Plex-compatible ---------------------------------------------------

pub struct PlexServer {
    name: String,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PlexServer {
    pub fn new(config: &MediaServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }
}

#[async_trait]
impl MediaServer for PlexServer {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn refresh_item(&self, path: &str, _kind: RefreshKind) -> Result<(), IntegrationError> {
        let folder = std::path::Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        let url = format!(
            "{}/library/sections/all/refresh?path={}&X-Plex-Token={}",
            self.base_url,
            urlencoding::encode(&folder),
            urlencoding::encode(&self.token),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IntegrationError::Api(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> (bool, String) {
        let url = format!("{}/identity?X-Plex-Token={}", self.base_url, self.token);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}

// --- Jellyfin-compatible -----------------------------------------------

pub struct JellyfinServer {
    name: String,
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl JellyfinServer {
    pub fn new(config: &MediaServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }
}

#[async_trait]
impl MediaServer for JellyfinServer {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn refresh_item(&self, path: &str, _kind: RefreshKind) -> Result<(), IntegrationError> {
        let body = serde_json::json!({
            "Updates": [{"Path": path, "UpdateType": "Modified"}]
        });
        let response = self
            .client
            .post(format!("{}/Library/Media/Updated", self.base_url))
            .header("X-Emby-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 {
            return Err(IntegrationError::Auth("HTTP 401".to_string()));
        }
        if !response.status().is_success() {
            return Err(IntegrationError::Api(format!("HTTP {}", status)));
        }
        Ok(())
    }

    async fn health_check(&self) -> (bool, String) {
        let url = format!("{}/System/Info/Public", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("HTTP {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }
}

/// Build media-server instances from configuration.
pub fn build_media_servers(configs: &[MediaServerConfig]) -> Vec<Arc<dyn MediaServer>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| -> Arc<dyn MediaServer> {
            match c.kind {
                MediaServerKind::Plex => Arc::new(PlexServer::new(c)),
                MediaServerKind::Jellyfin => Arc::new(JellyfinServer::new(c)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::testing::MockMediaServer;

    fn manager(servers: Vec<Arc<dyn MediaServer>>) -> MediaServerManager {
        MediaServerManager::new(
            servers,
            Arc::new(BreakerRegistry::new(BreakerConfig {
                failure_threshold: 2,
                cooldown: std::time::Duration::from_secs(60),
            })),
        )
    }

    #[tokio::test]
    async fn test_refresh_all_counts_successes_and_failures() {
        let ok = MockMediaServer::new("plex");
        let bad = MockMediaServer::new("jellyfin").failing();
        let manager = manager(vec![Arc::new(ok), Arc::new(bad)]);

        let summary = manager
            .refresh_all("/m/Show/S01E01.mkv", RefreshKind::Episode)
            .await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].instance, "jellyfin");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let bad = MockMediaServer::new("bad").failing();
        let ok = MockMediaServer::new("ok");
        let calls = ok.call_count();
        let manager = manager(vec![Arc::new(bad), Arc::new(ok)]);

        manager.refresh_all("/m/x.mkv", RefreshKind::Movie).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_instance() {
        let bad = MockMediaServer::new("flaky").failing();
        let calls = bad.call_count();
        let manager = manager(vec![Arc::new(bad)]);

        // Two failures open the breaker; the third round skips entirely
        manager.refresh_all("/m/x.mkv", RefreshKind::Movie).await;
        manager.refresh_all("/m/x.mkv", RefreshKind::Movie).await;
        let summary = manager.refresh_all("/m/x.mkv", RefreshKind::Movie).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.succeeded, 0);
    }

    #[test]
    fn test_build_media_servers_skips_disabled() {
        let configs = vec![
            MediaServerConfig {
                kind: MediaServerKind::Plex,
                name: "plex".to_string(),
                url: "http://plex:32400".to_string(),
                token: "t".to_string(),
                enabled: true,
            },
            MediaServerConfig {
                kind: MediaServerKind::Jellyfin,
                name: "jf".to_string(),
                url: "http://jf:8096".to_string(),
                token: "t".to_string(),
                enabled: false,
            },
        ];
        assert_eq!(build_media_servers(&configs).len(), 1);
    }
}

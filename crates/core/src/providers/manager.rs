//! Provider manager: parallel multi-source search with caching, breakers,
//! client-side filtering and scoring.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::breaker::BreakerRegistry;
use crate::store::{BlacklistStore, ProviderCacheStore, StoreError};
use crate::subtitle::{AssDocument, SrtFile, SubtitleFormat};

use super::forced::is_forced_result;
use super::scoring::{compute_score, ScoringEngine};
use super::types::{
    DownloadedSubtitle, ProviderError, SearchOutcome, SubtitleProvider, SubtitleResult, VideoQuery,
};

/// Cache TTL for provider search results.
pub const CACHE_TTL_SECS: i64 = 3600;

/// Breaker kind for providers.
pub const BREAKER_KIND: &str = "provider";

/// Longest wait honored from a Retry-After header before giving up the round.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProviderStats {
    pub searches: u64,
    pub results: u64,
    pub downloads: u64,
    pub failures: u64,
}

pub struct ProviderManager {
    providers: Vec<Arc<dyn SubtitleProvider>>,
    cache: ProviderCacheStore,
    blacklist: BlacklistStore,
    scoring: Arc<ScoringEngine>,
    breakers: Arc<BreakerRegistry>,
    stats: Mutex<HashMap<String, ProviderStats>>,
}

impl ProviderManager {
    pub fn new(
        providers: Vec<Arc<dyn SubtitleProvider>>,
        cache: ProviderCacheStore,
        blacklist: BlacklistStore,
        scoring: Arc<ScoringEngine>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            providers,
            cache,
            blacklist,
            scoring,
            breakers,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<dyn SubtitleProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn stats(&self) -> HashMap<String, ProviderStats> {
        self.stats.lock().unwrap().clone()
    }

    fn bump_stats(&self, provider: &str, f: impl FnOnce(&mut ProviderStats)) {
        let mut stats = self.stats.lock().unwrap();
        f(stats.entry(provider.to_string()).or_default());
    }

    fn cache_key(provider: &str, query: &VideoQuery) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update(b"|");
        hasher.update(query.target_language.as_bytes());
        hasher.update(b"|");
        hasher.update(query.canonical_form().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Search all enabled providers in parallel.
    ///
    /// Per-provider failures are absorbed here: they open breakers, land in
    /// `provider_errors` and surface upstream only as fewer results.
    pub async fn search(&self, query: &VideoQuery) -> Result<SearchOutcome, StoreError> {
        let started = Instant::now();
        let mut merged: Vec<SubtitleResult> = Vec::new();
        let mut provider_errors: HashMap<String, String> = HashMap::new();
        let mut cache_hits: Vec<String> = Vec::new();
        let mut pending: Vec<&Arc<dyn SubtitleProvider>> = Vec::new();

        for provider in &self.providers {
            let key = Self::cache_key(provider.name(), query);
            if let Some(raw) = self.cache.get(&key)? {
                match serde_json::from_str::<Vec<SubtitleResult>>(&raw) {
                    Ok(results) => {
                        cache_hits.push(provider.name().to_string());
                        merged.extend(results);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(provider = provider.name(), "Bad cache entry: {}", e);
                    }
                }
            }

            let breaker = self.breakers.get(BREAKER_KIND, provider.name());
            if !breaker.allow() {
                provider_errors
                    .insert(provider.name().to_string(), "circuit breaker open".to_string());
                continue;
            }
            pending.push(provider);
        }

        let searches = pending.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let query = query.clone();
            async move {
                let name = provider.name().to_string();
                let mut result = provider.search(&query).await;

                // One bounded retry on rate limiting
                if let Err(ProviderError::RateLimit { retry_after_secs }) = &result {
                    let wait = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(Duration::from_secs(2))
                        .min(MAX_RATE_LIMIT_WAIT);
                    tokio::time::sleep(wait).await;
                    result = provider.search(&query).await;
                }

                (name, result)
            }
        });

        let results = futures::future::join_all(searches).await;

        for (name, result) in results {
            let breaker = self.breakers.get(BREAKER_KIND, &name);
            self.bump_stats(&name, |s| s.searches += 1);
            match result {
                Ok(results) => {
                    breaker.record_success();
                    let key_query = query.clone();
                    let key = Self::cache_key(&name, &key_query);
                    if let Ok(serialized) = serde_json::to_string(&results) {
                        self.cache.put(&key, &serialized, CACHE_TTL_SECS)?;
                    }
                    self.bump_stats(&name, |s| s.results += results.len() as u64);
                    merged.extend(results);
                }
                Err(ProviderError::Empty) => {
                    // A clean zero-result response is healthy
                    breaker.record_success();
                    let key = Self::cache_key(&name, query);
                    self.cache.put(&key, "[]", CACHE_TTL_SECS)?;
                }
                Err(e) => {
                    breaker.record_failure();
                    self.bump_stats(&name, |s| s.failures += 1);
                    tracing::warn!(provider = %name, error = %e, "Provider search failed");
                    provider_errors.insert(name, e.to_string());
                }
            }
        }

        // Blacklist filter by content hash
        let mut filtered = Vec::with_capacity(merged.len());
        for result in merged {
            let blacklisted = match &result.hash {
                Some(hash) => self.blacklist.contains(hash)?,
                None => false,
            };
            if !blacklisted {
                filtered.push(result);
            }
        }

        // Forced post-filter: forced searches keep only forced results,
        // regular searches drop them.
        let mut filtered: Vec<SubtitleResult> = filtered
            .into_iter()
            .filter(|r| is_forced_result(r) == query.forced_only)
            .map(|mut r| {
                r.forced = query.forced_only;
                r
            })
            .collect();

        // Score and rank
        let snapshot = self.scoring.snapshot()?;
        for result in &mut filtered {
            result.score = compute_score(&snapshot, result, query);
        }
        filtered.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| format_rank(a.format).cmp(&format_rank(b.format)))
                .then_with(|| {
                    let a_mod = snapshot.provider_modifiers.get(&a.provider_name).copied().unwrap_or(0);
                    let b_mod = snapshot.provider_modifiers.get(&b.provider_name).copied().unwrap_or(0);
                    b_mod.cmp(&a_mod)
                })
                .then_with(|| b.uploader_trust.cmp(&a.uploader_trust))
        });

        Ok(SearchOutcome {
            results: filtered,
            duration_ms: started.elapsed().as_millis() as u64,
            provider_errors,
            cache_hits,
        })
    }

    /// Download a chosen result, unpack archives, and validate the payload
    /// parses as a known subtitle format.
    pub async fn download(
        &self,
        result: &SubtitleResult,
    ) -> Result<DownloadedSubtitle, ProviderError> {
        let provider = self
            .provider(&result.provider_name)
            .ok_or_else(|| ProviderError::Parse(format!("unknown provider {}", result.provider_name)))?;

        let breaker = self.breakers.get(BREAKER_KIND, provider.name());
        if !breaker.allow() {
            return Err(ProviderError::Network("circuit breaker open".to_string()));
        }

        let bytes = match provider.download(result).await {
            Ok(bytes) => bytes,
            Err(e) => {
                breaker.record_failure();
                self.bump_stats(provider.name(), |s| s.failures += 1);
                return Err(e);
            }
        };

        let name_hint = result
            .download_url
            .rsplit('/')
            .next()
            .unwrap_or("subtitle");
        let extracted = crate::subtitle::extract_subtitles(&bytes, name_hint)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        // Prefer a file in the advertised format
        let best = extracted
            .iter()
            .find(|f| f.format == result.format)
            .or_else(|| extracted.first())
            .cloned();

        let Some(file) = best else {
            breaker.record_failure();
            return Err(ProviderError::Parse("artifact contains no subtitle".to_string()));
        };

        // Validate the payload actually parses as its format
        let valid = match file.format {
            SubtitleFormat::Ass | SubtitleFormat::Ssa => AssDocument::parse(&file.content).is_ok(),
            SubtitleFormat::Srt => SrtFile::parse(&file.content).is_ok(),
            SubtitleFormat::Vtt => true,
        };
        if !valid {
            breaker.record_failure();
            return Err(ProviderError::Parse(format!(
                "downloaded file does not parse as {}",
                file.format.extension()
            )));
        }

        breaker.record_success();
        self.bump_stats(provider.name(), |s| s.downloads += 1);

        let mut hasher = Sha256::new();
        hasher.update(file.content.as_bytes());

        Ok(DownloadedSubtitle {
            content: file.content,
            format: file.format,
            content_hash: format!("{:x}", hasher.finalize()),
            provider_name: provider.name().to_string(),
        })
    }

    /// Run health checks against every provider.
    pub async fn test_all(&self) -> Vec<(String, bool, String)> {
        let checks = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let (healthy, message) = provider.health_check().await;
                (provider.name().to_string(), healthy, message)
            }
        });
        futures::future::join_all(checks).await
    }
}

fn format_rank(format: SubtitleFormat) -> u8 {
    match format {
        SubtitleFormat::Ass | SubtitleFormat::Ssa => 0,
        SubtitleFormat::Srt => 1,
        SubtitleFormat::Vtt => 2,
    }
}

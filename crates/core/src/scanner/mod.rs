//! The wanted scanner.
//!
//! Reconciles the external inventories against what exists on disk and
//! derives the missing `(file, target_language, subtitle_type)` triples.
//! Incremental scans probe only changed items; every K-th cycle runs a full
//! scan, which is also the only mode that cleans up orphaned wanted items.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::{LibraryConfig, ScannerConfig};
use crate::events::EventHandle;
use crate::integrations::InventoryClient;
use crate::media::{EmbeddedCodec, MediaInfo, MediaProber};
use crate::runtime::CancelFlag;
use crate::store::{
    ConfigEntriesStore, EpisodeRow, ExistingSub, ForcedPreference, LibraryStore, MediaKind,
    MovieRow, NewWantedItem, ProfileStore, SeriesRow, StoreError, SubtitleType, WantedStore,
};
use crate::subtitle::{find_existing_subtitles, language_matches, SubtitleFormat};

/// Key under which the last scan timestamp is stored.
const LAST_SCAN_KEY: &str = "_last_scan_timestamp";

/// Key tracking the scheduled-scan cycle counter.
const SCAN_CYCLE_KEY: &str = "_scan_cycle";

/// Progress is emitted at most once per second.
const PROGRESS_INTERVAL_MS: u128 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Incremental,
    Full,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub mode: String,
    pub files_scanned: usize,
    pub items_created: usize,
    pub items_updated: usize,
    pub items_removed: u64,
    pub probe_failures: usize,
    /// Newly created items with an embedded source subtitle, for the
    /// auto-extract chain.
    pub auto_extract_candidates: Vec<i64>,
}

/// One file to probe, flattened from the inventories.
#[derive(Debug, Clone)]
struct ScanTarget {
    file_path: String,
    title: String,
    season: Option<u32>,
    episode: Option<u32>,
    absolute_episode: Option<u32>,
    year: Option<u32>,
    is_episode: bool,
    instance: String,
    media_kind: MediaKind,
    external_id: i64,
    series_id: Option<i64>,
    changed_at: Option<DateTime<Utc>>,
    file_added_at: Option<DateTime<Utc>>,
}

pub struct WantedScanner {
    inventories: Vec<Arc<dyn InventoryClient>>,
    library: LibraryStore,
    profiles: ProfileStore,
    wanted: WantedStore,
    config_entries: ConfigEntriesStore,
    prober: Arc<dyn MediaProber>,
    events: EventHandle,
    scanner_config: ScannerConfig,
    library_config: LibraryConfig,
}

impl WantedScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inventories: Vec<Arc<dyn InventoryClient>>,
        library: LibraryStore,
        profiles: ProfileStore,
        wanted: WantedStore,
        config_entries: ConfigEntriesStore,
        prober: Arc<dyn MediaProber>,
        events: EventHandle,
        scanner_config: ScannerConfig,
        library_config: LibraryConfig,
    ) -> Self {
        Self {
            inventories,
            library,
            profiles,
            wanted,
            config_entries,
            prober,
            events,
            scanner_config,
            library_config,
        }
    }

    /// Mode for the next scheduled scan: every K-th cycle is a full scan.
    pub fn next_scheduled_mode(&self) -> Result<ScanMode, StoreError> {
        let cycle: u32 = self
            .config_entries
            .get(SCAN_CYCLE_KEY)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = cycle + 1;
        self.config_entries
            .set(SCAN_CYCLE_KEY, &next.to_string())?;
        if next % self.scanner_config.full_scan_every.max(1) == 0 {
            Ok(ScanMode::Full)
        } else {
            Ok(ScanMode::Incremental)
        }
    }

    /// Run one scan cycle.
    pub async fn scan(
        &self,
        mode: ScanMode,
        job_id: &str,
        cancel: &CancelFlag,
    ) -> Result<ScanReport, StoreError> {
        let last_scan: Option<DateTime<Utc>> = self
            .config_entries
            .get(LAST_SCAN_KEY)?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        tracing::info!(?mode, ?last_scan, "Starting wanted scan");
        let mut targets = self.collect_targets().await?;

        // Incremental: only items that changed since the last scan
        if mode == ScanMode::Incremental {
            if let Some(last_scan) = last_scan {
                targets.retain(|t| {
                    t.changed_at.map(|c| c > last_scan).unwrap_or(true)
                });
            }
        }

        let mut report = ScanReport {
            mode: match mode {
                ScanMode::Incremental => "incremental".to_string(),
                ScanMode::Full => "full".to_string(),
            },
            ..Default::default()
        };

        // Bounded parallel probing
        let semaphore = Arc::new(Semaphore::new(self.scanner_config.probe_workers));
        let total = targets.len();
        let mut last_progress = Instant::now();

        let probes = targets.iter().map(|target| {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let path = target.file_path.clone();
            async move {
                let _permit = semaphore.acquire_owned().await;
                prober.probe(Path::new(&path)).await
            }
        });
        let probe_results = futures::future::join_all(probes).await;

        for (index, (target, probe)) in targets.iter().zip(probe_results).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Scan cancelled");
                break;
            }

            if last_progress.elapsed().as_millis() >= PROGRESS_INTERVAL_MS {
                self.events.emit(
                    "wanted_scan_progress",
                    serde_json::json!({
                        "job_id": job_id,
                        "current": index,
                        "total": total,
                        "phase": "probing",
                    }),
                );
                last_progress = Instant::now();
            }

            let info = match probe {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(file = %target.file_path, "Probe failed: {}", e);
                    report.probe_failures += 1;
                    continue;
                }
            };
            report.files_scanned += 1;

            self.derive_wanted_items(target, &info, &mut report)?;
        }

        // Cleanup only runs on full scans
        if mode == ScanMode::Full && !cancel.is_cancelled() {
            let known = self.library.all_file_paths()?;
            report.items_removed = self.wanted.cleanup_missing(&known)?;
        }

        self.config_entries
            .set(LAST_SCAN_KEY, &Utc::now().to_rfc3339())?;

        self.events.emit(
            "scan_complete",
            serde_json::json!({
                "mode": report.mode,
                "files_scanned": report.files_scanned,
                "items_created": report.items_created,
                "items_removed": report.items_removed,
            }),
        );
        tracing::info!(
            created = report.items_created,
            updated = report.items_updated,
            removed = report.items_removed,
            "Wanted scan finished"
        );
        Ok(report)
    }

    /// Pull all inventories into the library cache and flatten to targets.
    async fn collect_targets(&self) -> Result<Vec<ScanTarget>, StoreError> {
        let mut targets = Vec::new();

        for inventory in &self.inventories {
            let instance = inventory.instance_name().to_string();

            let series = match inventory.fetch_series().await {
                Ok(series) => series,
                Err(e) => {
                    tracing::warn!(instance = %instance, "Series fetch failed: {}", e);
                    continue;
                }
            };
            for s in &series {
                self.library.upsert_series(&SeriesRow {
                    id: s.id,
                    instance: instance.clone(),
                    title: s.title.clone(),
                    path: s.path.clone(),
                    tags: s.tags.clone(),
                    profile_id: None,
                    last_info_sync: s.last_info_sync,
                })?;

                let episodes = match inventory.fetch_episodes(s.id).await {
                    Ok(episodes) => episodes,
                    Err(e) => {
                        tracing::warn!(series = s.id, "Episode fetch failed: {}", e);
                        continue;
                    }
                };
                for e in episodes {
                    self.library.upsert_episode(&EpisodeRow {
                        id: e.id,
                        instance: instance.clone(),
                        series_id: e.series_id,
                        season: e.season,
                        episode: e.episode,
                        file_path: e.file_path.clone(),
                        last_seen_at: Utc::now(),
                    })?;
                    targets.push(ScanTarget {
                        file_path: e.file_path.clone(),
                        title: s.title.clone(),
                        season: Some(e.season),
                        episode: Some(e.episode),
                        absolute_episode: e.absolute_episode,
                        year: s.year,
                        is_episode: true,
                        instance: instance.clone(),
                        media_kind: MediaKind::Series,
                        external_id: s.id,
                        series_id: Some(s.id),
                        changed_at: e.date_added.or(s.last_info_sync),
                        file_added_at: e.date_added,
                    });
                }
            }

            let movies = match inventory.fetch_movies().await {
                Ok(movies) => movies,
                Err(e) => {
                    tracing::warn!(instance = %instance, "Movie fetch failed: {}", e);
                    continue;
                }
            };
            for m in movies {
                self.library.upsert_movie(&MovieRow {
                    id: m.id,
                    instance: instance.clone(),
                    title: m.title.clone(),
                    file_path: m.file_path.clone(),
                    tags: m.tags.clone(),
                    profile_id: None,
                    year: m.year,
                    date_added: m.date_added,
                    last_seen_at: Utc::now(),
                })?;
                targets.push(ScanTarget {
                    file_path: m.file_path.clone(),
                    title: m.title.clone(),
                    season: None,
                    episode: None,
                    absolute_episode: None,
                    year: m.year,
                    is_episode: false,
                    instance: instance.clone(),
                    media_kind: MediaKind::Movie,
                    external_id: m.id,
                    series_id: None,
                    changed_at: m.date_added,
                    file_added_at: m.date_added,
                });
            }
        }

        Ok(targets)
    }

    /// Upsert wanted items for one probed file.
    fn derive_wanted_items(
        &self,
        target: &ScanTarget,
        info: &MediaInfo,
        report: &mut ScanReport,
    ) -> Result<(), StoreError> {
        let profile =
            self.profiles
                .effective(target.media_kind, &target.instance, target.external_id)?;

        let (source_language, target_languages, forced_preference, profile_id) = match &profile {
            Some(p) => (
                p.source_language.clone(),
                p.target_languages.clone(),
                p.forced_preference,
                Some(p.id),
            ),
            None => (
                self.library_config.source_language.clone(),
                self.library_config.target_languages.clone(),
                ForcedPreference::Disabled,
                None,
            ),
        };

        let video = Path::new(&target.file_path);
        let has_embedded_source = info
            .best_subtitle_stream(&source_language)
            .map(|s| s.codec != EmbeddedCodec::Other)
            .unwrap_or(false);

        for language in &target_languages {
            let existing = find_existing_subtitles(video, language);
            let existing_full_ass = existing
                .iter()
                .any(|f| !f.forced && f.format.is_styled());
            let existing_full_srt = existing
                .iter()
                .any(|f| !f.forced && f.format == SubtitleFormat::Srt);
            let existing_forced = existing.iter().any(|f| f.forced);

            // A styled target on disk fully satisfies the full item (S1)
            if !existing_full_ass {
                let existing_sub = if existing_full_srt {
                    ExistingSub::ExternalSrt
                } else {
                    embedded_target_sub(info, language)
                };
                let (id, created) = self.wanted.upsert(&NewWantedItem {
                    file_path: target.file_path.clone(),
                    target_language: language.clone(),
                    subtitle_type: SubtitleType::Full,
                    source_language: source_language.clone(),
                    existing_sub,
                    title: target.title.clone(),
                    season: target.season,
                    episode: target.episode,
                    absolute_episode: target.absolute_episode,
                    year: target.year,
                    is_episode: target.is_episode,
                    profile_id,
                    series_id: target.series_id,
                    file_added_at: target.file_added_at,
                })?;
                if created {
                    report.items_created += 1;
                    if self.scanner_config.auto_extract && has_embedded_source {
                        report.auto_extract_candidates.push(id);
                    }
                } else {
                    report.items_updated += 1;
                }
            }

            // Forced items only under the "separate" preference (S1/S4).
            // "auto" detects embedded forced streams but never acquires.
            if forced_preference == ForcedPreference::Separate && !existing_forced {
                let (_, created) = self.wanted.upsert(&NewWantedItem {
                    file_path: target.file_path.clone(),
                    target_language: language.clone(),
                    subtitle_type: SubtitleType::Forced,
                    source_language: source_language.clone(),
                    existing_sub: ExistingSub::None,
                    title: target.title.clone(),
                    season: target.season,
                    episode: target.episode,
                    absolute_episode: target.absolute_episode,
                    year: target.year,
                    is_episode: target.is_episode,
                    profile_id,
                    series_id: target.series_id,
                    file_added_at: target.file_added_at,
                })?;
                if created {
                    report.items_created += 1;
                } else {
                    report.items_updated += 1;
                }
            }
        }

        Ok(())
    }
}

/// Best embedded target-language subtitle, for the `existing_sub` field.
fn embedded_target_sub(info: &MediaInfo, language: &str) -> ExistingSub {
    let mut best = ExistingSub::None;
    for stream in &info.subtitle_streams {
        let matches = stream
            .language
            .as_deref()
            .map(|l| language_matches(l, language))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        match stream.codec {
            EmbeddedCodec::Ass => return ExistingSub::EmbeddedAss,
            EmbeddedCodec::Srt => best = ExistingSub::EmbeddedSrt,
            EmbeddedCodec::Other => {}
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_bus;
    use crate::integrations::{ArrEpisode, ArrSeries};
    use crate::media::SubtitleStreamInfo;
    use crate::store::Database;
    use crate::testing::{MockInventory, MockProber};

    fn scanner_with(
        inventories: Vec<Arc<dyn InventoryClient>>,
        prober: MockProber,
        config: ScannerConfig,
    ) -> (WantedScanner, WantedStore) {
        let db = Database::in_memory().unwrap();
        let wanted = WantedStore::new(db.clone());
        let (events, _dispatcher) = create_event_bus(vec![], None, 64, 4);
        let scanner = WantedScanner::new(
            inventories,
            LibraryStore::new(db.clone()),
            ProfileStore::new(db.clone()),
            wanted.clone(),
            ConfigEntriesStore::new(db),
            Arc::new(prober),
            events,
            config,
            LibraryConfig {
                source_language: "en".to_string(),
                target_languages: vec!["de".to_string()],
            },
        );
        (scanner, wanted)
    }

    fn episode_inventory(dir: &tempfile::TempDir, file: &str) -> (Arc<dyn InventoryClient>, String) {
        let path = dir.path().join(file);
        std::fs::write(&path, b"video").unwrap();
        let path_str = path.to_string_lossy().to_string();
        let inventory = MockInventory::sonarr("main")
            .with_series(vec![ArrSeries {
                id: 1,
                title: "Show".to_string(),
                path: dir.path().to_string_lossy().to_string(),
                tags: vec![],
                year: Some(2023),
                last_info_sync: Some(Utc::now()),
            }])
            .with_episodes(vec![ArrEpisode {
                id: 10,
                series_id: 1,
                season: 1,
                episode: 1,
                absolute_episode: Some(1),
                file_path: path_str.clone(),
                date_added: Some(Utc::now()),
            }]);
        (Arc::new(inventory), path_str)
    }

    fn embedded_source_info() -> MediaInfo {
        MediaInfo {
            subtitle_streams: vec![SubtitleStreamInfo {
                index: 2,
                codec: EmbeddedCodec::Ass,
                language: Some("eng".to_string()),
                title: None,
                forced_disposition: false,
                default_disposition: true,
            }],
            audio_streams: vec![],
        }
    }

    #[tokio::test]
    async fn test_scan_creates_wanted_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, path) = episode_inventory(&dir, "S01E01.mkv");
        let (scanner, wanted) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig::default(),
        );

        let report = scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.items_created, 1);

        let items = wanted.list(None, 10, 0).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].file_path, path);
        assert_eq!(items[0].target_language, "de");
        assert_eq!(items[0].subtitle_type, SubtitleType::Full);
        assert_eq!(items[0].title, "Show");
        assert_eq!(items[0].series_id, Some(1));
    }

    #[tokio::test]
    async fn test_existing_target_ass_suppresses_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");
        std::fs::write(dir.path().join("S01E01.de.ass"), b"x").unwrap();

        let (scanner, wanted) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig::default(),
        );
        scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert!(wanted.list(None, 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_srt_creates_upgrade_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");
        std::fs::write(dir.path().join("S01E01.de.srt"), b"x").unwrap();

        let (scanner, wanted) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig::default(),
        );
        scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();

        let items = wanted.list(None, 10, 0).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].existing_sub, ExistingSub::ExternalSrt);
    }

    #[tokio::test]
    async fn test_forced_separate_creates_forced_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");

        let db = Database::in_memory().unwrap();
        let wanted = WantedStore::new(db.clone());
        let profiles = ProfileStore::new(db.clone());
        profiles
            .create(&crate::store::NewLanguageProfile {
                name: "anime".to_string(),
                source_language: "en".to_string(),
                target_languages: vec!["de".to_string()],
                forced_preference: ForcedPreference::Separate,
                backend_chain: None,
                is_default: true,
            })
            .unwrap();
        let (events, _dispatcher) = create_event_bus(vec![], None, 64, 4);
        let scanner = WantedScanner::new(
            vec![inventory],
            LibraryStore::new(db.clone()),
            profiles,
            wanted.clone(),
            ConfigEntriesStore::new(db),
            Arc::new(MockProber::new()),
            events,
            ScannerConfig::default(),
            LibraryConfig::default(),
        );

        scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();

        let items = wanted.list(None, 10, 0).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .any(|i| i.subtitle_type == SubtitleType::Forced));
    }

    #[tokio::test]
    async fn test_full_scan_cleans_up_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");
        let (scanner, wanted) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig::default(),
        );

        // Seed a stale wanted item whose file left the inventory
        wanted
            .upsert(&NewWantedItem {
                file_path: "/gone/file.mkv".to_string(),
                target_language: "de".to_string(),
                subtitle_type: SubtitleType::Full,
                source_language: "en".to_string(),
                existing_sub: ExistingSub::None,
                title: "Gone".to_string(),
                season: None,
                episode: None,
                absolute_episode: None,
                year: None,
                is_episode: true,
                profile_id: None,
                series_id: None,
                file_added_at: None,
            })
            .unwrap();

        let report = scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.items_removed, 1);
    }

    #[tokio::test]
    async fn test_incremental_skips_unchanged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("S01E01.mkv");
        std::fs::write(&path, b"video").unwrap();
        let old = Utc::now() - chrono::Duration::days(30);
        let inventory: Arc<dyn InventoryClient> = Arc::new(
            MockInventory::sonarr("main")
                .with_series(vec![ArrSeries {
                    id: 1,
                    title: "Show".to_string(),
                    path: dir.path().to_string_lossy().to_string(),
                    tags: vec![],
                    year: None,
                    last_info_sync: Some(old),
                }])
                .with_episodes(vec![ArrEpisode {
                    id: 10,
                    series_id: 1,
                    season: 1,
                    episode: 1,
                    absolute_episode: None,
                    file_path: path.to_string_lossy().to_string(),
                    date_added: Some(old),
                }]),
        );
        let (scanner, wanted) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig::default(),
        );

        // First scan records the timestamp and creates the item
        scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(wanted.list(None, 10, 0).unwrap().len(), 1);

        // Incremental scan finds nothing changed
        let report = scanner
            .scan(ScanMode::Incremental, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.files_scanned, 0);
    }

    #[tokio::test]
    async fn test_auto_extract_candidates() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");
        let (scanner, _wanted) = scanner_with(
            vec![inventory],
            MockProber::new().with_info(embedded_source_info()),
            ScannerConfig {
                auto_extract: true,
                ..Default::default()
            },
        );

        let report = scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.auto_extract_candidates.len(), 1);

        // A second scan updates instead of creating; no new candidates
        let report = scanner
            .scan(ScanMode::Full, "job", &CancelFlag::new())
            .await
            .unwrap();
        assert!(report.auto_extract_candidates.is_empty());
        assert_eq!(report.items_updated, 1);
    }

    #[test]
    fn test_scheduled_mode_cycles() {
        let dir = tempfile::TempDir::new().unwrap();
        let (inventory, _path) = episode_inventory(&dir, "S01E01.mkv");
        let (scanner, _) = scanner_with(
            vec![inventory],
            MockProber::new(),
            ScannerConfig {
                full_scan_every: 3,
                ..Default::default()
            },
        );

        let modes: Vec<ScanMode> = (0..6)
            .map(|_| scanner.next_scheduled_mode().unwrap())
            .collect();
        assert_eq!(
            modes,
            vec![
                ScanMode::Incremental,
                ScanMode::Incremental,
                ScanMode::Full,
                ScanMode::Incremental,
                ScanMode::Incremental,
                ScanMode::Full,
            ]
        );
    }
}

//! Subtitle provider abstraction.
//!
//! A `SubtitleProvider` implements search/download/health against one
//! external source; the `ProviderManager` fans queries out in parallel with
//! per-provider circuit breakers, a TTL cache and client-side filtering.

mod forced;
mod jimaku;
mod manager;
mod opensubtitles;
mod scoring;
mod types;

pub use forced::*;
pub use jimaku::JimakuProvider;
pub use manager::*;
pub use opensubtitles::OpenSubtitlesProvider;
pub use scoring::*;
pub use types::*;

use std::sync::Arc;

use crate::config::{ProviderInstanceConfig, ProviderKind};

/// Build provider instances from configuration (disabled ones are skipped).
pub fn build_providers(configs: &[ProviderInstanceConfig]) -> Vec<Arc<dyn SubtitleProvider>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| -> Arc<dyn SubtitleProvider> {
            match c.kind {
                ProviderKind::Opensubtitles => Arc::new(OpenSubtitlesProvider::new(c)),
                ProviderKind::Jimaku => Arc::new(JimakuProvider::new(c)),
            }
        })
        .collect()
}

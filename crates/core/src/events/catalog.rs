//! Signal catalog.
//!
//! Every event name flowing through the bus is declared here with its
//! payload contract. Progress signals are WebSocket-only: they fire at high
//! frequency and are never fanned out to hooks or webhooks.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventDef {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub payload_keys: &'static [&'static str],
    pub version: u32,
    /// WebSocket-only stream, not dispatched to hook/webhook subscribers.
    pub progress: bool,
}

pub const EVENT_CATALOG: &[EventDef] = &[
    // Business events
    EventDef {
        name: "subtitle_downloaded",
        label: "Subtitle downloaded",
        description: "A provider subtitle was downloaded and written next to the video",
        payload_keys: &["file_path", "subtitle_path", "language", "provider", "score", "forced"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "translation_complete",
        label: "Translation complete",
        description: "A subtitle translation finished",
        payload_keys: &["file_path", "subtitle_path", "source_language", "target_language", "backend", "avg_quality"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "wanted_item_processed",
        label: "Wanted item processed",
        description: "A wanted item reached a terminal state",
        payload_keys: &["file_path", "language", "subtitle_type", "status", "case"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "upgrade_complete",
        label: "Upgrade complete",
        description: "An SRT target was upgraded to ASS",
        payload_keys: &["file_path", "subtitle_path", "language", "provider"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "transcription_complete",
        label: "Transcription complete",
        description: "An audio transcription produced a source subtitle",
        payload_keys: &["file_path", "subtitle_path", "language"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "scan_complete",
        label: "Scan complete",
        description: "A wanted scan cycle finished",
        payload_keys: &["mode", "files_scanned", "items_created", "items_removed"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "provider_disabled",
        label: "Provider disabled",
        description: "A provider circuit breaker opened",
        payload_keys: &["provider", "reason"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "hook_executed",
        label: "Hook executed",
        description: "A shell hook ran (never re-dispatched to hooks or webhooks)",
        payload_keys: &["hook_id", "event_name", "exit_code", "duration_ms"],
        version: 1,
        progress: false,
    },
    EventDef {
        name: "config_updated",
        label: "Config updated",
        description: "A configuration entry changed",
        payload_keys: &["key"],
        version: 1,
        progress: true,
    },
    // Progress streams (WebSocket only)
    EventDef {
        name: "job_update",
        label: "Job update",
        description: "Job progress",
        payload_keys: &["job_id", "phase", "progress", "message"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "batch_progress",
        label: "Batch progress",
        description: "Batch translation progress",
        payload_keys: &["job_id", "current", "total"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "wanted_batch_progress",
        label: "Wanted batch progress",
        description: "Batch wanted processing progress",
        payload_keys: &["job_id", "current", "total"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "wanted_scan_progress",
        label: "Wanted scan progress",
        description: "Scanner progress",
        payload_keys: &["job_id", "current", "total", "phase"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "scan_progress",
        label: "Scan progress",
        description: "Per-file probe progress",
        payload_keys: &["job_id", "file_path", "current", "total"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "whisper_progress",
        label: "Whisper progress",
        description: "Transcription progress",
        payload_keys: &["job_id", "phase", "progress"],
        version: 1,
        progress: true,
    },
    EventDef {
        name: "retranslation_progress",
        label: "Retranslation progress",
        description: "Quality-retry progress",
        payload_keys: &["job_id", "current", "total"],
        version: 1,
        progress: true,
    },
];

/// Look up an event definition by name.
pub fn event_def(name: &str) -> Option<&'static EventDef> {
    EVENT_CATALOG.iter().find(|def| def.name == name)
}

/// Is this a WebSocket-only progress stream?
pub fn is_progress_event(name: &str) -> bool {
    event_def(name).map(|def| def.progress).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        let mut names: Vec<_> = EVENT_CATALOG.iter().map(|d| d.name).collect();
        let len = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), len);
    }

    #[test]
    fn test_progress_classification() {
        assert!(is_progress_event("job_update"));
        assert!(is_progress_event("whisper_progress"));
        assert!(!is_progress_event("subtitle_downloaded"));
        assert!(!is_progress_event("hook_executed"));
        assert!(!is_progress_event("unknown_event"));
    }

    #[test]
    fn test_lookup() {
        let def = event_def("subtitle_downloaded").unwrap();
        assert_eq!(def.version, 1);
        assert!(def.payload_keys.contains(&"provider"));
        assert!(event_def("nope").is_none());
    }
}

//! Shell-hook subscriber.
//!
//! Runs configured scripts with a controlled environment: only `PATH`,
//! `HOME` and `SUBLARR_*` variables, payload passed through env, cwd /tmp.
//! The parent environment is never inherited and nothing is interpolated
//! into a shell.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::store::{HookStore, HOOK_OUTPUT_CAP};

use super::bus::{EventEnvelope, EventHandle, EventSubscriber, WeakEventHandle};

pub struct HookSubscriber {
    store: HookStore,
    /// Used to emit the `hook_executed` meta-event. The subscriber itself
    /// refuses that event, which breaks the recursion cycle; the handle is
    /// weak so it cannot keep the bus queue alive at shutdown.
    emitter: std::sync::Mutex<Option<WeakEventHandle>>,
}

impl HookSubscriber {
    pub fn new(store: HookStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            emitter: std::sync::Mutex::new(None),
        })
    }

    /// Wire the emit handle after bus construction.
    pub fn set_emitter(&self, handle: EventHandle) {
        *self.emitter.lock().unwrap() = Some(handle.downgrade());
    }

    async fn run_hook(
        &self,
        hook: &crate::store::HookConfig,
        event: &EventEnvelope,
    ) {
        let started = Instant::now();
        let payload_json = event.payload.to_string();

        let mut command = Command::new(&hook.script_path);
        command
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()))
            .env("HOME", std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
            .env("SUBLARR_EVENT", &event.name)
            .env("SUBLARR_EVENT_DATA", &payload_json)
            .current_dir("/tmp")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // One SUBLARR_<KEY> per top-level payload key
        if let Some(map) = event.payload.as_object() {
            for (key, value) in map {
                let env_key = format!("SUBLARR_{}", key.to_uppercase());
                let env_value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                command.env(env_key, env_value);
            }
        }

        let hook_timeout = Duration::from_secs(hook.timeout_secs as u64);
        let result = timeout(hook_timeout, async {
            command.output().await
        })
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let (exit_code, stdout, stderr) = match result {
            Ok(Ok(output)) => (
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ),
            Ok(Err(e)) => {
                tracing::error!(
                    hook = hook.id,
                    script = %hook.script_path,
                    "Hook spawn failed: {}",
                    e
                );
                (None, String::new(), format!("spawn failed: {}", e))
            }
            Err(_) => {
                tracing::warn!(
                    hook = hook.id,
                    script = %hook.script_path,
                    timeout_secs = hook.timeout_secs,
                    "Hook timed out"
                );
                (None, String::new(), "timed out".to_string())
            }
        };

        if let Err(e) = self.store.log_execution(
            hook.id,
            &event.name,
            exit_code,
            &cap(&stdout),
            &cap(&stderr),
            duration_ms,
        ) {
            tracing::error!("Failed to persist hook log: {}", e);
        }

        let emitter = self.emitter.lock().unwrap().clone();
        if let Some(handle) = emitter {
            handle.emit(
                "hook_executed",
                serde_json::json!({
                    "hook_id": hook.id,
                    "event_name": event.name,
                    "exit_code": exit_code,
                    "duration_ms": duration_ms,
                }),
            );
        }
    }
}

fn cap(s: &str) -> String {
    if s.len() <= HOOK_OUTPUT_CAP {
        return s.to_string();
    }
    let mut end = HOOK_OUTPUT_CAP;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[async_trait]
impl EventSubscriber for HookSubscriber {
    fn name(&self) -> &str {
        "shell_hooks"
    }

    fn wants(&self, event_name: &str) -> bool {
        event_name != "hook_executed"
    }

    async fn deliver(&self, event: &EventEnvelope) {
        let hooks = match self.store.hooks_for_event(&event.name) {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!("Failed to load hooks: {}", e);
                return;
            }
        };

        for hook in hooks {
            self.run_hook(&hook, event).await;
        }
    }
}

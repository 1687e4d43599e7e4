use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::api::OptimizeBackend;
use crate::core::artifact::ArtifactSlot;
use crate::core::events::SessionEvent;
use crate::core::model::{
    AdvisoryVerdict, AttemptId, CandidateFile, OptimizationStats, OptimizeRequest, SessionState,
};
use crate::core::validate;

struct Inner {
    state: SessionState,
    selected: Option<CandidateFile>,
    stats: Option<OptimizationStats>,
    error: Option<String>,
    artifact: ArtifactSlot,
    /// Monotonic attempt counter; a completing attempt applies its result
    /// only while it is still the current one.
    attempts: AttemptId,
    cancel: Option<CancellationToken>,
}

/// Read-only view for the UI surface.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub selected: Option<String>,
    pub stats: Option<OptimizationStats>,
    pub error: Option<String>,
    pub artifact_filename: Option<String>,
    pub artifact_size: Option<u64>,
}

/// One optimization session: idle -> file selected -> submitting ->
/// success/error, with resets back to idle. Submissions are strictly
/// sequential; starting a new one supersedes and cancels the previous.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn OptimizeBackend>,
    event_tx: broadcast::Sender<SessionEvent>,
    state_tx: Arc<watch::Sender<SessionState>>,
    inner: Arc<Mutex<Inner>>,
}

impl Session {
    pub fn new(backend: Arc<dyn OptimizeBackend>, staging_dir: PathBuf) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            backend,
            event_tx,
            state_tx: Arc::new(state_tx),
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                selected: None,
                stats: None,
                error: None,
                artifact: ArtifactSlot::new(staging_dir),
                attempts: 0,
                cancel: None,
            })),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        if inner.state != state {
            inner.state = state;
            let _ = self.state_tx.send(state);
            let _ = self.event_tx.send(SessionEvent::StateChanged { state });
        }
    }

    /// Select a candidate from the filesystem.
    pub async fn select_path(&self, path: &Path) -> anyhow::Result<bool> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("stat {}", path.display()))?;
        anyhow::ensure!(meta.is_file(), "{} is not a file", path.display());
        Ok(self.select_file(CandidateFile::new(path.to_path_buf(), meta.len())).await)
    }

    /// Validate and select a candidate. The synchronous accept/reject
    /// decision is taken and surfaced immediately; for the riskier formats an
    /// advisory server check then runs and may reverse the acceptance,
    /// clearing the selection. Returns whether the candidate is still
    /// selected afterwards.
    pub async fn select_file(&self, file: CandidateFile) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if let Err(e) = validate::validate(&file) {
                // A previously accepted selection stays untouched.
                inner.error = Some(e.message());
                let _ = self.event_tx.send(SessionEvent::FileRejected { reason: e.message() });
                return false;
            }

            inner.selected = Some(file.clone());
            inner.error = None;
            let _ = self.event_tx.send(SessionEvent::FileAccepted {
                name: file.name.clone(),
                size: file.size,
            });
            self.set_state(&mut inner, SessionState::FileSelected);
        }

        if let AdvisoryVerdict::Invalid(reason) = validate::advisory(self.backend.as_ref(), &file).await
        {
            let mut inner = self.inner.lock().await;
            // Only reverse if this candidate is still the selection.
            let still_selected = inner
                .selected
                .as_ref()
                .map(|s| s.path == file.path)
                .unwrap_or(false);
            if still_selected && inner.state == SessionState::FileSelected {
                inner.selected = None;
                inner.error = Some(reason.clone());
                let _ = self.event_tx.send(SessionEvent::AdvisoryRejected {
                    name: file.name.clone(),
                    reason,
                });
                self.set_state(&mut inner, SessionState::Idle);
                return false;
            }
        }
        true
    }

    /// Kick off an upload for the selected file. Cancels any in-flight
    /// attempt, clears the previous cycle's stats/artifact/error, and moves
    /// to `Submitting`. The attempt body runs as a spawned task.
    pub async fn start_optimize(&self, req: OptimizeRequest) -> anyhow::Result<AttemptId> {
        let (file, attempt, cancel) = {
            let mut inner = self.inner.lock().await;
            let file = match inner.selected.clone() {
                Some(f) => f,
                None => {
                    let _ = self.event_tx.send(SessionEvent::Error {
                        scope: "submit".to_string(),
                        message: "no file selected".to_string(),
                    });
                    anyhow::bail!("no file selected");
                }
            };

            if let Some(tok) = inner.cancel.take() {
                tok.cancel();
            }

            // Prior cycle is gone before the new one starts.
            inner.stats = None;
            inner.error = None;
            inner.artifact.release().await;

            inner.attempts += 1;
            let attempt = inner.attempts;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());

            let _ = self.event_tx.send(SessionEvent::UploadStarted {
                attempt,
                name: file.name.clone(),
                size: file.size,
            });
            self.set_state(&mut inner, SessionState::Submitting);
            (file, attempt, cancel)
        };

        let session = self.clone();
        tokio::spawn(async move {
            session.run_attempt(attempt, file, req, cancel).await;
        });

        Ok(attempt)
    }

    async fn run_attempt(
        &self,
        attempt: AttemptId,
        file: CandidateFile,
        req: OptimizeRequest,
        cancel: CancellationToken,
    ) {
        let result = self.backend.submit(&file, req, &cancel).await;

        let mut inner = self.inner.lock().await;
        if inner.attempts != attempt || inner.state != SessionState::Submitting {
            // Superseded or reset while in flight: the late result is
            // discarded, never applied.
            tracing::debug!(attempt, "discarding result of superseded attempt");
            return;
        }
        inner.cancel = None;

        match result {
            Ok(res) => {
                inner.artifact.store(res.payload, res.filename).await;
                inner.stats = Some(res.stats.clone());
                let _ = self.event_tx.send(SessionEvent::StatsReady { attempt, stats: res.stats });
                if let (Some(name), Some(size)) =
                    (inner.artifact.filename(), inner.artifact.payload_len())
                {
                    let _ = self.event_tx.send(SessionEvent::ArtifactReady {
                        attempt,
                        filename: name.to_string(),
                        size,
                    });
                }
                self.set_state(&mut inner, SessionState::Success);
            }
            Err(e) => {
                let message = e.message();
                inner.error = Some(message.clone());
                let _ = self.event_tx.send(SessionEvent::Error {
                    scope: "submit".to_string(),
                    message,
                });
                self.set_state(&mut inner, SessionState::Error);
            }
        }
    }

    /// Block until the given attempt is no longer in flight.
    pub async fn wait_attempt(&self, attempt: AttemptId) {
        let mut rx = self.state_tx.subscribe();
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.attempts != attempt || inner.state != SessionState::Submitting {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Back to `Idle`: cancels in-flight work, releases the artifact, clears
    /// selection, stats and error. Safe to call repeatedly.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(tok) = inner.cancel.take() {
            tok.cancel();
        }
        inner.selected = None;
        inner.stats = None;
        inner.error = None;
        inner.artifact.release().await;
        let _ = self.event_tx.send(SessionEvent::Info {
            scope: "session".to_string(),
            message: "reset".to_string(),
        });
        self.set_state(&mut inner, SessionState::Idle);
    }

    /// Save the held artifact into `dir`. Only valid while one is held;
    /// repeatable, since downloading never revokes.
    pub async fn download_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let mut inner = self.inner.lock().await;
        anyhow::ensure!(inner.artifact.has_artifact(), "no optimized result to download");
        inner.artifact.download_to(dir).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            state: inner.state,
            selected: inner.selected.as_ref().map(|f| f.name.clone()),
            stats: inner.stats.clone(),
            error: inner.error.clone(),
            artifact_filename: inner.artifact.filename().map(|s| s.to_string()),
            artifact_size: inner.artifact.payload_len(),
        }
    }
}

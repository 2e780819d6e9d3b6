//! Per-user request state: what has been uploaded, whether it has already
//! been converted, and the one-shot download waiting to be picked up.
//!
//! ```text
//!            upload                 convert                ok
//!  NoFile ──────────▶ FileStaged ──────────▶ Converting ──────────▶ Done
//!    ▲                  ▲  ▲                     │ error                │
//!    │ withdraw         │  └─────────────────────┘                      │
//!    └──────────────────┴───────────────── upload (any state) ◀─────────┘
//! ```
//!
//! A [`Session`] is plain data with synchronous transitions. The pipeline runs
//! outside of it: [`Session::begin_conversion`] hands out a
//! [`ConversionRequest`] (bytes, format, cancellation token, generation) and
//! [`Session::finish_conversion`] takes the result back. Every upload and
//! withdrawal bumps the generation and cancels the previous token, so a
//! result computed for an old upload is recognised and discarded.
//!
//! [`SessionStore`] keeps sessions in a `DashMap`. Transitions run inside
//! [`SessionStore::with_session`] and never hold the entry across an `.await`.

use crate::error::ConvertError;
use crate::output::{Artifact, ConversionOutput, Delivery, OutputFormat};
use crate::pipeline::input::SourceDocument;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Warning shown when convert is pressed again for an already converted upload.
pub const ALREADY_CONVERTED_WARNING: &str =
    "File already converted. Please upload a new file to convert again.";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoFile,
    FileStaged,
    Converting,
    Done,
}

/// Everything the pipeline needs for one request, detached from the session.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: SourceDocument,
    pub format: OutputFormat,
    /// Fires when the upload is withdrawn or replaced.
    pub cancel: CancellationToken,
    pub generation: u64,
}

/// Result of pressing convert.
#[derive(Debug)]
pub enum BeginOutcome {
    /// Run the pipeline with this request, then call [`Session::finish_conversion`].
    Started(ConversionRequest),
    /// The upload was already converted; nothing to do.
    AlreadyDone,
}

/// One user's state.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    upload: Option<SourceDocument>,
    generation: u64,
    cancel: CancellationToken,
    pending: Option<Artifact>,
    last_error: Option<String>,
    last_activity: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::NoFile,
            upload: None,
            generation: 0,
            cancel: CancellationToken::new(),
            pending: None,
            last_error: None,
            last_activity: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload(&self) -> Option<&SourceDocument> {
        self.upload.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One-line message of the last failed request.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_pending_download(&self) -> bool {
        self.pending.is_some()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Invalidate everything tied to the current upload.
    fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.pending = None;
        self.last_error = None;
    }

    /// Stage a new upload. Valid from every state.
    ///
    /// Any conversion still running for the previous upload is cancelled and
    /// its result will be discarded.
    pub fn stage_upload(&mut self, source: SourceDocument) {
        if self.state == SessionState::Converting {
            info!("New upload replaces a running conversion");
        }
        self.reset();
        debug!(
            "Staged {} ({} bytes), generation {}",
            source.name().unwrap_or("upload"),
            source.len(),
            self.generation
        );
        self.upload = Some(source);
        self.state = SessionState::FileStaged;
        self.touch();
    }

    /// Remove the upload. A running text extraction stops at the next page.
    pub fn withdraw_upload(&mut self) {
        if self.upload.is_some() {
            debug!("Upload withdrawn in state {:?}", self.state);
        }
        self.reset();
        self.upload = None;
        self.state = SessionState::NoFile;
        self.touch();
    }

    /// Press convert.
    pub fn begin_conversion(&mut self, format: OutputFormat) -> Result<BeginOutcome, ConvertError> {
        self.touch();
        match self.state {
            SessionState::NoFile => Err(ConvertError::NoInput),
            SessionState::Converting => Err(ConvertError::Busy),
            SessionState::Done => {
                warn!("{}", ALREADY_CONVERTED_WARNING);
                Ok(BeginOutcome::AlreadyDone)
            }
            SessionState::FileStaged => {
                let source = self.upload.clone().ok_or(ConvertError::NoInput)?;
                self.state = SessionState::Converting;
                self.last_error = None;
                Ok(BeginOutcome::Started(ConversionRequest {
                    source,
                    format,
                    cancel: self.cancel.clone(),
                    generation: self.generation,
                }))
            }
        }
    }

    /// Hand the pipeline result back.
    ///
    /// Results for a superseded upload are dropped without touching the
    /// current state: a cancellation is passed through, anything else becomes
    /// [`ConvertError::Superseded`]. On
    /// success a download is kept for one [`Session::take_download`].
    pub fn finish_conversion(
        &mut self,
        generation: u64,
        result: Result<ConversionOutput, ConvertError>,
    ) -> Result<ConversionOutput, ConvertError> {
        self.touch();
        if generation != self.generation || self.state != SessionState::Converting {
            debug!(
                "Discarding result of generation {} (current {})",
                generation, self.generation
            );
            return Err(match result {
                Err(e @ ConvertError::Cancelled { .. }) => e,
                _ => ConvertError::Superseded,
            });
        }

        match result {
            Ok(output) => {
                self.pending = match &output.delivery {
                    Delivery::Download(artifact) => Some(artifact.clone()),
                    Delivery::Inline { .. } => None,
                };
                self.state = SessionState::Done;
                Ok(output)
            }
            Err(e) => {
                self.last_error = Some(e.one_line());
                self.state = SessionState::FileStaged;
                Err(e)
            }
        }
    }

    /// Take the pending download. Returns it once.
    pub fn take_download(&mut self) -> Option<Artifact> {
        self.touch();
        self.pending.take()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            filename: self
                .upload
                .as_ref()
                .and_then(|u| u.name().map(str::to_string)),
            upload_bytes: self.upload.as_ref().map(SourceDocument::len),
            download: self.pending.as_ref().map(|a| DownloadInfo {
                label: a.label.clone(),
                filename: a.filename.clone(),
                bytes: a.len(),
            }),
            last_error: self.last_error.clone(),
        }
    }
}

/// Serializable view of a [`Session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub filename: Option<String>,
    pub upload_bytes: Option<usize>,
    pub download: Option<DownloadInfo>,
    pub last_error: Option<String>,
}

/// The pending download as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadInfo {
    pub label: String,
    pub filename: String,
    pub bytes: usize,
}

// ── Store ────────────────────────────────────────────────────────────────

/// Concurrent map of session id → [`Session`].
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `id` if it names a live session, otherwise create a new one.
    pub fn resolve(&self, id: Option<Uuid>) -> Uuid {
        if let Some(id) = id {
            if self.sessions.contains_key(&id) {
                return id;
            }
        }
        let id = Uuid::new_v4();
        self.sessions.insert(id, Session::new());
        debug!(session = %id, "Created session");
        id
    }

    /// Run `f` on the session under its entry lock.
    pub fn with_session<R>(&self, id: &Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut entry = self.sessions.get_mut(id)?;
        Some(f(entry.value_mut()))
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id) {
            Some((_, mut session)) => {
                session.withdraw_upload();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for longer than `max_idle`, cancelling their work.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, session| {
            let keep = session.idle_for() < max_idle;
            if !keep {
                session.withdraw_upload();
                debug!(session = %id, "Pruned idle session");
            }
            keep
        });
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            info!("Pruned {} idle sessions", pruned);
        }
        pruned
    }
}

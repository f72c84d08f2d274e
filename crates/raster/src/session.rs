//! Per-tool session: one selected file, at most one result.

use crate::analysis::{suggest_tags, ImageAnalysis};
use crate::cancel::CancellationToken;
use crate::detect::{detect_format, SourceFormat};
use crate::error::{ErrorKind, RasterError, Result};
use crate::pipeline::{Job, Pipeline, Processed};
use crate::pixmap::Pixmap;
use serde::Serialize;
use tracing::{debug, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing selected
    Idle,
    /// A decoded source is held and ready
    FileSelected,
    /// A job is running
    Processing,
    /// The latest job produced a result
    Succeeded,
    /// The latest job failed; the session moves straight back to `FileSelected`
    Failed,
}

/// What the person using the tool is told after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureNotice {
    /// Error category
    pub kind: ErrorKind,
    /// Full error text, for logs and details views
    pub message: String,
    /// Short text for display
    pub user_message: &'static str,
}

impl From<&RasterError> for FailureNotice {
    fn from(err: &RasterError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            user_message: err.user_message(),
        }
    }
}

#[derive(Debug)]
struct Source {
    pixmap: Pixmap,
    format: Option<SourceFormat>,
    len: u64,
}

/// Holds one decoded source and the most recent result for it.
///
/// Selecting a new file or clearing drops both the previous source and any
/// result, so buffers never outlive the invocation that produced them.
#[derive(Debug)]
pub struct Session {
    pipeline: Pipeline,
    state: SessionState,
    history: Vec<SessionState>,
    source: Option<Source>,
    result: Option<Processed>,
    last_error: Option<FailureNotice>,
}

impl Session {
    /// An idle session running jobs through `pipeline`.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            source: None,
            result: None,
            last_error: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// States entered since the latest `select`, `process` or `clear` began,
    /// oldest first, starting with the state that call found.
    ///
    /// Earlier invocations are dropped, so the history stays a handful of
    /// entries however long the session lives.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Error from the most recent failed select or process.
    pub fn last_error(&self) -> Option<&FailureNotice> {
        self.last_error.as_ref()
    }

    /// The decoded source, if a file is selected.
    pub fn source(&self) -> Option<&Pixmap> {
        self.source.as_ref().map(|s| &s.pixmap)
    }

    /// The most recent successful result.
    pub fn result(&self) -> Option<&Processed> {
        self.result.as_ref()
    }

    fn begin(&mut self) {
        self.history.clear();
        self.history.push(self.state);
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session transition");
        self.state = next;
        self.history.push(next);
    }

    /// Decode `bytes` and hold them as the current source.
    ///
    /// Any previous source and result are dropped first. On a decode failure
    /// the session is left idle.
    pub fn select(&mut self, bytes: &[u8], declared: Option<SourceFormat>) -> Result<()> {
        self.begin();
        self.source = None;
        self.result = None;
        self.last_error = None;

        match self.pipeline.decode(bytes, declared) {
            Ok(pixmap) => {
                let format = detect_format(bytes).ok().or(declared);
                self.source = Some(Source { pixmap, format, len: bytes.len() as u64 });
                self.enter(SessionState::FileSelected);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Could not decode selected file");
                self.last_error = Some(FailureNotice::from(&e));
                if self.state != SessionState::Idle {
                    self.enter(SessionState::Idle);
                }
                Err(e)
            }
        }
    }

    /// Run `job` on the selected source.
    pub fn process(&mut self, job: &Job) -> Result<&Processed> {
        self.process_with(job, &CancellationToken::new())
    }

    /// Run `job` on the selected source, honouring `cancel`.
    ///
    /// On success the result replaces any earlier one. On failure the error is
    /// kept in [`Session::last_error`], the earlier result is dropped, and the
    /// session returns to `FileSelected` so the caller can retry.
    pub fn process_with(&mut self, job: &Job, cancel: &CancellationToken) -> Result<&Processed> {
        if self.source.is_none() {
            return Err(RasterError::EmptyInput);
        }

        self.result = None;
        self.last_error = None;
        self.begin();
        self.enter(SessionState::Processing);

        let run = match self.source.as_ref() {
            Some(source) => self.pipeline.run(&source.pixmap, job, cancel),
            None => Err(RasterError::EmptyInput),
        };

        match run {
            Ok(processed) => {
                self.enter(SessionState::Succeeded);
                Ok(&*self.result.insert(processed))
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Processing failed");
                self.enter(SessionState::Failed);
                self.enter(SessionState::FileSelected);
                self.last_error = Some(FailureNotice::from(&e));
                Err(e)
            }
        }
    }

    /// Analysis of the selected source.
    pub fn analyze(&self) -> Result<ImageAnalysis> {
        let source = self.source.as_ref().ok_or(RasterError::EmptyInput)?;
        self.pipeline.analyze(&source.pixmap, Some(source.len))
    }

    /// Property tags for the selected source.
    pub fn tags(&self) -> Result<Vec<&'static str>> {
        let source = self.source.as_ref().ok_or(RasterError::EmptyInput)?;
        let (w, h) = source.pixmap.dimensions();
        Ok(suggest_tags(w, h, source.format))
    }

    /// Drop the source and any result, returning to `Idle`.
    pub fn clear(&mut self) {
        self.begin();
        self.source = None;
        self.result = None;
        self.last_error = None;
        if self.state != SessionState::Idle {
            self.enter(SessionState::Idle);
        }
    }
}

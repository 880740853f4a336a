//! Readiness detection over a child's output stream
//!
//! Classification is a pure function of the line; the drain worker turns
//! classified lines into [`Signal`]s and owns the only writes to the
//! process's [`ReadinessState`].

use crate::runtime::command::LineStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const ERROR_KEYWORD: &str = "error";
const WARNING_KEYWORD: &str = "warning";

/// Case-insensitive substrings that must all appear in a line for the
/// service to be considered started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyMarker {
    parts: Vec<String>,
}

impl ReadyMarker {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            parts: parts
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Byte offset of the earliest marker part in `lower`, if every part is present
    fn earliest_match(&self, lower: &str) -> Option<usize> {
        if self.parts.is_empty() {
            return None;
        }
        let mut earliest = usize::MAX;
        for part in &self.parts {
            earliest = earliest.min(lower.find(part.as_str())?);
        }
        Some(earliest)
    }
}

/// Per-service classification rules
#[derive(Debug, Clone)]
pub struct DetectorRules {
    /// Marker designating successful startup
    pub ready: ReadyMarker,
    /// Keywords for lines worth highlighting (e.g. "database connected")
    pub notices: Vec<String>,
}

impl DetectorRules {
    pub fn new<S: AsRef<str>>(ready: ReadyMarker, notices: &[S]) -> Self {
        Self {
            ready,
            notices: notices.iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }

    /// Classify a single output line.
    ///
    /// The ready marker wins over the error keyword, except when "error"
    /// appears before the marker: such a line reports a failure about the
    /// startup condition rather than the condition itself.
    pub fn classify(&self, line: &str) -> LineClass {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineClass::Empty;
        }

        let lower = trimmed.to_lowercase();
        let error_at = if lower.contains(WARNING_KEYWORD) {
            None
        } else {
            lower.find(ERROR_KEYWORD)
        };

        if let Some(ready_at) = self.ready.earliest_match(&lower) {
            match error_at {
                Some(err) if err < ready_at => {}
                _ => return LineClass::Ready,
            }
        }

        if error_at.is_some() {
            return LineClass::Error;
        }

        if self.notices.iter().any(|n| lower.contains(n.as_str())) {
            return LineClass::Notice;
        }

        LineClass::Info
    }
}

/// Classification of one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Ready,
    Error,
    Notice,
    Info,
    Empty,
}

/// Signal emitted by a drain worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// First ready-marker line of this process instance
    Ready(String),
    /// Line containing an error
    Error(String),
    /// Highlighted informational line
    Notice(String),
    /// Any other output line
    Info(String),
    /// Output stream ended (process exited or was terminated)
    Closed,
}

/// Readiness state shared between a drain worker and the controller
#[derive(Debug, Default)]
pub struct ReadinessState {
    ready: AtomicBool,
    closed: AtomicBool,
    last_error_line: Mutex<Option<String>>,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the ready latch is set. Once true it stays true.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether the output stream has ended
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Most recent error line seen on the stream
    pub fn last_error_line(&self) -> Option<String> {
        self.last_error_line
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Set the latch. Returns true only for the call that flipped it.
    fn latch_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::AcqRel)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn record_error(&self, line: &str) {
        *self
            .last_error_line
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(line.to_string());
    }
}

/// Drain worker for one managed process
pub struct ReadinessDetector {
    name: String,
    rules: DetectorRules,
    state: Arc<ReadinessState>,
}

impl ReadinessDetector {
    pub fn new(name: impl Into<String>, rules: DetectorRules, state: Arc<ReadinessState>) -> Self {
        Self {
            name: name.into(),
            rules,
            state,
        }
    }

    /// Drain `lines` until the child closes its output, emitting signals.
    ///
    /// Never blocks on the receiver: signals go through an unbounded channel,
    /// and a dropped receiver only stops emission, not draining.
    pub async fn run(
        self,
        mut lines: LineStream,
        signals: mpsc::UnboundedSender<(String, Signal)>,
    ) {
        while let Some(line) = lines.recv().await {
            if let Some(signal) = self.observe(&line) {
                let _ = signals.send((self.name.clone(), signal));
            }
        }

        self.state.mark_closed();
        log::debug!("[{}] Output stream closed", self.name);
        let _ = signals.send((self.name.clone(), Signal::Closed));
    }

    /// Apply one line to the state and return the signal to emit, if any
    fn observe(&self, line: &str) -> Option<Signal> {
        let trimmed = line.trim();
        match self.rules.classify(trimmed) {
            LineClass::Ready => self
                .state
                .latch_ready()
                .then(|| Signal::Ready(trimmed.to_string())),
            LineClass::Error => {
                self.state.record_error(trimmed);
                Some(Signal::Error(trimmed.to_string()))
            }
            LineClass::Notice => Some(Signal::Notice(trimmed.to_string())),
            LineClass::Info => Some(Signal::Info(trimmed.to_string())),
            LineClass::Empty => None,
        }
    }
}

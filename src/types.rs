use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Backend readiness as seen by the liveness monitor.
///
/// Monotonic within a session: once `Ready`, it never goes back to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendStatus {
    #[default]
    Unknown,
    Ready,
}

/// A generated audio artifact returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Location of the audio file on the local machine.
    pub audio_file: PathBuf,
    /// File name shown to the user.
    pub display_name: String,
}

/// Lifecycle of the single generation job: Idle -> Submitting -> Succeeded/Failed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Succeeded(GenerationResult),
    Failed(String),
}

impl JobState {
    /// Whether the loading indicator should be shown (and generate disabled).
    pub fn is_loading(&self) -> bool {
        matches!(self, JobState::Submitting)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            JobState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Idle => "idle",
            JobState::Submitting => "submitting",
            JobState::Succeeded(_) => "succeeded",
            JobState::Failed(_) => "failed",
        }
    }
}

/// Why a submission was refused before any network call was made.
///
/// Refusals are a disabled-action state, not failures; they are never shown
/// as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    BackendNotReady,
    EmptyPrompt,
    InvalidParameter(String),
    InFlight,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::BackendNotReady => write!(f, "backend is not ready yet"),
            Refusal::EmptyPrompt => write!(f, "prompt is empty"),
            Refusal::InvalidParameter(reason) => write!(f, "{}", reason),
            Refusal::InFlight => write!(f, "a generation is already running"),
        }
    }
}

/// Outcome of a call to [`GenerationPipeline::submit`](crate::GenerationPipeline::submit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Refused at the boundary; no request was sent and job state is unchanged.
    Refused(Refusal),
    /// The backend produced an artifact.
    Succeeded(GenerationResult),
    /// The backend (or the network) failed; the message is shown verbatim.
    Failed(String),
    /// The user cancelled the request before it resolved.
    Cancelled,
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Backend;
use crate::error::{NoisesError, Result};
use crate::params::GenerationConfig;
use crate::payload::{GeneratePayload, GenerateResponse};
use crate::types::{BackendStatus, GenerationResult, JobState, Refusal, Submission};

/// Single-flight generation pipeline.
///
/// Owns the one [`JobState`]. A submission is refused, without touching the
/// network, while the backend is not ready, while the config does not
/// validate, or while another submission is still in flight. Accepted
/// submissions replace any previous result or error right away.
pub struct GenerationPipeline<B> {
    backend: Arc<B>,
    status: watch::Receiver<BackendStatus>,
    job: watch::Sender<JobState>,
    cancel: Mutex<Option<CancellationToken>>,
    timeout: Option<Duration>,
}

impl<B> GenerationPipeline<B>
where
    B: Backend,
{
    pub fn new(backend: Arc<B>, status: watch::Receiver<BackendStatus>) -> Self {
        let (job, _) = watch::channel(JobState::Idle);
        Self {
            backend,
            status,
            job,
            cancel: Mutex::new(None),
            timeout: None,
        }
    }

    /// Give up on a generation that has not answered within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Observe job state changes (loading indicator, result, error).
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.job.subscribe()
    }

    /// Snapshot of the current job state.
    pub fn state(&self) -> JobState {
        self.job.borrow().clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.job.borrow().is_loading()
    }

    /// Whether a submission of `config` would be accepted right now.
    pub fn check(&self, config: &GenerationConfig) -> std::result::Result<(), Refusal> {
        if *self.status.borrow() != BackendStatus::Ready {
            return Err(Refusal::BackendNotReady);
        }
        config.validate()?;
        if self.is_submitting() {
            return Err(Refusal::InFlight);
        }
        Ok(())
    }

    /// Submit one generation and wait for it to resolve.
    pub async fn submit(&self, config: &GenerationConfig) -> Submission {
        if *self.status.borrow() != BackendStatus::Ready {
            debug!("generation refused: backend not ready");
            return Submission::Refused(Refusal::BackendNotReady);
        }
        if let Err(refusal) = config.validate() {
            debug!(%refusal, "generation refused");
            return Submission::Refused(refusal);
        }

        let payload = GeneratePayload::from_config(config);
        let token = CancellationToken::new();
        {
            let mut slot = match self.cancel.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            let mut in_flight = false;
            self.job.send_if_modified(|state| {
                if state.is_loading() {
                    in_flight = true;
                    return false;
                }
                *state = JobState::Submitting;
                true
            });
            if in_flight {
                debug!("generation refused: another request is in flight");
                return Submission::Refused(Refusal::InFlight);
            }
            *slot = Some(token.clone());
        }

        info!(mode = %config.mode(), prompt = %payload.prompt, "submitting generation");

        let outcome = tokio::select! {
            _ = token.cancelled() => Err(NoisesError::Cancelled),
            response = self.dispatch(&payload) => response.and_then(first_result),
        };

        let (terminal, submission) = match outcome {
            Ok(result) => {
                info!(file = %result.display_name, "generation succeeded");
                (
                    JobState::Succeeded(result.clone()),
                    Submission::Succeeded(result),
                )
            }
            Err(NoisesError::Cancelled) => {
                info!("generation cancelled");
                (JobState::Idle, Submission::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                let message = e.to_string();
                (JobState::Failed(message.clone()), Submission::Failed(message))
            }
        };

        // The slot stays locked across the publish so the next submission
        // cannot install its token before this one is cleared.
        let mut slot = match self.cancel.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
        self.job.send_replace(terminal);
        drop(slot);
        submission
    }

    async fn dispatch(&self, payload: &GeneratePayload) -> Result<GenerateResponse> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.generate(payload))
                .await
                .map_err(|_| NoisesError::Timeout)?,
            None => self.backend.generate(payload).await,
        }
    }

    /// Abandon the in-flight request, if any. Returns whether one was running.
    ///
    /// The backend may still finish the work; its answer is discarded and the
    /// job returns to `Idle`.
    pub fn cancel(&self) -> bool {
        let slot = match self.cancel.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Clear a failed state so the error is no longer shown.
    pub fn dismiss_error(&self) -> bool {
        self.job.send_if_modified(|state| {
            if matches!(state, JobState::Failed(_)) {
                *state = JobState::Idle;
                true
            } else {
                false
            }
        })
    }
}

fn first_result(response: GenerateResponse) -> Result<GenerationResult> {
    let fallback = response.path;
    let first = response.files.into_iter().next().ok_or_else(|| {
        NoisesError::InvalidResponse("Backend response contained no files".into())
    })?;
    let location = first.path.or(fallback).ok_or_else(|| {
        NoisesError::InvalidResponse(format!("Backend response has no path for {}", first.file))
    })?;
    Ok(GenerationResult {
        audio_file: PathBuf::from(location),
        display_name: first.file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::GeneratedFile;

    #[test]
    fn test_first_result_uses_first_file() {
        let response = GenerateResponse {
            status: Some("success".into()),
            files: vec![
                GeneratedFile {
                    file: "a.wav".into(),
                    path: Some("/tmp/a.wav".into()),
                },
                GeneratedFile {
                    file: "b.wav".into(),
                    path: Some("/tmp/b.wav".into()),
                },
            ],
            path: Some("/tmp/a.wav".into()),
        };
        let result = first_result(response).unwrap();
        assert_eq!(result.display_name, "a.wav");
        assert_eq!(result.audio_file, PathBuf::from("/tmp/a.wav"));
    }

    #[test]
    fn test_first_result_falls_back_to_top_level_path() {
        let response = GenerateResponse {
            status: None,
            files: vec![GeneratedFile {
                file: "c.wav".into(),
                path: None,
            }],
            path: Some("/samples/c.wav".into()),
        };
        let result = first_result(response).unwrap();
        assert_eq!(result.audio_file, PathBuf::from("/samples/c.wav"));
    }

    #[test]
    fn test_first_result_rejects_empty_list() {
        let err = first_result(GenerateResponse::default()).unwrap_err();
        assert!(matches!(err, NoisesError::InvalidResponse(_)));
    }
}

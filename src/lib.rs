//! # noises
//!
//! Front-end core for a local AI sample generator. A Python inference service
//! (MusicGen for loops, ACE-Step for full songs) does the heavy lifting; this
//! crate owns everything on the user's side of the wire.
//!
//! - a typed parameter model with per-mode fields ([`GenerationConfig`])
//! - a liveness monitor that polls the backend until it first answers
//! - a single-flight generation pipeline with cancel and timeout
//! - durable presets in a small SQLite key-value store
//! - a result player that owns at most one playback resource
//!
//! ## Quick Start
//!
//! ```no_run
//! use noises::{BackendClient, GenerationConfig, GenerationPipeline, LivenessMonitor, Mode, Submission};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let backend = Arc::new(BackendClient::new("http://127.0.0.1:8000"));
//! let monitor = Arc::new(LivenessMonitor::new(Arc::clone(&backend), Duration::from_secs(1)));
//! let pipeline = GenerationPipeline::new(backend, monitor.subscribe());
//!
//! // Wait for the backend to come up
//! monitor.run().await;
//!
//! let mut config = GenerationConfig::new(Mode::Loop);
//! config.prompt = "808 kick loop".into();
//! config.set_bpm(140);
//! config.key = Some("F minor".parse().unwrap());
//!
//! if let Submission::Succeeded(result) = pipeline.submit(&config).await {
//!     println!("generated {}", result.audio_file.display());
//! }
//! # }
//! ```

pub mod app;
pub mod client;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod monitor;
pub mod output;
pub mod params;
pub mod payload;
pub mod pipeline;
pub mod player;
pub mod presets;
pub mod types;

pub use app::{App, AppEvent};
pub use client::{Backend, BackendClient};
pub use command::{Command, CommandError};
pub use config::AppConfig;
pub use error::{NoisesError, Result};
pub use export::{DragPayload, ExportSink, SystemExport};
pub use monitor::LivenessMonitor;
pub use output::DisabledOutput;
#[cfg(feature = "playback")]
pub use output::RodioOutput;
pub use params::{Enhancement, GenerationConfig, Mode, MusicalKey};
pub use payload::{GeneratePayload, GenerateResponse};
pub use pipeline::GenerationPipeline;
pub use player::{AudioOutput, PlaybackSource, ResultPlayer, Transport};
pub use presets::{Preset, PresetStore};
pub use types::{BackendStatus, GenerationResult, JobState, Refusal, Submission};

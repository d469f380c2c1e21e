//! Playback of the most recent generation.
//!
//! The player owns at most one playback resource. Loading a new artifact
//! releases the previous resource exactly once, which keeps repeated
//! generations from piling up open decoders and output sinks.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::export::{DragPayload, ExportSink};
use crate::types::GenerationResult;

/// Opens audio files into playable sources.
pub trait AudioOutput {
    type Source: PlaybackSource;

    fn open(&mut self, path: &Path) -> Result<Self::Source>;
}

/// One opened artifact. Starts paused at position zero.
pub trait PlaybackSource {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration) -> Result<()>;
    /// Go back to the beginning, ready to play again even after the end.
    fn rewind(&mut self) -> Result<()>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn set_volume(&mut self, volume: f32);
    /// Whether playback reached the end of the media.
    fn is_finished(&self) -> bool;
    /// Free the underlying resource.
    fn release(self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
}

struct Loaded<S> {
    result: GenerationResult,
    source: Option<S>,
}

/// Transport, volume and export controls for the latest artifact.
pub struct ResultPlayer<O, X>
where
    O: AudioOutput,
    X: ExportSink,
{
    output: O,
    export: X,
    current: Option<Loaded<O::Source>>,
    transport: Transport,
    progress: f64,
    volume: f32,
    muted: bool,
    repeat: bool,
}

impl<O, X> ResultPlayer<O, X>
where
    O: AudioOutput,
    X: ExportSink,
{
    pub fn new(output: O, export: X) -> Self {
        Self {
            output,
            export,
            current: None,
            transport: Transport::Stopped,
            progress: 0.0,
            volume: 1.0,
            muted: false,
            repeat: true,
        }
    }

    /// Replace the current artifact.
    ///
    /// An artifact that cannot be opened is still kept for reveal/drag, but
    /// the transport controls stay inert until the next successful load.
    pub fn load(&mut self, result: GenerationResult) {
        self.unload();

        let source = match self.output.open(&result.audio_file) {
            Ok(mut source) => {
                source.set_volume(self.effective_volume());
                info!(file = %result.display_name, "artifact loaded");
                Some(source)
            }
            Err(e) => {
                warn!(file = %result.audio_file.display(), error = %e, "failed to load artifact");
                None
            }
        };
        self.current = Some(Loaded { result, source });
    }

    /// Release the current playback resource, if any.
    pub fn unload(&mut self) {
        if let Some(loaded) = self.current.take() {
            if let Some(source) = loaded.source {
                debug!(file = %loaded.result.display_name, "releasing playback resource");
                source.release();
            }
        }
        self.transport = Transport::Stopped;
        self.progress = 0.0;
    }

    pub fn artifact(&self) -> Option<&GenerationResult> {
        self.current.as_ref().map(|loaded| &loaded.result)
    }

    /// Whether a playable source is loaded.
    pub fn is_playable(&self) -> bool {
        self.source().is_some()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    /// Playback position as a percentage of the duration.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn duration(&self) -> Option<Duration> {
        self.source().and_then(|s| s.duration())
    }

    /// Play when stopped, pause when playing. No-op without a source.
    pub fn toggle_play(&mut self) {
        let next = match self.transport {
            Transport::Stopped => Transport::Playing,
            Transport::Playing => Transport::Stopped,
        };
        let Some(source) = self.source_mut() else {
            return;
        };
        match next {
            Transport::Playing => source.play(),
            Transport::Stopped => source.pause(),
        }
        self.transport = next;
    }

    /// Jump to a fraction (0.0..=1.0) of the track. Play/pause is unchanged.
    pub fn seek(&mut self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let Some(source) = self.source_mut() else {
            return;
        };
        let Some(total) = source.duration() else {
            debug!("seek ignored: duration unknown");
            return;
        };
        match source.seek(total.mul_f64(fraction)) {
            Ok(()) => self.progress = fraction * 100.0,
            Err(e) => warn!(error = %e, "seek failed"),
        }
    }

    /// Refresh progress and handle end-of-media. Call periodically.
    pub fn tick(&mut self) {
        let playing = self.is_playing();
        let repeat = self.repeat;
        let Some(source) = self.source_mut() else {
            return;
        };

        if playing && source.is_finished() {
            if repeat {
                match source.rewind() {
                    Ok(()) => {
                        source.play();
                        self.progress = 0.0;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to restart playback");
                        self.transport = Transport::Stopped;
                        self.progress = 0.0;
                    }
                }
            } else {
                if let Err(e) = source.rewind() {
                    debug!(error = %e, "rewind after end failed");
                }
                source.pause();
                self.transport = Transport::Stopped;
                self.progress = 0.0;
            }
            return;
        }

        let position = source.position();
        self.progress = match source.duration() {
            Some(total) if !total.is_zero() => {
                (position.as_secs_f64() / total.as_secs_f64() * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    /// Restart from the beginning at end-of-media instead of stopping.
    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Volume actually applied to the output.
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.apply_volume();
    }

    /// Flip mute. The stored volume is left alone.
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        self.apply_volume();
    }

    /// Open the artifact's folder in the file manager. Failures are logged.
    pub fn reveal(&self) {
        let Some(result) = self.artifact() else {
            return;
        };
        if let Err(e) = self.export.reveal(&result.audio_file) {
            warn!(file = %result.audio_file.display(), error = %e, "reveal in folder failed");
        }
    }

    /// Unload the artifact and remove its file from disk.
    ///
    /// The playback resource is released before the file is removed. The
    /// artifact is gone from the player either way; returns whether the file
    /// was actually deleted. Failures are logged.
    pub fn delete(&mut self) -> bool {
        let Some(result) = self.artifact().cloned() else {
            return false;
        };
        self.unload();
        match std::fs::remove_file(&result.audio_file) {
            Ok(()) => {
                info!(file = %result.display_name, "artifact deleted");
                true
            }
            Err(e) => {
                warn!(file = %result.audio_file.display(), error = %e, "delete failed");
                false
            }
        }
    }

    /// Start a drag carrying the artifact. Failures are logged.
    pub fn start_drag(&self) {
        let Some(result) = self.artifact() else {
            return;
        };
        let outcome =
            DragPayload::new(&result.audio_file).and_then(|payload| self.export.start_drag(&payload));
        if let Err(e) = outcome {
            warn!(file = %result.audio_file.display(), error = %e, "drag export failed");
        }
    }

    fn apply_volume(&mut self) {
        let effective = self.effective_volume();
        if let Some(source) = self.source_mut() {
            source.set_volume(effective);
        }
    }

    fn source(&self) -> Option<&O::Source> {
        self.current.as_ref().and_then(|loaded| loaded.source.as_ref())
    }

    fn source_mut(&mut self) -> Option<&mut O::Source> {
        self.current.as_mut().and_then(|loaded| loaded.source.as_mut())
    }
}

impl<O, X> Drop for ResultPlayer<O, X>
where
    O: AudioOutput,
    X: ExportSink,
{
    fn drop(&mut self) {
        self.unload();
    }
}

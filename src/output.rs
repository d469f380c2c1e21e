//! Concrete audio outputs.

use std::path::Path;
use std::time::Duration;

use crate::error::{NoisesError, Result};
use crate::player::{AudioOutput, PlaybackSource};

/// Output used when the crate is built without the `playback` feature.
///
/// Every open fails, so artifacts stay exportable but are not playable.
#[derive(Debug, Clone, Default)]
pub struct DisabledOutput;

/// Never constructed; exists to satisfy [`AudioOutput::Source`].
#[derive(Debug)]
pub enum NoSource {}

impl PlaybackSource for NoSource {
    fn play(&mut self) {
        match *self {}
    }
    fn pause(&mut self) {
        match *self {}
    }
    fn seek(&mut self, _position: Duration) -> Result<()> {
        match *self {}
    }
    fn rewind(&mut self) -> Result<()> {
        match *self {}
    }
    fn position(&self) -> Duration {
        match *self {}
    }
    fn duration(&self) -> Option<Duration> {
        match *self {}
    }
    fn set_volume(&mut self, _volume: f32) {
        match *self {}
    }
    fn is_finished(&self) -> bool {
        match *self {}
    }
    fn release(self) {
        match self {}
    }
}

impl AudioOutput for DisabledOutput {
    type Source = NoSource;

    fn open(&mut self, path: &Path) -> Result<NoSource> {
        Err(NoisesError::Playback(format!(
            "audio output disabled (build with --features playback to play {})",
            path.display()
        )))
    }
}

#[cfg(feature = "playback")]
pub use rodio_output::{RodioOutput, RodioSource};

#[cfg(feature = "playback")]
mod rodio_output {
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use crate::error::{NoisesError, Result};
    use crate::player::{AudioOutput, PlaybackSource};

    /// Plays artifacts on the default output device.
    pub struct RodioOutput {
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl RodioOutput {
        pub fn new() -> Result<Self> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|e| NoisesError::Playback(format!("failed to open audio output: {}", e)))?;
            Ok(Self {
                _stream: stream,
                handle,
            })
        }
    }

    fn decode(path: &Path) -> Result<Decoder<BufReader<File>>> {
        let file = File::open(path)
            .map_err(|e| NoisesError::Playback(format!("failed to open {}: {}", path.display(), e)))?;
        Decoder::new(BufReader::new(file))
            .map_err(|e| NoisesError::Playback(format!("failed to decode {}: {}", path.display(), e)))
    }

    impl AudioOutput for RodioOutput {
        type Source = RodioSource;

        fn open(&mut self, path: &Path) -> Result<RodioSource> {
            let decoder = decode(path)?;
            let duration = decoder.total_duration();
            let sink = Sink::try_new(&self.handle)
                .map_err(|e| NoisesError::Playback(format!("failed to create audio sink: {}", e)))?;
            sink.pause();
            sink.append(decoder);
            Ok(RodioSource {
                path: path.to_path_buf(),
                sink,
                duration,
            })
        }
    }

    /// A decoded file queued on its own sink.
    pub struct RodioSource {
        path: PathBuf,
        sink: Sink,
        duration: Option<Duration>,
    }

    impl PlaybackSource for RodioSource {
        fn play(&mut self) {
            self.sink.play();
        }

        fn pause(&mut self) {
            self.sink.pause();
        }

        fn seek(&mut self, position: Duration) -> Result<()> {
            self.sink
                .try_seek(position)
                .map_err(|e| NoisesError::Playback(format!("seek failed: {}", e)))
        }

        fn rewind(&mut self) -> Result<()> {
            if self.sink.empty() {
                // the decoder is consumed at end-of-media; queue a fresh one
                let decoder = decode(&self.path)?;
                self.sink.append(decoder);
                Ok(())
            } else {
                self.seek(Duration::ZERO)
            }
        }

        fn position(&self) -> Duration {
            self.sink.get_pos()
        }

        fn duration(&self) -> Option<Duration> {
            self.duration
        }

        fn set_volume(&mut self, volume: f32) {
            self.sink.set_volume(volume);
        }

        fn is_finished(&self) -> bool {
            self.sink.empty()
        }

        fn release(self) {
            self.sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_output_refuses() {
        let mut output = DisabledOutput;
        let err = output.open(Path::new("/tmp/x.wav")).unwrap_err();
        assert!(matches!(err, NoisesError::Playback(_)));
    }
}

//! Application state and command dispatch.
//!
//! [`App`] is the one place that ties the parameter model, the pipeline, the
//! preset store and the player together. Generations run on a spawned task
//! and report back through [`AppEvent`]s so the caller's event loop never
//! blocks on the network.

use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Backend;
use crate::command::{Command, HELP};
use crate::export::ExportSink;
use crate::params::{GenerationConfig, ModeParams};
use crate::pipeline::GenerationPipeline;
use crate::player::{AudioOutput, ResultPlayer};
use crate::presets::PresetStore;
use crate::types::{BackendStatus, Submission};

/// Reported by background work back to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A spawned submission resolved.
    Generation(Submission),
}

pub struct App<B, O, X>
where
    B: Backend + 'static,
    O: AudioOutput,
    X: ExportSink,
{
    config: GenerationConfig,
    presets: PresetStore,
    pipeline: Arc<GenerationPipeline<B>>,
    player: ResultPlayer<O, X>,
    status: watch::Receiver<BackendStatus>,
    events: mpsc::UnboundedSender<AppEvent>,
    autoplay: bool,
}

impl<B, O, X> App<B, O, X>
where
    B: Backend + 'static,
    O: AudioOutput,
    X: ExportSink,
{
    pub fn new(
        pipeline: Arc<GenerationPipeline<B>>,
        status: watch::Receiver<BackendStatus>,
        presets: PresetStore,
        player: ResultPlayer<O, X>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            config: GenerationConfig::default(),
            presets,
            pipeline,
            player,
            status,
            events,
            autoplay: true,
        }
    }

    /// Start playing each new result as soon as it is loaded.
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GenerationConfig {
        &mut self.config
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn player(&self) -> &ResultPlayer<O, X> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut ResultPlayer<O, X> {
        &mut self.player
    }

    pub fn pipeline(&self) -> &Arc<GenerationPipeline<B>> {
        &self.pipeline
    }

    pub fn backend_status(&self) -> BackendStatus {
        *self.status.borrow()
    }

    /// Submit the current config on a background task.
    ///
    /// Returns `None` when the submission is refused up front; the outcome of
    /// an accepted submission arrives later as [`AppEvent::Generation`]. An
    /// accepted submission unloads the previous result right away.
    pub fn generate(&mut self) -> Option<JoinHandle<()>> {
        if let Err(refusal) = self.pipeline.check(&self.config) {
            debug!(%refusal, "generate not available");
            return None;
        }
        self.player.unload();
        let pipeline = Arc::clone(&self.pipeline);
        let config = self.config.clone();
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            let outcome = pipeline.submit(&config).await;
            if events.send(AppEvent::Generation(outcome)).is_err() {
                debug!("event loop closed before generation resolved");
            }
        }))
    }

    /// Apply a background event. Returns a line for the user, if any.
    pub fn handle_event(&mut self, event: AppEvent) -> Option<String> {
        match event {
            AppEvent::Generation(Submission::Succeeded(result)) => {
                let name = result.display_name.clone();
                self.player.load(result);
                if self.autoplay && self.player.is_playable() && !self.player.is_playing() {
                    self.player.toggle_play();
                }
                Some(format!("ready: {}", name))
            }
            AppEvent::Generation(Submission::Failed(message)) => {
                self.player.unload();
                Some(format!("error: {}", message))
            }
            AppEvent::Generation(Submission::Cancelled) => Some("generation cancelled".into()),
            AppEvent::Generation(Submission::Refused(refusal)) => {
                Some(format!("not generated: {}", refusal))
            }
        }
    }

    /// Periodic housekeeping (player progress and end-of-media).
    pub fn tick(&mut self) {
        self.player.tick();
    }

    /// Apply one command and describe what happened.
    pub fn execute(&mut self, command: Command) -> String {
        match command {
            Command::Mode(mode) => {
                if mode == self.config.mode() {
                    return format!("already in {} mode", mode);
                }
                self.config.set_mode(mode);
                info!(%mode, "mode switched");
                format!("mode: {} (prompts and {} settings reset)", mode, mode)
            }
            Command::Prompt(text) => {
                self.config.prompt = text;
                format!("prompt: {}", self.config.prompt)
            }
            Command::Negative(text) => {
                self.config.negative_prompt = text;
                format!("negative: {}", self.config.negative_prompt)
            }
            Command::Bpm(bpm) => loop_only(self.config.set_bpm(bpm), || format!("bpm: {}", bpm)),
            Command::Key(key) => {
                self.config.key = key;
                match key {
                    Some(key) => format!("key: {}", key),
                    None => "key: none".into(),
                }
            }
            Command::Length(seconds) => {
                self.config.duration_seconds = seconds;
                format!("length: {}s", seconds)
            }
            Command::Steps(steps) => {
                self.config.steps = steps;
                format!("steps: {}", steps)
            }
            Command::Guidance(scale) => {
                self.config.guidance_scale = scale;
                format!("guidance: {}", scale)
            }
            Command::Seed(seed) => {
                self.config.seed = seed;
                match seed {
                    Some(seed) => format!("seed: {}", seed),
                    None => "seed: random".into(),
                }
            }
            Command::Temperature(t) => loop_only(self.config.set_temperature(t), || {
                format!("temperature: {}", t)
            }),
            Command::TopK(k) => loop_only(self.config.set_top_k(k), || format!("topk: {}", k)),
            Command::Lyrics(text) => {
                let lines = text.lines().count();
                song_only(self.config.set_lyrics(text), || format!("lyrics: {} line(s)", lines))
            }
            Command::Scheduler(scheduler) => song_only(self.config.set_scheduler(scheduler), || {
                format!("scheduler: {:?}", scheduler).to_lowercase()
            }),
            Command::Cfg(cfg) => song_only(self.config.set_cfg_type(cfg), || {
                format!("cfg: {:?}", cfg).to_lowercase()
            }),
            Command::Enhance(enhancement) => {
                self.config.apply_enhancement(enhancement);
                format!("prompt: {}", self.config.prompt)
            }
            Command::Generate => match self.pipeline.check(&self.config) {
                Ok(()) => {
                    self.generate();
                    format!("generating {}...", self.config.mode())
                }
                Err(refusal) => format!("cannot generate: {}", refusal),
            },
            Command::Cancel => {
                if self.pipeline.cancel() {
                    "cancelling".into()
                } else {
                    "nothing to cancel".into()
                }
            }
            Command::Dismiss => {
                if self.pipeline.dismiss_error() {
                    "error dismissed".into()
                } else {
                    "no error to dismiss".into()
                }
            }
            Command::Play => {
                if !self.player.is_playable() {
                    return "nothing to play".into();
                }
                self.player.toggle_play();
                if self.player.is_playing() {
                    "playing".into()
                } else {
                    "paused".into()
                }
            }
            Command::Seek(percent) => {
                if !self.player.is_playable() {
                    return "nothing to seek".into();
                }
                self.player.seek(percent / 100.0);
                format!("position: {:.0}%", self.player.progress())
            }
            Command::Volume(percent) => {
                self.player.set_volume(percent / 100.0);
                format!("volume: {:.0}%", self.player.volume() * 100.0)
            }
            Command::Mute => {
                self.player.toggle_mute();
                if self.player.is_muted() {
                    "muted".into()
                } else {
                    "unmuted".into()
                }
            }
            Command::Repeat(on) => {
                self.player.set_repeat(on);
                format!("repeat: {}", if on { "on" } else { "off" })
            }
            Command::Reveal => match self.player.artifact() {
                Some(result) => {
                    let reply = format!("revealing {}", result.audio_file.display());
                    self.player.reveal();
                    reply
                }
                None => "nothing to reveal".into(),
            },
            Command::Drag => match self.player.artifact() {
                Some(result) => {
                    let reply = format!("dragging {}", result.display_name);
                    self.player.start_drag();
                    reply
                }
                None => "nothing to drag".into(),
            },
            Command::Delete => {
                let Some(name) = self.player.artifact().map(|r| r.display_name.clone()) else {
                    return "nothing to delete".into();
                };
                if self.player.delete() {
                    format!("deleted {}", name)
                } else {
                    format!("could not delete {}", name)
                }
            }
            Command::PresetSave => match self.presets.save(&self.config) {
                Ok(preset) => format!("saved preset {} ({})", preset.label, preset.id),
                Err(e) => {
                    warn!(error = %e, "failed to save preset");
                    format!("could not save preset: {}", e)
                }
            },
            Command::PresetList => self.describe_presets(),
            Command::PresetLoad(id) => {
                let Some(preset) = self.find_preset(&id) else {
                    return format!("no preset '{}'", id);
                };
                self.config.apply_preset(&preset);
                format!("loaded preset {}", preset.label)
            }
            Command::PresetRemove(id) => {
                let id = self.find_preset(&id).map(|p| p.id).unwrap_or(id);
                match self.presets.remove(&id) {
                    Ok(true) => format!("removed preset {}", id),
                    Ok(false) => format!("no preset '{}'", id),
                    Err(e) => {
                        warn!(error = %e, "failed to remove preset");
                        format!("could not remove preset: {}", e)
                    }
                }
            }
            Command::PresetClear => match self.presets.clear() {
                Ok(()) => "presets cleared".into(),
                Err(e) => {
                    warn!(error = %e, "failed to clear presets");
                    format!("could not clear presets: {}", e)
                }
            },
            Command::Show => self.describe_config(),
            Command::Status => self.describe_status(),
            Command::Help => HELP.to_string(),
            Command::Quit => "bye".into(),
        }
    }

    /// Look a preset up by id, or by its 1-based position in the list.
    fn find_preset(&self, id: &str) -> Option<crate::presets::Preset> {
        if let Some(preset) = self.presets.get(id) {
            return Some(preset.clone());
        }
        let index = id.parse::<usize>().ok()?.checked_sub(1)?;
        self.presets.list().get(index).cloned()
    }

    fn describe_presets(&self) -> String {
        if self.presets.is_empty() {
            return "no presets".into();
        }
        let mut out = String::new();
        for (i, preset) in self.presets.list().iter().enumerate() {
            let _ = write!(out, "{:>2}. {:<23} {:<5} {}", i + 1, preset.label, preset.mode, preset.id);
            if i + 1 < self.presets.len() {
                out.push('\n');
            }
        }
        out
    }

    fn describe_config(&self) -> String {
        let c = &self.config;
        let mut out = String::new();
        let _ = writeln!(out, "mode:      {}", c.mode());
        let _ = writeln!(out, "prompt:    {}", c.prompt);
        if !c.negative_prompt.is_empty() {
            let _ = writeln!(out, "negative:  {}", c.negative_prompt);
        }
        let _ = writeln!(
            out,
            "key:       {}",
            c.key.map(|k| k.to_string()).unwrap_or_else(|| "none".into())
        );
        let _ = writeln!(out, "length:    {}s", c.duration_seconds);
        let _ = writeln!(out, "steps:     {}", c.steps);
        let _ = writeln!(out, "guidance:  {}", c.guidance_scale);
        let _ = write!(
            out,
            "seed:      {}",
            c.seed.map(|s| s.to_string()).unwrap_or_else(|| "random".into())
        );
        match &c.params {
            ModeParams::Loop(p) => {
                let _ = write!(
                    out,
                    "\nbpm:       {}\ntemp:      {}\ntopk:      {}",
                    p.bpm, p.temperature, p.top_k
                );
            }
            ModeParams::FullSong(p) => {
                let _ = write!(
                    out,
                    "\nlyrics:    {} line(s)\nscheduler: {:?}\ncfg:       {:?}",
                    p.lyrics.lines().count(),
                    p.scheduler,
                    p.cfg_type
                );
            }
        }
        out
    }

    fn describe_status(&self) -> String {
        let backend = match self.backend_status() {
            BackendStatus::Ready => "ready",
            BackendStatus::Unknown => "connecting",
        };
        let job = self.pipeline.state();
        let mut out = format!("backend: {}\njob:     {}", backend, job.as_str());
        if let Some(error) = job.error() {
            let _ = write!(out, " ({})", error);
        }
        match self.player.artifact() {
            Some(result) => {
                let _ = write!(
                    out,
                    "\nplayer:  {} [{}] {:.0}% vol {:.0}%{}{}",
                    result.display_name,
                    if self.player.is_playing() { "playing" } else { "stopped" },
                    self.player.progress(),
                    self.player.volume() * 100.0,
                    if self.player.is_muted() { " muted" } else { "" },
                    if self.player.is_playable() { "" } else { " (not playable)" },
                );
            }
            None => out.push_str("\nplayer:  empty"),
        }
        out
    }
}

fn loop_only(applied: bool, reply: impl FnOnce() -> String) -> String {
    if applied {
        reply()
    } else {
        "only applies in loop mode".into()
    }
}

fn song_only(applied: bool, reply: impl FnOnce() -> String) -> String {
    if applied {
        reply()
    } else {
        "only applies in song mode".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NoisesError, Result};
    use crate::export::DragPayload;
    use crate::output::DisabledOutput;
    use crate::params::Mode;
    use crate::payload::{GeneratePayload, GenerateResponse};
    use crate::types::GenerationResult;
    use std::path::{Path, PathBuf};

    struct Offline;

    impl Backend for Offline {
        async fn health(&self) -> Result<bool> {
            Ok(false)
        }

        async fn generate(&self, _payload: &GeneratePayload) -> Result<GenerateResponse> {
            Err(NoisesError::Other("offline".into()))
        }
    }

    struct NoExport;

    impl ExportSink for NoExport {
        fn reveal(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        fn start_drag(&self, _payload: &DragPayload) -> Result<()> {
            Ok(())
        }
    }

    fn app() -> (
        App<Offline, DisabledOutput, NoExport>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (_status_tx, status) = watch::channel(BackendStatus::Unknown);
        let pipeline = Arc::new(GenerationPipeline::new(Arc::new(Offline), status.clone()));
        let (events, rx) = mpsc::unbounded_channel();
        let app = App::new(
            pipeline,
            status,
            PresetStore::open(None).unwrap(),
            ResultPlayer::new(DisabledOutput, NoExport),
            events,
        );
        (app, rx)
    }

    fn run(app: &mut App<Offline, DisabledOutput, NoExport>, line: &str) -> String {
        app.execute(line.parse().unwrap())
    }

    #[test]
    fn test_edit_config() {
        let (mut app, _rx) = app();
        run(&mut app, "prompt 808 kick loop");
        run(&mut app, "bpm 140");
        run(&mut app, "key F minor");
        assert_eq!(app.config().prompt, "808 kick loop");
        assert_eq!(app.config().loop_params().unwrap().bpm, 140);
        assert_eq!(app.config().key.unwrap().to_string(), "F minor");

        assert_eq!(run(&mut app, "lyrics la la"), "only applies in song mode");
    }

    #[test]
    fn test_mode_switch_resets_prompt() {
        let (mut app, _rx) = app();
        run(&mut app, "prompt dusty breakbeat");
        run(&mut app, "mode song");
        assert_eq!(app.config().mode(), Mode::FullSong);
        assert!(app.config().prompt.is_empty());
        assert_eq!(run(&mut app, "bpm 100"), "only applies in loop mode");
    }

    #[test]
    fn test_generate_refused_while_connecting() {
        let (mut app, mut rx) = app();
        run(&mut app, "prompt anything");
        let reply = run(&mut app, "generate");
        assert_eq!(reply, "cannot generate: backend is not ready yet");
        assert!(rx.try_recv().is_err());
        assert!(app.generate().is_none());
    }

    #[test]
    fn test_presets_round_trip_through_commands() {
        let (mut app, _rx) = app();
        run(&mut app, "prompt deep house chords");
        run(&mut app, "bpm 124");
        assert!(run(&mut app, "preset save").starts_with("saved preset deep house chords"));

        run(&mut app, "mode song");
        assert_eq!(run(&mut app, "preset load 1"), "loaded preset deep house chords");
        assert_eq!(app.config().mode(), Mode::Loop);
        assert_eq!(app.config().loop_params().unwrap().bpm, 124);

        let id = app.presets().list()[0].id.clone();
        assert_eq!(run(&mut app, &format!("preset rm {}", id)), format!("removed preset {}", id));
        assert_eq!(run(&mut app, "preset list"), "no presets");
    }

    #[test]
    fn test_success_event_loads_player() {
        let (mut app, _rx) = app();
        let reply = app.handle_event(AppEvent::Generation(Submission::Succeeded(
            GenerationResult {
                audio_file: PathBuf::from("/tmp/loop.wav"),
                display_name: "loop.wav".into(),
            },
        )));
        assert_eq!(reply.as_deref(), Some("ready: loop.wav"));
        assert_eq!(app.player().artifact().unwrap().display_name, "loop.wav");
        assert!(!app.player().is_playable());
        assert_eq!(run(&mut app, "play"), "nothing to play");
    }

    #[test]
    fn test_failed_event_clears_previous_result() {
        let (mut app, _rx) = app();
        app.handle_event(AppEvent::Generation(Submission::Succeeded(GenerationResult {
            audio_file: PathBuf::from("/tmp/old.wav"),
            display_name: "old.wav".into(),
        })));

        let reply = app.handle_event(AppEvent::Generation(Submission::Failed("boom".into())));
        assert_eq!(reply.as_deref(), Some("error: boom"));
        assert!(app.player().artifact().is_none());
        assert!(run(&mut app, "status").contains("player:  empty"));
        assert_eq!(run(&mut app, "reveal"), "nothing to reveal");
    }

    #[test]
    fn test_delete_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let (mut app, _rx) = app();
        assert_eq!(run(&mut app, "delete"), "nothing to delete");
        app.handle_event(AppEvent::Generation(Submission::Succeeded(GenerationResult {
            audio_file: path.clone(),
            display_name: "take.wav".into(),
        })));
        assert_eq!(run(&mut app, "delete"), "deleted take.wav");
        assert!(!path.exists());
        assert!(app.player().artifact().is_none());
    }

    #[test]
    fn test_status_lines() {
        let (mut app, _rx) = app();
        let status = run(&mut app, "status");
        assert!(status.contains("backend: connecting"));
        assert!(status.contains("job:     idle"));
        assert!(status.contains("player:  empty"));
    }
}

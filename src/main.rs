use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::unbounded_channel,
    time::MissedTickBehavior,
};
use tracing::info;

use noises::{
    App, AppConfig, AudioOutput, BackendClient, BackendStatus, Command, DragPayload, ExportSink,
    GenerationPipeline, LivenessMonitor, PresetStore, ResultPlayer, SystemExport,
};

const TICK: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "noises", about = "Generate loops and songs with a local AI backend")]
struct Args {
    /// Config file (default: $NOISES_CONFIG_PATH or the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the generation service
    #[arg(long)]
    backend_url: Option<String>,

    /// SQLite file for presets
    #[arg(long, conflicts_with = "in_memory")]
    store: Option<PathBuf>,

    /// Keep presets in memory only
    #[arg(long)]
    in_memory: bool,

    /// Generation timeout in seconds, 0 to wait forever
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not start playback when a result arrives
    #[arg(long)]
    no_autoplay: bool,

    /// Stop at end-of-media instead of looping
    #[arg(long)]
    no_repeat: bool,
}

impl Args {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(url) = &self.backend_url {
            config.backend_url = url.clone();
        }
        if let Some(path) = &self.store {
            config.store_path = Some(path.clone());
        }
        if self.in_memory {
            config.store_path = None;
        }
        if let Some(secs) = self.timeout_secs {
            config.generate_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if self.no_autoplay {
            config.autoplay = false;
        }
        if self.no_repeat {
            config.repeat = false;
        }
        config
    }
}

/// Reveals through the file manager; "drags" by printing the file URI so it
/// can be pasted into a DAW or file browser.
struct CliExport;

impl ExportSink for CliExport {
    fn reveal(&self, path: &std::path::Path) -> noises::Result<()> {
        SystemExport.reveal(path)
    }

    fn start_drag(&self, payload: &DragPayload) -> noises::Result<()> {
        print!("{}", payload.uri_list());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing()?;
    let args = Args::parse();
    let config = args.apply(AppConfig::load_from(args.config.as_deref())?);

    #[cfg(feature = "playback")]
    {
        match noises::RodioOutput::new() {
            Ok(output) => return run(config, output).await,
            Err(err) => tracing::warn!(error = %err, "audio output unavailable, playback disabled"),
        }
    }
    run(config, noises::DisabledOutput).await
}

async fn run<O: AudioOutput>(config: AppConfig, output: O) -> Result<()> {
    info!(backend = %config.backend_url, "starting noises");

    let backend = Arc::new(BackendClient::new(config.backend_url.clone()));
    let monitor = Arc::new(LivenessMonitor::new(
        Arc::clone(&backend),
        config.health_interval,
    ));
    let mut ready = monitor.subscribe();
    let monitor_task = Arc::clone(&monitor).spawn();

    let pipeline = Arc::new(
        GenerationPipeline::new(backend, monitor.subscribe()).with_timeout(config.generate_timeout),
    );
    let presets = PresetStore::open(config.store_path.as_deref())
        .context("failed to open preset store")?
        .with_limit(config.preset_limit);

    let mut player = ResultPlayer::new(output, CliExport);
    player.set_volume(config.volume);
    player.set_repeat(config.repeat);

    let (events_tx, mut events_rx) = unbounded_channel();
    let mut app = App::new(pipeline, monitor.subscribe(), presets, player, events_tx)
        .with_autoplay(config.autoplay);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut announced = false;

    println!("noises: waiting for {} (type 'help')", config.backend_url);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => println!("{}", app.execute(command)),
                    Err(err) => println!("{}", err),
                }
            }
            Some(event) = events_rx.recv() => {
                if let Some(reply) = app.handle_event(event) {
                    println!("{}", reply);
                }
            }
            changed = ready.changed(), if !announced => {
                announced = true;
                if changed.is_ok() && *ready.borrow() == BackendStatus::Ready {
                    println!("backend ready");
                }
            }
            _ = ticker.tick() => app.tick(),
        }
    }

    app.pipeline().cancel();
    monitor_task.abort();
    info!("shutting down");
    Ok(())
}

fn setup_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("noises=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}

#![allow(dead_code)]

use noises::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Scripted backend that counts every call it receives.
pub struct MockBackend {
    health_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    /// Number of health probes that fail before the first success.
    failing_probes: usize,
    responses: Mutex<VecDeque<Result<GenerateResponse>>>,
    payloads: Mutex<Vec<GeneratePayload>>,
    delay: Duration,
}

impl MockBackend {
    /// Healthy from the first probe; every generation succeeds.
    pub fn ready() -> Self {
        Self::failing_for(0)
    }

    /// Health fails `probes` times before answering.
    pub fn failing_for(probes: usize) -> Self {
        Self {
            health_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            failing_probes: probes,
            responses: Mutex::new(VecDeque::new()),
            payloads: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every generation takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the answer for the next generation.
    pub fn respond(self, response: Result<GenerateResponse>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<GeneratePayload> {
        self.payloads.lock().unwrap().clone()
    }
}

impl Backend for MockBackend {
    async fn health(&self) -> Result<bool> {
        let attempt = self.health_calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_probes {
            return Err(NoisesError::Other("connection refused".into()));
        }
        Ok(true)
    }

    async fn generate(&self, payload: &GeneratePayload) -> Result<GenerateResponse> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(payload.clone());
        let scripted = self.responses.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        scripted.unwrap_or_else(|| {
            Ok(GenerateResponse::single(
                format!("{}_{}.wav", payload.kind, n),
                format!("/tmp/noises/{}_{}.wav", payload.kind, n),
            ))
        })
    }
}

/// Monitor + pipeline wired to a mock, with the backend already `Ready`.
pub async fn ready_pipeline(
    backend: MockBackend,
) -> (std::sync::Arc<MockBackend>, GenerationPipeline<MockBackend>) {
    let backend = std::sync::Arc::new(backend);
    let monitor = LivenessMonitor::new(std::sync::Arc::clone(&backend), Duration::from_secs(1));
    let status = monitor.subscribe();
    monitor.run().await;
    let pipeline = GenerationPipeline::new(std::sync::Arc::clone(&backend), status);
    (backend, pipeline)
}

pub fn loop_config(prompt: &str) -> GenerationConfig {
    let mut config = GenerationConfig::new(Mode::Loop);
    config.prompt = prompt.to_string();
    config
}

/// Audio output whose sources only record what happened to them.
#[derive(Clone, Default)]
pub struct RecordingOutput {
    pub opened: std::sync::Arc<Mutex<Vec<std::path::PathBuf>>>,
    pub released: std::sync::Arc<Mutex<Vec<std::path::PathBuf>>>,
}

pub struct RecordingSource {
    path: std::path::PathBuf,
    released: std::sync::Arc<Mutex<Vec<std::path::PathBuf>>>,
    playing: bool,
    position: Duration,
}

impl AudioOutput for RecordingOutput {
    type Source = RecordingSource;

    fn open(&mut self, path: &std::path::Path) -> Result<RecordingSource> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(RecordingSource {
            path: path.to_path_buf(),
            released: std::sync::Arc::clone(&self.released),
            playing: false,
            position: Duration::ZERO,
        })
    }
}

impl PlaybackSource for RecordingSource {
    fn play(&mut self) {
        self.playing = true;
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn seek(&mut self, position: Duration) -> Result<()> {
        self.position = position;
        Ok(())
    }
    fn rewind(&mut self) -> Result<()> {
        self.position = Duration::ZERO;
        Ok(())
    }
    fn position(&self) -> Duration {
        self.position
    }
    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs(4))
    }
    fn set_volume(&mut self, _volume: f32) {}
    fn is_finished(&self) -> bool {
        false
    }
    fn release(self) {
        self.released.lock().unwrap().push(self.path);
    }
}

/// Minimal HTTP server on a random local port. Answers one connection per
/// scripted `(status, body)` reply, in order, and returns the raw requests.
pub async fn stub_server(replies: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let response = format!(
                "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });
    (format!("http://{}", addr), server)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

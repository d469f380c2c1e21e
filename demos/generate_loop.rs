//! Generate one loop and print where it was written.
//!
//! Requires the generation service at http://127.0.0.1:8000.
//!
//! ```sh
//! cargo run --example generate_loop
//! ```

use noises::{
    BackendClient, GenerationConfig, GenerationPipeline, LivenessMonitor, Mode, Submission,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(BackendClient::new("http://127.0.0.1:8000"));
    let monitor = LivenessMonitor::new(Arc::clone(&backend), Duration::from_secs(1));
    let pipeline = GenerationPipeline::new(backend, monitor.subscribe())
        .with_timeout(Some(Duration::from_secs(600)));

    // Give the backend a minute to load its models
    match tokio::time::timeout(Duration::from_secs(60), monitor.run()).await {
        Ok(attempts) => println!("Backend ready after {} probe(s)", attempts),
        Err(_) => {
            eprintln!("Backend did not come up");
            return Ok(());
        }
    }

    let mut config = GenerationConfig::new(Mode::Loop);
    config.prompt = "808 kick loop, dark techno".into();
    config.set_bpm(140);
    config.key = Some("F minor".parse()?);

    match pipeline.submit(&config).await {
        Submission::Succeeded(result) => {
            println!("Generated {}", result.display_name);
            println!("Saved: {}", result.audio_file.display());
        }
        Submission::Failed(error) => eprintln!("Generation failed: {}", error),
        Submission::Refused(reason) => eprintln!("Not submitted: {}", reason),
        Submission::Cancelled => eprintln!("Cancelled"),
    }

    Ok(())
}

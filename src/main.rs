/// Keyword scan over a WAV file
///
/// Reads configuration from a JSON file (`PORCUPINE_CONFIG`) or the
/// environment (see `DetectorConfig::from_env`), runs every frame of
/// `PORCUPINE_INPUT_AUDIO` through the detector and logs each detection
/// with its offset into the file.

use anyhow::{bail, Context, Result};
use porcupine::{DetectorConfig, KeywordListener, Porcupine, Runtime};
use std::path::Path;
use tracing::info;

/// Samples fed to the listener per call
const CHUNK_SIZE: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("porcupine=debug".parse()?),
        )
        .init();

    let input_path = std::env::var("PORCUPINE_INPUT_AUDIO")
        .context("PORCUPINE_INPUT_AUDIO must name a mono 16-bit WAV file")?;

    let runtime = Runtime::global().context("Failed to prepare the engine runtime")?;
    let config = load_config().context("Failed to load configuration")?;
    let porcupine = Porcupine::with_config(runtime, config).context("Failed to initialize Porcupine")?;

    let labels: Vec<String> = porcupine.keyword_paths()?.iter().map(|p| keyword_label(p)).collect();
    let frame_length = porcupine.frame_length()?;
    let sample_rate = porcupine.sample_rate()?;

    let mut reader = hound::WavReader::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        bail!("{} has {} channels, expected mono", input_path, spec.channels);
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        bail!("{} is not 16-bit integer PCM", input_path);
    }
    if spec.sample_rate != sample_rate {
        bail!(
            "{} is sampled at {} Hz, Porcupine expects {} Hz",
            input_path,
            spec.sample_rate,
            sample_rate
        );
    }

    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read samples from {}", input_path))?;

    info!(
        "Scanning {} ({:.1} s) for: {}",
        input_path,
        samples.len() as f32 / sample_rate as f32,
        labels.join(", ")
    );

    let listener = KeywordListener::new(porcupine)?;
    listener.start().await?;
    for chunk in samples.chunks(CHUNK_SIZE) {
        listener.process_audio(chunk).await?;
    }

    let stats = listener.stats().await;
    listener.shutdown().await?;

    while let Some(event) = listener.recv_event().await {
        let offset_ms = event.frame_index * frame_length as u64 * 1000 / sample_rate as u64;
        let label = usize::try_from(event.keyword_index)
            .ok()
            .and_then(|index| labels.get(index))
            .map(String::as_str)
            .unwrap_or("unknown");

        info!(
            "[{}:{:02}.{:03}] detected {}",
            offset_ms / 60_000,
            offset_ms / 1000 % 60,
            offset_ms % 1000,
            label
        );
    }

    info!(
        "Processed {} frames, {} detection(s)",
        stats.frames_processed, stats.keywords_detected
    );
    Ok(())
}

/// Load configuration from the JSON file named by `PORCUPINE_CONFIG`, or
/// from the environment.
fn load_config() -> Result<DetectorConfig> {
    match std::env::var_os("PORCUPINE_CONFIG") {
        Some(path) => {
            let path = Path::new(&path);
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: DetectorConfig = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(DetectorConfig::from_env()?),
    }
}

/// `.../hey google_linux.ppn` -> `hey google`
fn keyword_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy())
        .and_then(|stem| stem.split('_').next().map(str::to_string))
        .unwrap_or_else(|| path.display().to_string())
}

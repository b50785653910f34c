use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use voice_composer::alignment::{AlignmentIndex, CharacterAlignment};
use voice_composer::config::Config;
use voice_composer::playback::{PlaybackSync, Utterance};
use voice_composer::text_assembler::{CaseMode, TextAssembler};
use voice_composer::text_diff::BufferEdit;

#[derive(Parser)]
#[command(name = "voice-composer")]
#[command(about = "Compose text word by word and follow spoken words as they play", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sentence word by word and show each buffer edit
    Compose {
        /// Lowercase words that do not start a sentence
        #[arg(long)]
        sentence_case: bool,
        /// Words to add. `=word` corrects the word in progress, an argument
        /// containing spaces is appended as a phrase
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Replay a character alignment and print each highlighted word
    Highlight {
        /// JSON file with characters and their start/end times
        alignment: PathBuf,
        /// Clock cadence in milliseconds (defaults to the configured value)
        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// Show the settings file location and effective settings
    Config,
    /// Record from the default microphone for a few seconds
    #[cfg(feature = "cpal-capture")]
    Record {
        #[arg(short, long, default_value = "3")]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voice_composer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compose {
            sentence_case,
            words,
        } => compose_command(sentence_case, &words),
        Commands::Highlight { alignment, tick_ms } => highlight_command(&alignment, tick_ms),
        Commands::Config => config_command(),
        #[cfg(feature = "cpal-capture")]
        Commands::Record { seconds } => record_command(seconds),
    }
}

fn compose_command(sentence_case: bool, words: &[String]) -> Result<()> {
    let mode = if sentence_case {
        CaseMode::SentenceCase
    } else {
        Config::load_or_create()?.composition.case_mode
    };

    println!("╔══════════════════════════════════════════════╗");
    println!("║          Voice Composer - Compose            ║");
    println!("╚══════════════════════════════════════════════╝");
    println!("Mode: {:?}", mode);
    println!();

    let mut assembler = TextAssembler::new(mode);
    let mut display = String::new();

    for input in words {
        let (label, edit) = if let Some(correction) = input.strip_prefix('=') {
            ("correct", assembler.set_current_word(correction))
        } else if input.contains(char::is_whitespace) {
            ("append", assembler.append_text(input))
        } else {
            ("add", assembler.add_word(input))
        };

        edit.apply(&mut display);
        println!("{:>8} {:<16} {}", label, format!("\"{}\"", input), describe(&edit));
    }

    debug_assert_eq!(display, assembler.text());

    println!();
    println!("📝 \"{}\"", assembler.text());
    println!("   {} words", assembler.word_count());
    Ok(())
}

fn describe(edit: &BufferEdit) -> String {
    if edit.is_noop() {
        return "(no change)".to_string();
    }
    let mut action = String::new();
    if edit.chars_to_delete > 0 {
        action.push_str(&format!("⌫ {} | ", edit.chars_to_delete));
    }
    action.push_str(&format!("→ TYPE: \"{}\"", edit.inserted));
    action
}

fn highlight_command(path: &Path, tick_ms: Option<u64>) -> Result<()> {
    let config = Config::load_or_create()?;
    let tick_ms = tick_ms.unwrap_or(config.playback.tick_interval_ms).max(1);

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read alignment file: {}", path.display()))?;
    let payload: CharacterAlignment = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse alignment file: {}", path.display()))?;

    let index = AlignmentIndex::from_payload(&payload, config.alignment.clamp_warn_threshold_secs);
    for anomaly in index.anomalies() {
        println!("⚠️  {:?}", anomaly);
    }

    let text: String = index.chars().iter().map(|c| c.character).collect();
    let total = index.total_duration();

    println!("🔊 \"{}\" ({:.2}s, ticking every {}ms)", text, total, tick_ms);
    println!("─────────────────────────────────────────────");

    let mut sync = PlaybackSync::new(std::time::Duration::from_millis(tick_ms));
    let (session, _) = sync.start_session(Utterance::new(text, Vec::<u8>::new(), index));
    debug!(session, "simulated session started");

    let step = tick_ms as f64 / 1000.0;
    let mut tick = 0u64;
    loop {
        let time = tick as f64 * step;
        if time > total {
            break;
        }
        if let Some(change) = sync.on_tick(session, time) {
            match change.segment {
                Some(segment) if segment.is_word() => println!(
                    "[{:6.0}ms] {:<12} {:.3}s..{:.3}s",
                    time * 1000.0,
                    segment.text.unwrap_or_default(),
                    segment.start_time,
                    segment.end_time
                ),
                Some(_) => println!("[{:6.0}ms] (gap)", time * 1000.0),
                None => println!("[{:6.0}ms] (none)", time * 1000.0),
            }
        }
        tick += 1;
    }

    sync.on_ended(session);
    println!("─────────────────────────────────────────────");
    println!("✓ Finished after {} ticks", tick);
    Ok(())
}

fn config_command() -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load_or_create()?;

    println!("📂 {}", path.display());
    println!();
    print!("{}", serde_yaml::to_string(&config).context("Failed to serialize settings")?);
    Ok(())
}

#[cfg(feature = "cpal-capture")]
fn record_command(seconds: u64) -> Result<()> {
    use std::time::Instant;

    use voice_composer::capture_cpal::CpalCaptureDevice;
    use voice_composer::services::AudioCaptureDevice;

    let mut device = CpalCaptureDevice::new()?;
    device.start().context("Failed to start recording")?;

    println!("🎤 Recording for {}s...", seconds);
    let started = Instant::now();
    std::thread::sleep(std::time::Duration::from_secs(seconds));

    let bytes = device.stop().context("Failed to stop recording")?;
    println!(
        "✓ Captured {} bytes ({:.2}s at {}Hz) in {:.2}s",
        bytes.len(),
        bytes.len() as f32 / 4.0 / device.sample_rate() as f32,
        device.sample_rate(),
        started.elapsed().as_secs_f32()
    );
    Ok(())
}

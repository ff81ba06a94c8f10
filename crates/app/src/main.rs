use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lyric_video_core::{
    evaluate, format_time, load_lines, parse_alignment_response, run_export, AppConfig,
    ExportOrchestrator, LoopbackPlatform, LyricLine, PlaybackClock, PlayerState, ScrollTracker,
    SimulatedClock, TimeSource, Track,
};
use tracing_subscriber::EnvFilter;

fn main() -> lyric_video_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Timing { lyrics, offset, at } => run_timing(&config, &lyrics, offset, &at),
        Commands::Scan {
            lyrics,
            offset,
            step,
            until,
        } => run_scan(&config, &lyrics, offset, step, until),
        Commands::Align { response, duration } => run_align(&config, &response, duration),
        Commands::Export {
            lyrics,
            title,
            artist,
            duration,
            out,
            deny,
            block_autoplay,
        } => run_export_command(
            &config,
            ExportArgs {
                lyrics,
                title,
                artist,
                duration,
                out,
                deny,
                block_autoplay,
            },
        ),
    }
}

fn load_track(
    lyrics: &Path,
    title: &str,
    artist: &str,
    duration: f64,
) -> lyric_video_core::Result<Track> {
    let lines = load_lines(lyrics)?;
    Track::new(title, artist, lyrics.display().to_string(), duration, lines)
}

fn track_length(lines: &[LyricLine]) -> f64 {
    lines.last().map_or(1.0, |line| line.time + 5.0)
}

fn run_timing(
    config: &AppConfig,
    lyrics: &Path,
    offset: f64,
    at: &[f64],
) -> lyric_video_core::Result<()> {
    let lines = load_lines(lyrics)?;
    tracing::info!(lines = lines.len(), offset, "timing table");

    let times: Vec<f64> = if at.is_empty() { vec![0.0] } else { at.to_vec() };
    for time in times {
        let frame = evaluate(&lines, time, offset, &config.render);
        println!(
            "t={} (effective {:.2}s){}",
            format_time(time),
            frame.effective_time,
            if frame.is_instrumental() { " [instrumental]" } else { "" }
        );
        for (render, line) in frame.lines.iter().zip(&lines) {
            println!(
                "{} {:>7.2}  blur={:<4.1} scale={:<4.2} opacity={:<4.2}  {}",
                if render.active { '>' } else { ' ' },
                line.time,
                render.params.blur,
                render.params.scale,
                render.params.opacity,
                line.text
            );
        }
        println!();
    }
    Ok(())
}

fn run_scan(
    config: &AppConfig,
    lyrics: &Path,
    offset: f64,
    step: f64,
    until: Option<f64>,
) -> lyric_video_core::Result<()> {
    if !(step.is_finite() && step > 0.0) {
        return Err(lyric_video_core::LyricVideoError::InvalidInput(
            "scan step must be positive",
        ));
    }
    let lines = load_lines(lyrics)?;
    let length = until.unwrap_or_else(|| track_length(&lines));
    let track = Track::new("scan", "scan", lyrics.display().to_string(), length, lines)?;

    let mut state = PlayerState::new();
    let id = state.add_track(track);
    let mut clock = SimulatedClock::new(length);
    state.select_track(id, &mut clock)?;
    state.set_offset(offset)?;

    let mut scroll = ScrollTracker::new();
    while clock.is_playing() {
        for event in clock.advance(step) {
            state.on_clock_event(TimeSource::Player, event);
        }
        let Some(view) = state.render_view(&config.render) else {
            break;
        };
        if let Some(index) = scroll.update(view.frame.active) {
            let text = state
                .now_playing()
                .and_then(|track| track.lyrics.get(index))
                .map_or("", |line| line.text.as_str());
            println!("{}  #{index:<3} {text}", format_time(state.current_time()));
        }
    }
    Ok(())
}

fn run_align(
    config: &AppConfig,
    response: &Path,
    duration: f64,
) -> lyric_video_core::Result<()> {
    let body = std::fs::read_to_string(response)?;
    let lines =
        parse_alignment_response(&body, duration, config.alignment.overflow_tolerance)?;
    tracing::info!(lines = lines.len(), "alignment response accepted");
    println!("{}", serde_json::to_string_pretty(&lines)?);
    Ok(())
}

struct ExportArgs {
    lyrics: PathBuf,
    title: String,
    artist: String,
    duration: f64,
    out: PathBuf,
    deny: bool,
    block_autoplay: bool,
}

fn run_export_command(config: &AppConfig, args: ExportArgs) -> lyric_video_core::Result<()> {
    let track = load_track(&args.lyrics, &args.title, &args.artist, args.duration)?;

    let mut state = PlayerState::new();
    let id = state.add_track(track);
    let mut clock = SimulatedClock::new(args.duration);
    state.select_track(id, &mut clock)?;
    let track = state.prepare_export(&mut clock)?;

    let mut platform = LoopbackPlatform::new(args.duration);
    if args.deny {
        platform = platform.deny_capture("Permission denied");
    }
    if args.block_autoplay {
        platform = platform.block_autoplay();
    }

    let mut orchestrator = ExportOrchestrator::new(config.export.clone());
    let step = 1.0 / f64::from(config.export.frame_rate);
    let artifact = run_export(&mut orchestrator, &mut platform, &track, &mut state, step)?;

    for notice in state.take_notices() {
        tracing::warn!("{notice}");
    }

    std::fs::create_dir_all(&args.out)?;
    let path = args.out.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)?;
    tracing::info!(
        path = %path.display(),
        mime = %artifact.mime_type,
        bytes = artifact.bytes.len(),
        has_audio = artifact.has_audio,
        "export written"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Lyric-synced player and lyric video exporter", long_about = None)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the render parameters of every line at the given times.
    Timing {
        /// JSON array of `{ "time", "text" }` lines.
        lyrics: PathBuf,
        /// Global sync offset in seconds.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
        /// Playback times to evaluate, in seconds.
        #[arg(long)]
        at: Vec<f64>,
    },
    /// Play the lyrics against a simulated clock and print each line change.
    Scan {
        lyrics: PathBuf,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
        /// Clock tick in seconds.
        #[arg(long, default_value_t = 0.25)]
        step: f64,
        /// Stop after this many seconds instead of shortly after the last line.
        #[arg(long)]
        until: Option<f64>,
    },
    /// Validate a saved alignment service response.
    Align {
        response: PathBuf,
        /// Track duration in seconds.
        #[arg(long)]
        duration: f64,
    },
    /// Record a lyric video through the loopback capture platform.
    Export {
        lyrics: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        duration: f64,
        /// Directory the recording is written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Simulate the user refusing screen capture.
        #[arg(long)]
        deny: bool,
        /// Simulate the browser blocking audio playback.
        #[arg(long)]
        block_autoplay: bool,
    },
}

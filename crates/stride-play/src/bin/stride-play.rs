use std::fs;
use std::path::PathBuf;

use clap::Parser;

use stride_core::{StrideError, StrideResult};
use stride_play::{parse_loop_mode, run_playback, PlaybackConfig, SourceKind, SyntheticOptions};

#[derive(Parser)]
#[command(name = "stride-play", version, about = "Synthetic trajectory playback demo")]
struct Cli {
    /// JSON playback config; overrides every other flag.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 25)]
    frames: usize,
    #[arg(long, default_value_t = 30)]
    atoms: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Source adapter: function or request.
    #[arg(long, default_value = "function")]
    source: String,
    /// Loop mode: once, loop or bounce.
    #[arg(long, default_value = "loop")]
    mode: String,
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,
    #[arg(long, default_value_t = 100)]
    ticks: usize,
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run_cli() {
        return Err(err.to_string());
    }
    Ok(())
}

fn run_cli() -> StrideResult<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = PlaybackConfig::default();
            config.synthetic = SyntheticOptions {
                frames: cli.frames,
                atoms: cli.atoms,
                seed: cli.seed,
                ..SyntheticOptions::default()
            };
            config.source = SourceKind::parse(&cli.source)?;
            config.player.mode = parse_loop_mode(&cli.mode)?;
            config.player.interval_ms = cli.interval_ms;
            config.ticks = cli.ticks;
            config
        }
    };
    let summary = run_playback(&config)?;
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| StrideError::Invalid(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn load_config(path: &PathBuf) -> StrideResult<PlaybackConfig> {
    let content = fs::read_to_string(path)
        .map_err(|err| StrideError::Invalid(format!("read {}: {err}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|err| StrideError::Invalid(format!("parse {}: {err}", path.display())))
}

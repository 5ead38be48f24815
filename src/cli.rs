use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chordia", about = "Chord, key, tempo and meter extraction for audio")]
pub struct Cli {
    /// Config file (defaults to ./chordia.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one or more audio files
    Analyze(AnalyzeArgs),

    /// Live analysis: newline-delimited JSON messages on stdin, events on stdout
    Stream {
        /// Session id used in logs
        #[arg(long, default_value = "stdin")]
        session: String,
    },

    /// Print the cache fingerprint of a file
    Fingerprint {
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Input audio files (WAV, MP3, FLAC, OGG, AAC)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Analysis engine
    #[arg(short, long, value_enum, default_value_t = EngineChoice::Auto)]
    pub engine: EngineChoice,

    /// Strip vocals before analysis
    #[arg(long)]
    pub separate_vocals: bool,

    /// Add a one-chord-per-bar view
    #[arg(long)]
    pub bars: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum seconds of audio to analyze
    #[arg(long)]
    pub max_duration: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EngineChoice {
    /// Signal-processing path only
    Precise,
    /// Cached detectors, falling back to precise
    Fast,
    /// Fast when enabled in config, otherwise precise
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

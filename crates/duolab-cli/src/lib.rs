use std::path::PathBuf;

use clap::Parser;

use duolab_transformers::PrecisionPolicy;

pub mod commands;

pub const DEFAULT_PROMPT: &str = "Hi I am a boy and I am a professor and I do";

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "gpt2-generate")]
#[command(about = "Generate text with GPT-2 on the CPU", long_about = None)]
#[command(version)]
pub struct GenerateArgs {
    /// Text to continue
    #[arg(short, long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Cap on prompt plus generated tokens
    #[arg(short = 'n', long, default_value_t = 50)]
    pub max_length: usize,

    /// Checkpoint to load (gpt2, distilgpt2)
    #[arg(short, long, default_value = "gpt2")]
    pub model: String,

    /// Numeric policy: float32, mixed_float16 or mixed_bfloat16
    #[arg(long, default_value_t = PrecisionPolicy::MixedFloat16)]
    pub precision: PrecisionPolicy,

    /// Use greedy decoding (ignores --top-k and --temperature)
    #[arg(long)]
    pub greedy: bool,

    /// Sample among the K most likely tokens
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    /// Sampling temperature
    #[arg(short, long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Model cache directory (defaults to $DUOLAB_CACHE_DIR or the user cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "model-comparison")]
#[command(about = "Plot a discriminative and a generative model side by side", long_about = None)]
#[command(version)]
pub struct CompareArgs {
    /// PNG file to write
    #[arg(short, long, default_value = "model_comparison.png")]
    pub output: PathBuf,

    /// Number of synthetic points (and of generated points)
    #[arg(short = 'n', long, default_value_t = 200)]
    pub samples: usize,

    /// Seed of the synthetic data
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Seed of the Gaussian mixture (unseeded when omitted)
    #[arg(long)]
    pub gmm_seed: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log filter for a `-v` count.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Starts `env_logger` at the `-v` level unless `RUST_LOG` is set.
pub fn init_logging(verbose: u8) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(verbose))).init();
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use vidtrack::humanize::HumanDuration;
use vidtrack::service::FileKind;
use vidtrack::service::models::DEFAULT_MIN_CONFIDENCE;

#[derive(Parser, Debug)]
#[command(name = "vidtrack")]
#[command(about = "Submit video tagging jobs and follow them to completion", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $VIDTRACK_CONFIG or config/vidtrack.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override service.base_url
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a video (or a directory of videos) for processing
    Submit(SubmitArgs),
    /// Print the current status of a task
    Status(TaskArgs),
    /// Follow a task until it finishes
    Watch(WatchArgs),
    /// Cancel a running task
    Cancel(TaskArgs),
    /// List every task the service knows about
    Tasks,
    /// Check a path on the service host
    Validate(ValidateArgs),
    /// Show metadata of a video on the service host
    Info(InfoArgs),
    /// Run the tagger on images on the service host
    Tag(TagArgs),
    /// Show the tagger model loaded by the service
    Model,
    /// Service and model health
    Health,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    /// Video file or directory, as seen by the service
    pub video_path: String,

    /// Where the dataset is written
    #[arg(short, long)]
    pub output: String,

    /// Reference image for character matching; repeatable
    #[arg(short, long = "reference")]
    pub references: Vec<String>,

    /// Base name for the output files
    #[arg(long)]
    pub output_name: Option<String>,

    /// Follow the primary task after submitting
    #[arg(short, long)]
    pub watch: bool,

    /// Submit without checking paths on the service first
    #[arg(long)]
    pub skip_validation: bool,

    #[command(flatten)]
    pub processing: ProcessingOverrides,
}

/// Per-job overrides of `[processing]`
#[derive(clap::Args, Debug, Default)]
pub struct ProcessingOverrides {
    #[arg(long)]
    pub max_frames: Option<u32>,
    #[arg(long)]
    pub scene_change_threshold: Option<f64>,
    #[arg(long)]
    pub quality_threshold: Option<f64>,
    #[arg(long)]
    pub tag_threshold: Option<f64>,
    #[arg(long)]
    pub character_tag_threshold: Option<f64>,
    #[arg(long)]
    pub general_tag_threshold: Option<f64>,
    #[arg(long)]
    pub batch_size: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct TaskArgs {
    pub task_id: String,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    pub task_id: String,

    /// Ask the service to cancel the task on Ctrl-C instead of just detaching
    #[arg(long)]
    pub cancel_on_interrupt: bool,

    /// Override polling.interval ("2s", "500ms", ...)
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<HumanDuration>,
}

fn parse_interval(value: &str) -> Result<HumanDuration, String> {
    let interval = value.parse::<HumanDuration>().map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

impl WatchArgs {
    pub fn interval(&self) -> Option<Duration> {
        self.interval.map(|i| i.as_duration())
    }
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    pub path: String,

    #[arg(short, long, default_value = "video")]
    pub kind: FileKind,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    pub video_path: String,
}

#[derive(clap::Args, Debug)]
pub struct TagArgs {
    /// Image paths, as seen by the service
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Override processing.general_tag_threshold
    #[arg(long)]
    pub general_threshold: Option<f64>,

    /// Override processing.character_tag_threshold
    #[arg(long)]
    pub character_threshold: Option<f64>,

    /// Treat the images as references and print the tag match request they imply
    #[arg(long)]
    pub match_request: bool,

    /// Minimum average confidence for a tag to become required
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    pub min_confidence: f64,
}

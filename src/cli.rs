use argh::FromArgs;

/// Crowd occupancy monitor
#[derive(FromArgs, Debug)]
pub struct Args {
    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Command {
    Run(RunArgs),
    Status(StatusArgs),
}

/// Run detection and tracking over a video and raise zone alerts
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "run")]
pub struct RunArgs {
    /// JSON config file with zones, thresholds and notifiers
    #[argh(option)]
    pub config: Option<String>,

    /// source: video file, stream or image folder
    #[argh(option, default = "String::from(\"./video/crowd.mp4\")")]
    pub source: String,

    /// model file, downloaded by usls when omitted
    #[argh(option)]
    pub model: Option<String>,

    /// task
    #[argh(option, default = "String::from(\"det\")")]
    pub task: String,

    /// model dtype
    #[argh(option, default = "String::from(\"auto\")")]
    pub dtype: String,

    /// version
    #[argh(option, default = "8.0")]
    pub ver: f32,

    /// device: cuda, cpu, mps
    #[argh(option, default = "String::from(\"cpu:0\")")]
    pub device: String,

    /// scale: n, s, m, l
    #[argh(option, default = "String::from(\"n\")")]
    pub scale: String,

    /// override the configured alert threshold
    #[argh(option)]
    pub alert_threshold: Option<usize>,

    /// stop after this many frames, 0 processes the whole source
    #[argh(option, default = "0")]
    pub max_frames: u64,

    /// disable the progress spinner
    #[argh(switch)]
    pub no_progress: bool,
}

/// Show the latest logged count and status of every zone
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "status")]
pub struct StatusArgs {
    /// JSON config file, used for the dashboard thresholds and log path
    #[argh(option)]
    pub config: Option<String>,

    /// occupancy event log to read instead of the configured one
    #[argh(option)]
    pub log: Option<String>,
}

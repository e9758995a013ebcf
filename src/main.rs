use anyhow::{Context, Result};
use chrono::Local;
use crowdwatch::audio::AudioNotifier;
use crowdwatch::cli::{self, Command, RunArgs, StatusArgs};
use crowdwatch::config::{self, MonitorConfig};
use crowdwatch::email::{EmailNotifier, SMTP_PASSWORD_ENV, SmtpCredentials};
use crowdwatch::event_log::{self, EventLog};
use crowdwatch::notify::{LogNotifier, NotificationDispatcher, Notifier};
use crowdwatch::occupancy::OccupancyAggregator;
use crowdwatch::pipeline::{Monitor, OccupancyPipeline};
use crowdwatch::progress::FrameProgress;
use crowdwatch::tracker::IouTracker;
use crowdwatch::yolo::{self, YoloDetector};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

/// Time left for queued notifications after the last frame, on top of the alert sound
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: cli::Args = argh::from_env();
    match args.command {
        Command::Run(run_args) => run(&run_args).await,
        Command::Status(status_args) => status(&status_args),
    }
}

fn load_config(path: Option<&str>) -> Result<MonitorConfig> {
    let config = MonitorConfig::load(path.map(Path::new))?;
    config.validate().context("Invalid monitor configuration")?;
    Ok(config)
}

/// Builds every notifier the configuration enables. Optional channels that
/// cannot work are skipped with a warning; the log channel is always on.
fn build_notifiers(config: &MonitorConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];

    if let Some(audio) = &config.audio {
        if !audio.file.exists() {
            tracing::warn!(file = %audio.file.display(), "alert sound not found, audio alerts will fail");
        }
        notifiers.push(Arc::new(
            AudioNotifier::new(audio.file.clone(), audio.duration()).with_volume(audio.volume),
        ));
    }

    if let Some(email) = &config.email {
        match SmtpCredentials::from_env(&email.sender) {
            Some(credentials) => match EmailNotifier::new(email, credentials) {
                Ok(notifier) => notifiers.push(Arc::new(notifier)),
                Err(e) => tracing::warn!(error = %e, "email alerts disabled"),
            },
            None => tracing::warn!("{} is not set, email alerts disabled", SMTP_PASSWORD_ENV),
        }
    }

    tracing::info!(
        notifiers = ?notifiers.iter().map(|n| n.name()).collect::<Vec<_>>(),
        "alert channels ready"
    );
    notifiers
}

async fn run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(threshold) = args.alert_threshold {
        config.alert.threshold = threshold;
        config.validate().context("Invalid alert threshold override")?;
    }

    let zones = config.build_zones()?;
    tracing::info!(
        zones = ?zones.iter().map(|z| z.name()).collect::<Vec<_>>(),
        alert_threshold = config.alert.threshold,
        "monitoring"
    );

    let event_log = EventLog::open(&config.event_log)
        .with_context(|| format!("Failed to open event log {}", config.event_log.display()))?;

    let model_config = config::build_model_config(args, &config.detector)?;
    let detector = YoloDetector::new(model_config, &config.detector.class_name, config.detector.confidence)?;
    let data_loader = yolo::open_source(&args.source)?;

    let dispatcher = NotificationDispatcher::spawn(build_notifiers(&config), config.dispatch_queue, &Handle::current());
    let pipeline = OccupancyPipeline::new(
        OccupancyAggregator::new(zones),
        config.display,
        config.alert.threshold,
        dispatcher,
    )
    .with_event_log(event_log);
    let mut monitor = Monitor::new(detector, IouTracker::new(config.tracker.into()), pipeline);

    let mut progress = if args.no_progress {
        FrameProgress::hidden()
    } else {
        FrameProgress::new(&args.source)
    };

    // the frame loop is synchronous; hand this worker over so the dispatcher keeps running
    tokio::task::block_in_place(|| {
        'frames: for xs in &data_loader {
            for frame in xs.iter() {
                if args.max_frames > 0 && progress.processed_frames() >= args.max_frames {
                    break 'frames;
                }
                let report = monitor.process_at(frame, Local::now());
                progress.update(&report);
            }
        }
    });
    progress.finish();

    let frames = monitor.pipeline().frames_processed();
    let dispatcher = monitor.into_pipeline().into_sink();
    let dropped = dispatcher.dropped();
    let grace = config.audio.as_ref().map_or(Duration::ZERO, |a| a.duration()) + SHUTDOWN_GRACE;
    dispatcher.shutdown(grace).await;

    tracing::info!(
        frames,
        alerts = progress.alerts(),
        dropped,
        log = %config.event_log.display(),
        "monitoring finished"
    );
    Ok(())
}

fn status(args: &StatusArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let log_path = args.log.as_deref().map_or(config.event_log.as_path(), Path::new);

    let latest = event_log::read_latest_per_zone(log_path)
        .with_context(|| format!("Failed to read event log {}", log_path.display()))?;
    if latest.is_empty() {
        println!("No data yet. Run video detection first!");
        return Ok(());
    }

    println!("Zone Occupancy ({})", log_path.display());
    for (zone_name, event) in &latest {
        let status = config.dashboard.classify(event.people_count);
        println!(
            "{:<16} {:>5} people  {:<12} {}  (updated {})",
            zone_name,
            event.people_count,
            status.label(),
            status.color(),
            event.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

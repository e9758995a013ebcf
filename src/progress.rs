use crate::pipeline::FrameReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Spinner for a frame loop whose length is not known up front
pub struct FrameProgress {
    progress_bar: ProgressBar,
    start_time: Instant,
    processed_frames: u64,
    alerts: u64,
}

impl FrameProgress {
    pub fn new(source: &str) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} frames | {msg}")
        {
            progress_bar.set_style(style);
        }
        progress_bar.set_message(format!("Monitoring {}", source));

        Self {
            progress_bar,
            start_time: Instant::now(),
            processed_frames: 0,
            alerts: 0,
        }
    }

    /// A tracker that draws nothing, for `--no-progress` and tests
    pub fn hidden() -> Self {
        Self {
            progress_bar: ProgressBar::hidden(),
            start_time: Instant::now(),
            processed_frames: 0,
            alerts: 0,
        }
    }

    pub fn update(&mut self, report: &FrameReport) {
        self.processed_frames += 1;
        self.alerts += report.dispatches() as u64;
        self.progress_bar.inc(1);
        self.progress_bar.set_message(self.message(report));
    }

    fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.processed_frames as f64 / elapsed
        } else {
            0.0
        }
    }

    fn message(&self, report: &FrameReport) -> String {
        format!("{} | Alerts: {} | Speed: {:.1} fps", report.summary(), self.alerts, self.fps())
    }

    pub fn finish(&self) {
        let processing_time = format_duration(self.start_time.elapsed().as_secs_f64());
        self.progress_bar.finish_with_message(format!(
            "Completed! Frames: {} | Alerts: {} | Processing: {} | Avg FPS: {:.1}",
            self.processed_frames,
            self.alerts,
            processing_time,
            self.fps()
        ));
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }

    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

/// Formats a duration in seconds to h:mm:ss format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

use crate::alert::{AlertBook, AlertState};
use crate::density::{DensityStatus, DensityThresholds};
use crate::detection::Detector;
use crate::event_log::{EventLog, OccupancyEvent};
use crate::notify::AlertSink;
use crate::occupancy::{OccupancyAggregator, ZoneCounts};
use crate::tracker::{Track, Tracker, TrackerAdapter};
use chrono::{DateTime, Local};

/// What happened in one zone on one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneReport {
    pub zone_name: String,
    pub count: usize,
    pub status: DensityStatus,
    pub alert_state: AlertState,
    /// A dispatch was issued for this zone on this frame
    pub dispatched: bool,
}

/// Outcome of one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: DateTime<Local>,
    pub confirmed_tracks: usize,
    pub zones: Vec<ZoneReport>,
    /// Set when the event log could not be written for this frame
    pub log_error: Option<String>,
}

impl FrameReport {
    pub fn zone(&self, zone_name: &str) -> Option<&ZoneReport> {
        self.zones.iter().find(|z| z.zone_name == zone_name)
    }

    pub fn dispatches(&self) -> usize {
        self.zones.iter().filter(|z| z.dispatched).count()
    }

    /// One-line status such as `Zone A: 3 (Safe) | Zone B: 12 (Overcrowded)`
    pub fn summary(&self) -> String {
        self.zones
            .iter()
            .map(|z| format!("{}: {} ({})", z.zone_name, z.count, z.status))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Frame-synchronous tracking-to-alert core: aggregation, classification,
/// alert evaluation, dispatch hand-off and logging, in that order.
pub struct OccupancyPipeline<S> {
    aggregator: OccupancyAggregator,
    display: DensityThresholds,
    alerts: AlertBook,
    sink: S,
    event_log: Option<EventLog>,
    frames: u64,
}

impl<S: AlertSink> OccupancyPipeline<S> {
    pub fn new(aggregator: OccupancyAggregator, display: DensityThresholds, alert_threshold: usize, sink: S) -> Self {
        Self {
            aggregator,
            display,
            alerts: AlertBook::new(alert_threshold),
            sink,
            event_log: None,
            frames: 0,
        }
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn alerts(&self) -> &AlertBook {
        &self.alerts
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Runs the per-frame core on the confirmed tracks of one frame
    pub fn process_frame(&mut self, tracks: &[Track], timestamp: DateTime<Local>) -> FrameReport {
        let frame_index = self.frames;
        self.frames += 1;

        let counts = self.aggregator.count(tracks);
        let requests = self.alerts.evaluate_frame(&counts, timestamp);

        let zones: Vec<ZoneReport> = counts
            .iter()
            .map(|(zone_name, count)| ZoneReport {
                zone_name: zone_name.to_string(),
                count,
                status: self.display.classify(count),
                alert_state: self.alerts.state(zone_name),
                dispatched: requests.iter().any(|r| r.zone_name == zone_name),
            })
            .collect();

        for request in requests {
            tracing::info!(zone = %request.zone_name, count = request.count, frame = frame_index, "alert threshold breached");
            self.sink.submit(request);
        }

        let log_error = self.log_counts(&counts, timestamp);

        tracing::debug!(
            frame = frame_index,
            confirmed = tracks.iter().filter(|t| t.confirmed).count(),
            zones = ?zones.iter().map(|z| (z.zone_name.as_str(), z.count)).collect::<Vec<_>>(),
            "frame processed"
        );

        FrameReport {
            frame_index,
            timestamp,
            confirmed_tracks: tracks.iter().filter(|t| t.confirmed).count(),
            zones,
            log_error,
        }
    }

    /// Logging never stops the frame loop; failures go to the operator log
    fn log_counts(&mut self, counts: &ZoneCounts, timestamp: DateTime<Local>) -> Option<String> {
        let event_log = self.event_log.as_mut()?;
        let naive = timestamp.naive_local();
        let events: Vec<OccupancyEvent> = counts
            .iter()
            .map(|(zone_name, count)| OccupancyEvent::new(naive, zone_name, count))
            .collect();
        match event_log.append_frame(&events) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, "failed to append occupancy events");
                Some(e.to_string())
            }
        }
    }
}

/// Detector, tracker adapter and pipeline composed into one per-frame step
pub struct Monitor<D, T, S> {
    detector: D,
    tracker: TrackerAdapter<T>,
    pipeline: OccupancyPipeline<S>,
}

impl<D, T, S: AlertSink> Monitor<D, T, S> {
    pub fn new(detector: D, tracker: T, pipeline: OccupancyPipeline<S>) -> Self {
        Self {
            detector,
            tracker: TrackerAdapter::new(tracker),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &OccupancyPipeline<S> {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> OccupancyPipeline<S> {
        self.pipeline
    }

    /// Processes one frame stamped with the current local time
    pub fn process<F: ?Sized>(&mut self, frame: &F) -> FrameReport
    where
        D: Detector<F>,
        T: Tracker<F>,
    {
        self.process_at(frame, Local::now())
    }

    /// A failing detector counts as a frame with no detections
    pub fn process_at<F: ?Sized>(&mut self, frame: &F, timestamp: DateTime<Local>) -> FrameReport
    where
        D: Detector<F>,
        T: Tracker<F>,
    {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(frame = self.pipeline.frames_processed(), error = %e, "detection failed, treating frame as empty");
                Vec::new()
            }
        };
        let tracks = self.tracker.confirmed_tracks(&detections, frame);
        self.pipeline.process_frame(&tracks, timestamp)
    }
}

use crate::detection::{BoundingBox, Detection};
use anyhow::Result;
use std::ops::RangeFrom;

/// A persistent identity assigned to one physical object across frames
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u64,
    /// Only confirmed tracks are eligible for counting
    pub confirmed: bool,
    pub bounding_box: BoundingBox,
}

impl Track {
    pub fn new(track_id: u64, confirmed: bool, bounding_box: BoundingBox) -> Self {
        Self {
            track_id,
            confirmed,
            bounding_box,
        }
    }
}

/// Multi-object tracking capability. Returns every live track, confirmed or
/// not, after folding this frame's detections into the tracker state.
pub trait Tracker<F: ?Sized> {
    fn update_tracks(&mut self, detections: &[Detection], frame: &F) -> Result<Vec<Track>>;
}

/// Translation boundary between a tracker capability and the counting core.
/// A single bad frame never escapes as an error: it degrades to zero tracks.
pub struct TrackerAdapter<T> {
    tracker: T,
}

impl<T> TrackerAdapter<T> {
    pub fn new(tracker: T) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Feeds the frame to the tracker and returns the confirmed tracks only
    pub fn confirmed_tracks<F: ?Sized>(&mut self, detections: &[Detection], frame: &F) -> Vec<Track>
    where
        T: Tracker<F>,
    {
        // Malformed geometry poisons the whole frame, the tracker still runs
        // so that track ages advance.
        let detections: &[Detection] = if detections
            .iter()
            .all(|d| d.bounding_box.is_well_formed() && d.confidence.is_finite())
        {
            detections
        } else {
            tracing::warn!(
                detections = detections.len(),
                "malformed detection geometry, treating frame as empty"
            );
            &[]
        };

        let tracks = match self.tracker.update_tracks(detections, frame) {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(error = %e, "tracker update failed, treating frame as empty");
                return Vec::new();
            }
        };

        if let Some(bad) = tracks.iter().find(|t| !t.bounding_box.is_well_formed()) {
            tracing::warn!(
                track_id = bad.track_id,
                bbox = ?bad.bounding_box,
                "tracker returned malformed geometry, treating frame as empty"
            );
            return Vec::new();
        }

        tracks.into_iter().filter(|t| t.confirmed).collect()
    }
}

/// Tracker tuning, mirrors the usual DeepSORT knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IouTrackerConfig {
    /// Consecutive missed frames after which a confirmed track is deleted
    pub max_age: u32,
    /// Consecutive matched frames needed to confirm a new track
    pub n_init: u32,
    /// Minimum IoU for a detection to be associated with a track
    pub min_iou: f64,
}

impl Default for IouTrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 30,
            n_init: 3,
            min_iou: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Tentative,
    Confirmed,
}

#[derive(Debug, Clone)]
struct TrackEntry {
    track_id: u64,
    state: TrackState,
    bounding_box: BoundingBox,
    hits: u32,
    time_since_update: u32,
}

/// Greedy IoU tracker with DeepSORT track lifecycle: new tracks are tentative,
/// confirmed after `n_init` consecutive hits, a tentative track dies on its
/// first miss and a confirmed one after more than `max_age` misses.
pub struct IouTracker {
    config: IouTrackerConfig,
    tracks: Vec<TrackEntry>,
    next_id: RangeFrom<u64>,
}

impl IouTracker {
    pub fn new(config: IouTrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1..,
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Pairs tracks with detections by descending IoU, each used at most once
    fn associate(&self, detections: &[Detection]) -> Vec<(usize, usize)> {
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, detection) in detections.iter().enumerate() {
                let iou = track.bounding_box.iou(&detection.bounding_box);
                if iou >= self.config.min_iou {
                    candidates.push((iou, ti, di));
                }
            }
        }
        // ties broken by index so association stays deterministic
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut track_used = vec![false; self.tracks.len()];
        let mut detection_used = vec![false; detections.len()];
        let mut pairs = Vec::new();
        for (_, ti, di) in candidates {
            if track_used[ti] || detection_used[di] {
                continue;
            }
            track_used[ti] = true;
            detection_used[di] = true;
            pairs.push((ti, di));
        }
        pairs
    }
}

impl<F: ?Sized> Tracker<F> for IouTracker {
    fn update_tracks(&mut self, detections: &[Detection], _frame: &F) -> Result<Vec<Track>> {
        let pairs = self.associate(detections);

        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_detections = vec![false; detections.len()];
        for &(ti, di) in &pairs {
            matched_tracks[ti] = true;
            matched_detections[di] = true;

            let track = &mut self.tracks[ti];
            track.bounding_box = detections[di].bounding_box;
            track.hits += 1;
            track.time_since_update = 0;
            if track.state == TrackState::Tentative && track.hits >= self.config.n_init {
                track.state = TrackState::Confirmed;
            }
        }

        for (track, matched) in self.tracks.iter_mut().zip(&matched_tracks) {
            if !matched {
                track.time_since_update += 1;
            }
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| match t.state {
            TrackState::Tentative => t.time_since_update == 0,
            TrackState::Confirmed => t.time_since_update <= max_age,
        });

        for (detection, matched) in detections.iter().zip(&matched_detections) {
            if *matched {
                continue;
            }
            let track_id = self.next_id.next().unwrap_or(u64::MAX);
            let state = if self.config.n_init <= 1 {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            };
            self.tracks.push(TrackEntry {
                track_id,
                state,
                bounding_box: detection.bounding_box,
                hits: 1,
                time_since_update: 0,
            });
        }

        Ok(self
            .tracks
            .iter()
            .map(|t| Track::new(t.track_id, t.state == TrackState::Confirmed, t.bounding_box))
            .collect())
    }
}

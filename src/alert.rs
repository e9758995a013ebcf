use crate::occupancy::ZoneCounts;
use chrono::{DateTime, Local};
use std::collections::HashMap;

/// Alert state of one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertState {
    /// Not alerting, a breach will dispatch
    #[default]
    Idle,
    /// Breach acknowledged and already dispatched for the current episode
    Alerting,
}

impl AlertState {
    pub fn is_triggered(&self) -> bool {
        matches!(self, AlertState::Alerting)
    }
}

/// Request handed to the notification side for one breach episode
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub zone_name: String,
    pub count: usize,
    pub raised_at: DateTime<Local>,
}

/// Edge-triggered hysteresis for one zone. Fires once when the count reaches
/// the threshold and re-arms on the first frame below it. No debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertStateMachine {
    threshold: usize,
    state: AlertState,
}

impl AlertStateMachine {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            state: AlertState::Idle,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Advances the machine by one frame. Returns `true` when this frame opens
    /// a new breach episode and a dispatch must be issued.
    pub fn evaluate(&mut self, count: usize) -> bool {
        let breached = count >= self.threshold;
        match (self.state, breached) {
            (AlertState::Idle, true) => {
                self.state = AlertState::Alerting;
                true
            }
            (AlertState::Alerting, false) => {
                self.state = AlertState::Idle;
                false
            }
            (AlertState::Idle, false) | (AlertState::Alerting, true) => false,
        }
    }
}

/// The alert state of every zone, owned by the pipeline and threaded through
/// each frame's evaluation.
#[derive(Debug, Clone)]
pub struct AlertBook {
    threshold: usize,
    machines: HashMap<String, AlertStateMachine>,
}

impl AlertBook {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            machines: HashMap::new(),
        }
    }

    /// Current state of a zone, `Idle` for a zone never evaluated
    pub fn state(&self, zone_name: &str) -> AlertState {
        self.machines
            .get(zone_name)
            .map(|m| m.state())
            .unwrap_or_default()
    }

    /// Evaluates every zone of the frame and returns the dispatches this
    /// frame must issue, in zone order.
    pub fn evaluate_frame(&mut self, counts: &ZoneCounts, raised_at: DateTime<Local>) -> Vec<DispatchRequest> {
        let threshold = self.threshold;
        let mut requests = Vec::new();
        for (zone_name, count) in counts.iter() {
            let machine = self
                .machines
                .entry(zone_name.to_string())
                .or_insert_with(|| AlertStateMachine::new(threshold));
            if machine.evaluate(count) {
                requests.push(DispatchRequest {
                    zone_name: zone_name.to_string(),
                    count,
                    raised_at,
                });
            }
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_indices(threshold: usize, counts: &[usize]) -> Vec<usize> {
        let mut machine = AlertStateMachine::new(threshold);
        counts
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| machine.evaluate(c).then_some(i))
            .collect()
    }

    #[test]
    fn test_one_dispatch_per_breach_episode() {
        assert_eq!(dispatch_indices(13, &[5, 14, 15, 14, 16, 3, 15]), vec![1, 6]);
    }

    #[test]
    fn test_sustained_breach_dispatches_once() {
        assert_eq!(dispatch_indices(13, &[15, 15, 15]), vec![0]);
    }

    #[test]
    fn test_threshold_is_inclusive_and_single_frame_triggers() {
        assert_eq!(dispatch_indices(13, &[12, 13, 12, 13]), vec![1, 3]);
    }

    #[test]
    fn test_transition_table() {
        let mut machine = AlertStateMachine::new(13);
        assert_eq!(machine.state(), AlertState::Idle);

        assert!(!machine.evaluate(2));
        assert_eq!(machine.state(), AlertState::Idle);

        assert!(machine.evaluate(13));
        assert_eq!(machine.state(), AlertState::Alerting);
        assert!(machine.state().is_triggered());

        assert!(!machine.evaluate(20));
        assert_eq!(machine.state(), AlertState::Alerting);

        assert!(!machine.evaluate(12));
        assert_eq!(machine.state(), AlertState::Idle);
    }

    #[test]
    fn test_alert_book_tracks_zones_independently() {
        use crate::detection::BoundingBox;
        use crate::occupancy::OccupancyAggregator;
        use crate::tracker::Track;
        use crate::zone::Zone;

        let aggregator = OccupancyAggregator::new(vec![
            Zone::new("A", &[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]).unwrap(),
            Zone::new("B", &[(200.0, 0.0), (300.0, 0.0), (300.0, 100.0), (200.0, 100.0)]).unwrap(),
        ]);
        let crowd = |a: usize, b: usize| -> Vec<Track> {
            let mut tracks = Vec::new();
            for i in 0..a {
                tracks.push(Track::new(i as u64, true, BoundingBox::new(40.0, 40.0, 20.0, 20.0)));
            }
            for i in 0..b {
                tracks.push(Track::new(100 + i as u64, true, BoundingBox::new(240.0, 40.0, 20.0, 20.0)));
            }
            tracks
        };

        let now = Local::now();
        let mut book = AlertBook::new(2);

        let requests = book.evaluate_frame(&aggregator.count(&crowd(2, 0)), now);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].zone_name, "A");
        assert_eq!(requests[0].count, 2);
        assert_eq!(book.state("A"), AlertState::Alerting);
        assert_eq!(book.state("B"), AlertState::Idle);

        let requests = book.evaluate_frame(&aggregator.count(&crowd(3, 2)), now);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].zone_name, "B");

        let requests = book.evaluate_frame(&aggregator.count(&crowd(0, 2)), now);
        assert!(requests.is_empty());
        assert_eq!(book.state("A"), AlertState::Idle);
        assert_eq!(book.state("B"), AlertState::Alerting);
        assert_eq!(book.state("unknown"), AlertState::Idle);
    }
}

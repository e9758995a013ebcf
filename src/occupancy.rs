use crate::tracker::Track;
use crate::zone::Zone;

/// Per-frame occupant count for every defined zone, in zone definition order.
/// A zone nobody stands in is present with a count of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCounts {
    counts: Vec<(String, usize)>,
}

impl ZoneCounts {
    pub fn get(&self, zone_name: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(name, _)| name == zone_name)
            .map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum over zones. Overlapping zones count a shared occupant once per zone.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, count)| count).sum()
    }
}

/// Maps confirmed tracks onto the configured zones
#[derive(Debug, Clone)]
pub struct OccupancyAggregator {
    zones: Vec<Zone>,
}

impl OccupancyAggregator {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Counts the tracks whose box center falls in each zone. A point inside
    /// several overlapping zones is counted in all of them.
    pub fn count(&self, tracks: &[Track]) -> ZoneCounts {
        let mut counts: Vec<(String, usize)> =
            self.zones.iter().map(|z| (z.name().to_string(), 0)).collect();

        for track in tracks.iter().filter(|t| t.confirmed) {
            let center = track.bounding_box.center();
            for (zone, (_, count)) in self.zones.iter().zip(counts.iter_mut()) {
                if zone.contains(&center) {
                    *count += 1;
                }
            }
        }

        ZoneCounts { counts }
    }
}

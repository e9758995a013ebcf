use geo::{Intersects, LineString, Point, Polygon};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ZoneError {
    #[error("zone name must not be empty")]
    EmptyName,
    #[error("zone {name} needs at least 3 boundary points, got {points}")]
    TooFewPoints { name: String, points: usize },
    #[error("zone {name} has a non-finite boundary coordinate")]
    NonFiniteCoordinate { name: String },
}

/// A fixed polygonal region of the frame monitored for occupancy
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    name: String,
    boundary: Polygon<f64>,
}

impl Zone {
    /// Creates a zone from an ordered list of (x, y) vertices. The ring is
    /// closed implicitly, the first point does not need to be repeated.
    pub fn new(name: impl Into<String>, points: &[(f64, f64)]) -> Result<Self, ZoneError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ZoneError::EmptyName);
        }
        if points.len() < 3 {
            return Err(ZoneError::TooFewPoints {
                name,
                points: points.len(),
            });
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(ZoneError::NonFiniteCoordinate { name });
        }

        let boundary = Polygon::new(LineString::from(points.to_vec()), vec![]);
        Ok(Self { name, boundary })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point-in-polygon test. Membership is boundary-inclusive: a point lying
    /// exactly on an edge or a vertex belongs to the zone.
    pub fn contains(&self, point: &Point<f64>) -> bool {
        self.boundary.intersects(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::new("Zone A", &[(50.0, 50.0), (400.0, 50.0), (400.0, 400.0), (50.0, 400.0)]).unwrap()
    }

    #[test]
    fn test_point_inside_and_outside() {
        let zone = square();
        assert!(zone.contains(&Point::new(200.0, 200.0)));
        assert!(!zone.contains(&Point::new(10.0, 200.0)));
        assert!(!zone.contains(&Point::new(200.0, 401.0)));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let zone = square();
        // edges
        assert!(zone.contains(&Point::new(50.0, 200.0)));
        assert!(zone.contains(&Point::new(200.0, 400.0)));
        // vertex
        assert!(zone.contains(&Point::new(400.0, 50.0)));
    }

    #[test]
    fn test_concave_polygon() {
        // L shape, the notch at the top right is outside
        let zone = Zone::new(
            "L",
            &[(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (5.0, 5.0), (5.0, 10.0), (0.0, 10.0)],
        )
        .unwrap();
        assert!(zone.contains(&Point::new(2.0, 8.0)));
        assert!(zone.contains(&Point::new(8.0, 2.0)));
        assert!(!zone.contains(&Point::new(8.0, 8.0)));
    }

    #[test]
    fn test_invalid_zones() {
        assert_eq!(
            Zone::new("tiny", &[(0.0, 0.0), (1.0, 1.0)]),
            Err(ZoneError::TooFewPoints {
                name: "tiny".to_string(),
                points: 2
            })
        );
        assert_eq!(
            Zone::new(" ", &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
            Err(ZoneError::EmptyName)
        );
        assert_eq!(
            Zone::new("nan", &[(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0)]),
            Err(ZoneError::NonFiniteCoordinate {
                name: "nan".to_string()
            })
        );
    }
}

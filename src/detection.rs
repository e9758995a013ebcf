use anyhow::Result;
use geo::Point;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Builds a box from its corner coordinates (x1, y1, x2, y2)
    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Representative point of the box used for zone membership
    pub fn center(&self) -> Point<f64> {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// A box is usable only if every coordinate is finite and neither side is negative
    pub fn is_well_formed(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Intersection over union of two boxes, 0.0 when they do not overlap
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter_w = (self.right().min(other.right()) - self.left.max(other.left)).max(0.0);
        let inter_h = (self.bottom().min(other.bottom()) - self.top.max(other.top)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One detected object in one frame, as produced by the detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            bounding_box,
            confidence,
        }
    }
}

/// Object detection capability. Implementations return detections already
/// filtered to the monitored object class.
pub trait Detector<F: ?Sized> {
    fn detect(&mut self, frame: &F) -> Result<Vec<Detection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_of_box() {
        let bbox = BoundingBox::new(100.0, 50.0, 40.0, 80.0);
        let center = bbox.center();
        assert_eq!(center.x(), 120.0);
        assert_eq!(center.y(), 90.0);
    }

    #[test]
    fn test_from_ltrb() {
        let bbox = BoundingBox::from_ltrb(10.0, 20.0, 30.0, 60.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 20.0, 40.0));
        assert_eq!(bbox.right(), 30.0);
        assert_eq!(bbox.bottom(), 60.0);
    }

    #[test]
    fn test_is_well_formed() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0).is_well_formed());
        assert!(BoundingBox::new(-5.0, -5.0, 0.0, 0.0).is_well_formed());
        assert!(!BoundingBox::new(0.0, 0.0, -1.0, 10.0).is_well_formed());
        assert!(!BoundingBox::new(0.0, 0.0, 10.0, -1.0).is_well_formed());
        assert!(!BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0).is_well_formed());
        assert!(!BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0).is_well_formed());
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        let c = BoundingBox::new(20.0, 20.0, 10.0, 10.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.iou(&c), 0.0);

        let empty = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }
}

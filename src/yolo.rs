use crate::detection::{BoundingBox, Detection, Detector};
use anyhow::{Context, Result};
use usls::{Config, DataLoader, Hbb, Image, Y, models::YOLO};

/// Person detector backed by a usls YOLO model
pub struct YoloDetector {
    model: YOLO,
    class_name: String,
    confidence: f32,
}

impl YoloDetector {
    pub fn new(config: Config, class_name: &str, confidence: f32) -> Result<Self> {
        let model = YOLO::new(config.commit()?).context("Failed to load YOLO model")?;
        Ok(Self {
            model,
            class_name: class_name.to_string(),
            confidence,
        })
    }
}

impl Detector<Image> for YoloDetector {
    fn detect(&mut self, frame: &Image) -> Result<Vec<Detection>> {
        let ys = self.model.forward(std::slice::from_ref(frame))?;
        Ok(ys
            .iter()
            .flat_map(|y| extract_detections(y, &self.class_name, self.confidence))
            .collect())
    }
}

/// Keeps the boxes of one class at or above the confidence threshold
pub fn extract_detections(y: &Y, class_name: &str, confidence: f32) -> Vec<Detection> {
    let Some(hbbs) = y.hbbs() else {
        return Vec::new();
    };
    hbbs.iter()
        .filter(|hbb| hbb.name() == Some(class_name))
        .filter_map(|hbb| {
            let score = hbb.confidence()?;
            (score >= confidence).then(|| to_detection(hbb, score))
        })
        .collect()
}

fn to_detection(hbb: &Hbb, score: f32) -> Detection {
    Detection::new(
        BoundingBox::new(
            hbb.xmin() as f64,
            hbb.ymin() as f64,
            hbb.width() as f64,
            hbb.height() as f64,
        ),
        score,
    )
}

/// Opens a video file, stream or image folder one frame per batch
pub fn open_source(source: &str) -> Result<DataLoader> {
    DataLoader::new(source)
        .with_context(|| format!("Failed to open video source {}", source))?
        .with_batch(1)
        .build()
        .with_context(|| format!("Failed to start decoding {}", source))
}

use serde::{Deserialize, Serialize};

/// Axis-aligned box, normalized to the image size with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Builds a normalized box from pixel corners, clamped to the image.
    pub fn from_corners(
        (xmin, ymin, xmax, ymax): (f32, f32, f32, f32),
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let w = image_width.max(1) as f64;
        let h = image_height.max(1) as f64;
        let x0 = (xmin as f64 / w).clamp(0.0, 1.0);
        let y0 = (ymin as f64 / h).clamp(0.0, 1.0);
        let x1 = (xmax as f64 / w).clamp(0.0, 1.0);
        let y1 = (ymax as f64 / h).clamp(0.0, 1.0);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class_name: String,
    pub probability: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub class_name: String,
    pub probability: f64,
}

/// Raw result of one predictor call.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Detections(Vec<Detection>),
    /// Ranked best-first.
    Classifications(Vec<Classification>),
}

impl Prediction {
    pub fn kind(&self) -> OutputKind {
        match self {
            Prediction::Detections(_) => OutputKind::Detections,
            Prediction::Classifications(_) => OutputKind::Classifications,
        }
    }
}

/// Declared output type of a model query. The input type is always an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Detections,
    Classifications,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Detections => f.write_str("detections"),
            OutputKind::Classifications => f.write_str("classifications"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_normalized_and_clamped() {
        let b = BoundingBox::from_corners((-10.0, 50.0, 320.0, 300.0), 640, 200);
        assert_eq!(b.x, 0.0);
        assert_eq!(b.y, 0.25);
        assert_eq!(b.width, 0.5);
        assert_eq!(b.height, 0.75);
    }

    #[test]
    fn test_inverted_box_is_empty() {
        let b = BoundingBox::from_corners((100.0, 100.0, 50.0, 50.0), 200, 200);
        assert_eq!(b.width, 0.0);
        assert_eq!(b.height, 0.0);
    }

    #[test]
    fn test_detection_field_names() {
        let d = Detection {
            class_name: "cat".into(),
            probability: 0.5,
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0 },
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["className"], "cat");
        assert_eq!(v["boundingBox"]["width"], 1.0);
    }
}

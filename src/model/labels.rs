use anyhow::{bail, Context, Result};
use std::path::Path;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "sofa",
    "pottedplant", "bed", "diningtable", "toilet", "tvmonitor", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Reads a one-label-per-line file. Blank lines are skipped.
pub fn read_label_file(path: &Path, expected: usize) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading labels {}", path.display()))?;
    let labels: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if labels.len() != expected {
        bail!(
            "label file {} has {} entries, expected {}",
            path.display(),
            labels.len(),
            expected
        );
    }
    Ok(labels)
}

/// Name for a class index, falling back to the index itself.
pub fn label_for(labels: &[String], idx: usize) -> String {
    labels
        .get(idx)
        .cloned()
        .unwrap_or_else(|| format!("class_{idx}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_label_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tench\n\ngoldfish\n  great white shark  ").unwrap();
        let labels = read_label_file(file.path(), 3).unwrap();
        assert_eq!(labels, vec!["tench", "goldfish", "great white shark"]);
        assert!(read_label_file(file.path(), 1000).is_err());
    }

    #[test]
    fn test_label_fallback() {
        let labels = vec!["cat".to_string()];
        assert_eq!(label_for(&labels, 0), "cat");
        assert_eq!(label_for(&labels, 7), "class_7");
    }
}

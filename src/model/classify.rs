use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::{mobilenetv4, resnet};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

use super::labels::label_for;
use super::prediction::{Classification, Prediction};
use super::zoo::{Model, Predictor};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const INPUT_SIDE: u32 = 224;
const TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierArch {
    ResNet50,
    MobileNetV4Small,
}

/// An ImageNet-style classifier over 224x224 inputs.
pub struct ImageClassifier {
    name: String,
    net: Func<'static>,
    labels: Vec<String>,
    device: Device,
}

impl ImageClassifier {
    pub fn load(
        name: &str,
        arch: ClassifierArch,
        weights: &Path,
        labels: Vec<String>,
        device: &Device,
    ) -> Result<Self> {
        let tensors = candle_core::safetensors::load(weights, device)
            .with_context(|| format!("reading {}", weights.display()))?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let nclasses = labels.len();
        let net = match arch {
            ClassifierArch::ResNet50 => resnet::resnet50(nclasses, vb)?,
            ClassifierArch::MobileNetV4Small => {
                mobilenetv4::mobilenetv4(&mobilenetv4::Config::small(), nclasses, vb)?
            }
        };
        Ok(Self {
            name: name.to_string(),
            net,
            labels,
            device: device.clone(),
        })
    }
}

impl Model for ImageClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predictor(&self) -> Result<Box<dyn Predictor + '_>> {
        Ok(Box::new(ClassifierPredictor { classifier: self }))
    }
}

struct ClassifierPredictor<'a> {
    classifier: &'a ImageClassifier,
}

impl Predictor for ClassifierPredictor<'_> {
    fn predict(&mut self, image: &DynamicImage) -> Result<Prediction> {
        let c = self.classifier;
        let input = image_tensor(image, &c.device)?.unsqueeze(0)?;
        let logits = c.net.forward(&input)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_device(&Device::Cpu)?
            .to_vec1::<f32>()?;
        Ok(Prediction::Classifications(rank(&probs, &c.labels, TOP_K)))
    }
}

/// Center-crops to 224x224 and normalizes with the ImageNet statistics.
fn image_tensor(image: &DynamicImage, device: &Device) -> Result<Tensor> {
    let img = image.resize_to_fill(INPUT_SIDE, INPUT_SIDE, FilterType::Triangle);
    let data = img.to_rgb8().into_raw();
    let side = INPUT_SIDE as usize;
    let t = Tensor::from_vec(data, (side, side, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;
    let mean = Tensor::new(&IMAGENET_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGENET_STD, device)?.reshape((3, 1, 1))?;
    Ok((t / 255.)?.broadcast_sub(&mean)?.broadcast_div(&std)?)
}

/// Top `k` classes, best first. Non-finite scores are dropped.
fn rank(probs: &[f32], labels: &[String], k: usize) -> Vec<Classification> {
    let mut indexed: Vec<(usize, f32)> = probs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed
        .into_iter()
        .take(k)
        .map(|(idx, p)| Classification {
            class_name: label_for(labels, idx),
            probability: p.clamp(0.0, 1.0) as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_and_truncates() {
        let labels: Vec<String> = ["tench", "goldfish", "shark"].map(String::from).to_vec();
        let ranked = rank(&[0.1, 0.7, 0.2], &labels, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].class_name, "goldfish");
        assert!((ranked[0].probability - 0.7).abs() < 1e-6);
        assert_eq!(ranked[1].class_name, "shark");
    }

    #[test]
    fn test_rank_skips_nan_scores() {
        let labels: Vec<String> = ["a", "b", "c"].map(String::from).to_vec();
        let ranked = rank(&[f32::NAN, 0.9, f32::INFINITY], &labels, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].class_name, "b");

        let body = crate::response::encode(&Ok(crate::response::Output::Best(ranked[0].clone())));
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(v["probability"].is_number());
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(&[], &[], 5).is_empty());
    }

    #[test]
    fn test_image_tensor_shape() {
        let image = DynamicImage::new_rgb8(300, 200);
        let t = image_tensor(&image, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[3, 224, 224]);
    }
}

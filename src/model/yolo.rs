//! YOLOv8 object detector on candle.
//!
//! The network layout and tensor names follow the `lmz/candle-yolo-v8`
//! safetensors exports: `net` (CSP-Darknet backbone), `fpn` (neck) and
//! `head` (anchor-free detection head with distribution focal loss).

use anyhow::Result;
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{batch_norm, conv2d, conv2d_no_bias, Conv2d, Conv2dConfig, VarBuilder};
use candle_transformers::object_detection::{non_maximum_suppression, Bbox};
use image::imageops::FilterType;
use image::DynamicImage;
use log::debug;
use std::path::Path;

use super::labels::label_for;
use super::prediction::{BoundingBox, Detection, Prediction};
use super::zoo::{Model, Predictor};

const MAX_INPUT_SIDE: u32 = 640;
const STRIDE: u32 = 32;

/// Depth/width scaling of a YOLOv8 size variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multiples {
    depth: f64,
    width: f64,
    ratio: f64,
}

impl Multiples {
    pub fn n() -> Self {
        Self { depth: 0.33, width: 0.25, ratio: 2.0 }
    }

    pub fn m() -> Self {
        Self { depth: 0.67, width: 0.75, ratio: 1.5 }
    }

    fn filters(&self) -> (usize, usize, usize) {
        let f1 = (256. * self.width) as usize;
        let f2 = (512. * self.width) as usize;
        let f3 = (512. * self.width * self.ratio) as usize;
        (f1, f2, f3)
    }
}

#[derive(Debug)]
struct ConvBlock {
    conv: Conv2d,
}

impl ConvBlock {
    fn load(
        vb: VarBuilder,
        c1: usize,
        c2: usize,
        k: usize,
        stride: usize,
        padding: Option<usize>,
    ) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: padding.unwrap_or(k / 2),
            stride,
            groups: 1,
            dilation: 1,
            ..Default::default()
        };
        let bn = batch_norm(c2, 1e-3, vb.pp("bn"))?;
        let conv = conv2d_no_bias(c1, c2, k, cfg, vb.pp("conv"))?.absorb_bn(&bn)?;
        Ok(Self { conv })
    }
}

impl Module for ConvBlock {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.conv.forward(xs)?.silu()
    }
}

#[derive(Debug)]
struct Bottleneck {
    cv1: ConvBlock,
    cv2: ConvBlock,
    residual: bool,
}

impl Bottleneck {
    fn load(vb: VarBuilder, c1: usize, c2: usize, shortcut: bool) -> candle_core::Result<Self> {
        let cv1 = ConvBlock::load(vb.pp("cv1"), c1, c2, 3, 1, None)?;
        let cv2 = ConvBlock::load(vb.pp("cv2"), c2, c2, 3, 1, None)?;
        Ok(Self { cv1, cv2, residual: c1 == c2 && shortcut })
    }
}

impl Module for Bottleneck {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let ys = self.cv2.forward(&self.cv1.forward(xs)?)?;
        if self.residual { xs + ys } else { Ok(ys) }
    }
}

/// CSP bottleneck with two convolutions.
#[derive(Debug)]
struct C2f {
    cv1: ConvBlock,
    cv2: ConvBlock,
    bottleneck: Vec<Bottleneck>,
}

impl C2f {
    fn load(
        vb: VarBuilder,
        c1: usize,
        c2: usize,
        n: usize,
        shortcut: bool,
    ) -> candle_core::Result<Self> {
        let c = (c2 as f64 * 0.5) as usize;
        let cv1 = ConvBlock::load(vb.pp("cv1"), c1, 2 * c, 1, 1, None)?;
        let cv2 = ConvBlock::load(vb.pp("cv2"), (2 + n) * c, c2, 1, 1, None)?;
        let bottleneck = (0..n)
            .map(|idx| Bottleneck::load(vb.pp(format!("bottleneck.{idx}")), c, c, shortcut))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { cv1, cv2, bottleneck })
    }
}

impl Module for C2f {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut ys = self.cv1.forward(xs)?.chunk(2, 1)?;
        for m in &self.bottleneck {
            let next = match ys.last() {
                Some(last) => m.forward(last)?,
                None => candle_core::bail!("c2f: empty chunk list"),
            };
            ys.push(next);
        }
        self.cv2.forward(&Tensor::cat(ys.as_slice(), 1)?)
    }
}

/// Spatial pyramid pooling, fast variant.
#[derive(Debug)]
struct Sppf {
    cv1: ConvBlock,
    cv2: ConvBlock,
    k: usize,
}

impl Sppf {
    fn load(vb: VarBuilder, c1: usize, c2: usize, k: usize) -> candle_core::Result<Self> {
        let c_ = c1 / 2;
        let cv1 = ConvBlock::load(vb.pp("cv1"), c1, c_, 1, 1, None)?;
        let cv2 = ConvBlock::load(vb.pp("cv2"), c_ * 4, c2, 1, 1, None)?;
        Ok(Self { cv1, cv2, k })
    }

    fn pool(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let p = self.k / 2;
        xs.pad_with_zeros(2, p, p)?
            .pad_with_zeros(3, p, p)?
            .max_pool2d_with_stride(self.k, 1)
    }
}

impl Module for Sppf {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.cv1.forward(xs)?;
        let xs2 = self.pool(&xs)?;
        let xs3 = self.pool(&xs2)?;
        let xs4 = self.pool(&xs3)?;
        self.cv2.forward(&Tensor::cat(&[&xs, &xs2, &xs3, &xs4], 1)?)
    }
}

/// Integral of the distribution focal loss bins.
#[derive(Debug)]
struct Dfl {
    conv: Conv2d,
    num_bins: usize,
}

impl Dfl {
    fn load(vb: VarBuilder, num_bins: usize) -> candle_core::Result<Self> {
        let conv = conv2d_no_bias(num_bins, 1, 1, Default::default(), vb.pp("conv"))?;
        Ok(Self { conv, num_bins })
    }
}

impl Module for Dfl {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (b_sz, _channels, anchors) = xs.dims3()?;
        let xs = xs
            .reshape((b_sz, 4, self.num_bins, anchors))?
            .transpose(2, 1)?;
        let xs = candle_nn::ops::softmax(&xs, 1)?;
        self.conv.forward(&xs)?.reshape((b_sz, 4, anchors))
    }
}

#[derive(Debug)]
struct DarkNet {
    b1_0: ConvBlock,
    b1_1: ConvBlock,
    b2_0: C2f,
    b2_1: ConvBlock,
    b2_2: C2f,
    b3_0: ConvBlock,
    b3_1: C2f,
    b4_0: ConvBlock,
    b4_1: C2f,
    b5: Sppf,
}

impl DarkNet {
    fn load(vb: VarBuilder, m: Multiples) -> candle_core::Result<Self> {
        let (w, r, d) = (m.width, m.ratio, m.depth);
        let c = |base: f64| (base * w) as usize;
        let depth = |base: f64| (base * d).round() as usize;
        let top = (512. * w * r) as usize;
        Ok(Self {
            b1_0: ConvBlock::load(vb.pp("b1.0"), 3, c(64.), 3, 2, Some(1))?,
            b1_1: ConvBlock::load(vb.pp("b1.1"), c(64.), c(128.), 3, 2, Some(1))?,
            b2_0: C2f::load(vb.pp("b2.0"), c(128.), c(128.), depth(3.), true)?,
            b2_1: ConvBlock::load(vb.pp("b2.1"), c(128.), c(256.), 3, 2, Some(1))?,
            b2_2: C2f::load(vb.pp("b2.2"), c(256.), c(256.), depth(6.), true)?,
            b3_0: ConvBlock::load(vb.pp("b3.0"), c(256.), c(512.), 3, 2, Some(1))?,
            b3_1: C2f::load(vb.pp("b3.1"), c(512.), c(512.), depth(6.), true)?,
            b4_0: ConvBlock::load(vb.pp("b4.0"), c(512.), top, 3, 2, Some(1))?,
            b4_1: C2f::load(vb.pp("b4.1"), top, top, depth(3.), true)?,
            b5: Sppf::load(vb.pp("b5.0"), top, top, 5)?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<(Tensor, Tensor, Tensor)> {
        let x1 = self.b1_1.forward(&self.b1_0.forward(xs)?)?;
        let x2 = self
            .b2_2
            .forward(&self.b2_1.forward(&self.b2_0.forward(&x1)?)?)?;
        let x3 = self.b3_1.forward(&self.b3_0.forward(&x2)?)?;
        let x4 = self.b4_1.forward(&self.b4_0.forward(&x3)?)?;
        let x5 = self.b5.forward(&x4)?;
        Ok((x2, x3, x5))
    }
}

#[derive(Debug)]
struct Neck {
    n1: C2f,
    n2: C2f,
    n3: ConvBlock,
    n4: C2f,
    n5: ConvBlock,
    n6: C2f,
}

impl Neck {
    fn load(vb: VarBuilder, m: Multiples) -> candle_core::Result<Self> {
        let (w, r, d) = (m.width, m.ratio, m.depth);
        let n = (3. * d).round() as usize;
        let c = |base: f64| (base * w) as usize;
        Ok(Self {
            n1: C2f::load(vb.pp("n1"), (512. * w * (1. + r)) as usize, c(512.), n, false)?,
            n2: C2f::load(vb.pp("n2"), c(768.), c(256.), n, false)?,
            n3: ConvBlock::load(vb.pp("n3"), c(256.), c(256.), 3, 2, Some(1))?,
            n4: C2f::load(vb.pp("n4"), c(768.), c(512.), n, false)?,
            n5: ConvBlock::load(vb.pp("n5"), c(512.), c(512.), 3, 2, Some(1))?,
            n6: C2f::load(
                vb.pp("n6"),
                (512. * w * (1. + r)) as usize,
                (512. * w * r) as usize,
                n,
                false,
            )?,
        })
    }

    fn forward(
        &self,
        p3: &Tensor,
        p4: &Tensor,
        p5: &Tensor,
    ) -> candle_core::Result<(Tensor, Tensor, Tensor)> {
        let x = self.n1.forward(&Tensor::cat(&[&upsample(p5)?, p4], 1)?)?;
        let head_1 = self.n2.forward(&Tensor::cat(&[&upsample(&x)?, p3], 1)?)?;
        let head_2 = self
            .n4
            .forward(&Tensor::cat(&[&self.n3.forward(&head_1)?, &x], 1)?)?;
        let head_3 = self
            .n6
            .forward(&Tensor::cat(&[&self.n5.forward(&head_2)?, p5], 1)?)?;
        Ok((head_1, head_2, head_3))
    }
}

fn upsample(xs: &Tensor) -> candle_core::Result<Tensor> {
    let (_b, _c, h, w) = xs.dims4()?;
    xs.upsample_nearest2d(2 * h, 2 * w)
}

type Branch = (ConvBlock, ConvBlock, Conv2d);

fn forward_branch(branch: &Branch, xs: &Tensor) -> candle_core::Result<Tensor> {
    let xs = branch.0.forward(xs)?;
    let xs = branch.1.forward(&xs)?;
    branch.2.forward(&xs)
}

#[derive(Debug)]
struct DetectionHead {
    dfl: Dfl,
    cv2: [Branch; 3],
    cv3: [Branch; 3],
    ch: usize,
    no: usize,
}

impl DetectionHead {
    fn load(
        vb: VarBuilder,
        nc: usize,
        filters: (usize, usize, usize),
    ) -> candle_core::Result<Self> {
        let ch = 16;
        let dfl = Dfl::load(vb.pp("dfl"), ch)?;
        let c1 = usize::max(filters.0, nc.min(100));
        let c2 = usize::max(filters.0 / 4, ch * 4);
        let cv3 = [
            Self::load_branch(vb.pp("cv3.0"), filters.0, c1, nc)?,
            Self::load_branch(vb.pp("cv3.1"), filters.1, c1, nc)?,
            Self::load_branch(vb.pp("cv3.2"), filters.2, c1, nc)?,
        ];
        let cv2 = [
            Self::load_branch(vb.pp("cv2.0"), filters.0, c2, 4 * ch)?,
            Self::load_branch(vb.pp("cv2.1"), filters.1, c2, 4 * ch)?,
            Self::load_branch(vb.pp("cv2.2"), filters.2, c2, 4 * ch)?,
        ];
        Ok(Self { dfl, cv2, cv3, ch, no: nc + ch * 4 })
    }

    fn load_branch(
        vb: VarBuilder,
        filter: usize,
        hidden: usize,
        out: usize,
    ) -> candle_core::Result<Branch> {
        let block0 = ConvBlock::load(vb.pp("0"), filter, hidden, 3, 1, None)?;
        let block1 = ConvBlock::load(vb.pp("1"), hidden, hidden, 3, 1, None)?;
        let conv = conv2d(hidden, out, 1, Default::default(), vb.pp("2"))?;
        Ok((block0, block1, conv))
    }

    /// Returns `(batch, 4 + classes, anchors)`: box center/size in input
    /// pixels followed by per-class sigmoid scores.
    fn forward(&self, xs0: &Tensor, xs1: &Tensor, xs2: &Tensor) -> candle_core::Result<Tensor> {
        let level = |xs: &Tensor, i: usize| -> candle_core::Result<Tensor> {
            let boxes = forward_branch(&self.cv2[i], xs)?;
            let classes = forward_branch(&self.cv3[i], xs)?;
            Tensor::cat(&[&boxes, &classes], 1)
        };
        let xs0 = level(xs0, 0)?;
        let xs1 = level(xs1, 1)?;
        let xs2 = level(xs2, 2)?;

        let (anchors, strides) = make_anchors(&xs0, &xs1, &xs2, (8, 16, 32), 0.5)?;
        let anchors = anchors.transpose(0, 1)?.unsqueeze(0)?;
        let strides = strides.transpose(0, 1)?;

        let flatten = |xs: &Tensor| -> candle_core::Result<Tensor> {
            let d = xs.dim(0)?;
            let el = xs.elem_count();
            xs.reshape((d, self.no, el / (d * self.no)))
        };
        let x_cat = Tensor::cat(&[flatten(&xs0)?, flatten(&xs1)?, flatten(&xs2)?], 2)?;
        let box_ = x_cat.i((.., ..self.ch * 4))?;
        let cls = x_cat.i((.., self.ch * 4..))?;

        let dbox = dist2bbox(&self.dfl.forward(&box_)?, &anchors)?;
        let dbox = dbox.broadcast_mul(&strides)?;
        Tensor::cat(&[dbox, candle_nn::ops::sigmoid(&cls)?], 1)
    }
}

fn make_anchors(
    xs0: &Tensor,
    xs1: &Tensor,
    xs2: &Tensor,
    (s0, s1, s2): (usize, usize, usize),
    grid_cell_offset: f64,
) -> candle_core::Result<(Tensor, Tensor)> {
    let dev = xs0.device();
    let mut anchor_points = vec![];
    let mut stride_tensor = vec![];
    for (xs, stride) in [(xs0, s0), (xs1, s1), (xs2, s2)] {
        // only the spatial dims of xs are used
        let (_, _, h, w) = xs.dims4()?;
        let sx = (Tensor::arange(0, w as u32, dev)?.to_dtype(DType::F32)? + grid_cell_offset)?;
        let sy = (Tensor::arange(0, h as u32, dev)?.to_dtype(DType::F32)? + grid_cell_offset)?;
        let sx = sx.reshape((1, w))?.repeat((h, 1))?.flatten_all()?;
        let sy = sy.reshape((h, 1))?.repeat((1, w))?.flatten_all()?;
        anchor_points.push(Tensor::stack(&[&sx, &sy], D::Minus1)?);
        stride_tensor.push((Tensor::ones(h * w, DType::F32, dev)? * stride as f64)?);
    }
    let anchor_points = Tensor::cat(anchor_points.as_slice(), 0)?;
    let stride_tensor = Tensor::cat(stride_tensor.as_slice(), 0)?.unsqueeze(1)?;
    Ok((anchor_points, stride_tensor))
}

fn dist2bbox(distance: &Tensor, anchor_points: &Tensor) -> candle_core::Result<Tensor> {
    let chunks = distance.chunk(2, 1)?;
    let x1y1 = anchor_points.broadcast_sub(&chunks[0])?;
    let x2y2 = anchor_points.broadcast_add(&chunks[1])?;
    let c_xy = ((&x1y1 + &x2y2)? * 0.5)?;
    let wh = (&x2y2 - &x1y1)?;
    Tensor::cat(&[c_xy, wh], 1)
}

#[derive(Debug)]
pub struct YoloV8 {
    net: DarkNet,
    fpn: Neck,
    head: DetectionHead,
}

impl YoloV8 {
    pub fn load(vb: VarBuilder, m: Multiples, num_classes: usize) -> candle_core::Result<Self> {
        Ok(Self {
            net: DarkNet::load(vb.pp("net"), m)?,
            fpn: Neck::load(vb.pp("fpn"), m)?,
            head: DetectionHead::load(vb.pp("head"), num_classes, m.filters())?,
        })
    }
}

impl Module for YoloV8 {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (xs1, xs2, xs3) = self.net.forward(xs)?;
        let (xs1, xs2, xs3) = self.fpn.forward(&xs1, &xs2, &xs3)?;
        self.head.forward(&xs1, &xs2, &xs3)
    }
}

/// Thresholds applied after the forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.25,
            nms_threshold: 0.45,
        }
    }
}

/// A loaded YOLOv8 detector.
pub struct YoloDetector {
    name: String,
    net: YoloV8,
    labels: Vec<String>,
    device: Device,
    params: DetectParams,
}

impl YoloDetector {
    pub fn load(
        name: &str,
        weights: &Path,
        multiples: Multiples,
        labels: Vec<String>,
        device: &Device,
        params: DetectParams,
    ) -> Result<Self> {
        let tensors = candle_core::safetensors::load(weights, device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let net = YoloV8::load(vb, multiples, labels.len())?;
        Ok(Self {
            name: name.to_string(),
            net,
            labels,
            device: device.clone(),
            params,
        })
    }
}

impl Model for YoloDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn predictor(&self) -> Result<Box<dyn Predictor + '_>> {
        Ok(Box::new(YoloPredictor { detector: self }))
    }
}

struct YoloPredictor<'a> {
    detector: &'a YoloDetector,
}

impl Predictor for YoloPredictor<'_> {
    fn predict(&mut self, image: &DynamicImage) -> Result<Prediction> {
        let d = self.detector;
        let (width, height) = input_size(image.width(), image.height());
        let input = image_tensor(image, width, height, &d.device)?;

        let pred = d.net.forward(&input)?.squeeze(0)?.to_device(&Device::Cpu)?;
        // rows: one per anchor, [cx, cy, w, h, score_0, ..., score_n]
        let rows = pred.t()?.to_vec2::<f32>()?;
        debug!("{}: {} candidate anchors", d.name, rows.len());

        let detections = decode_rows(&rows, &d.labels, d.params, width, height);
        Ok(Prediction::Detections(detections))
    }
}

/// Resizes so the long side is 640 and both sides are multiples of 32.
fn input_size(width: u32, height: u32) -> (u32, u32) {
    let round = |v: u32| (v / STRIDE * STRIDE).max(STRIDE);
    if width < height {
        let w = (width as u64 * MAX_INPUT_SIDE as u64 / height.max(1) as u64) as u32;
        (round(w), MAX_INPUT_SIDE)
    } else {
        let h = (height as u64 * MAX_INPUT_SIDE as u64 / width.max(1) as u64) as u32;
        (MAX_INPUT_SIDE, round(h))
    }
}

fn image_tensor(image: &DynamicImage, width: u32, height: u32, device: &Device) -> Result<Tensor> {
    let img = image.resize_exact(width, height, FilterType::CatmullRom);
    let data = img.to_rgb8().into_raw();
    let t = Tensor::from_vec(data, (height as usize, width as usize, 3), device)?
        .permute((2, 0, 1))?
        .unsqueeze(0)?
        .to_dtype(DType::F32)?;
    Ok((t * (1. / 255.))?)
}

/// Thresholds, runs per-class NMS, and normalizes boxes to the input size.
/// Output is sorted by descending probability.
fn decode_rows(
    rows: &[Vec<f32>],
    labels: &[String],
    params: DetectParams,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    let nclasses = labels.len();
    let mut bboxes: Vec<Vec<Bbox<()>>> = (0..nclasses).map(|_| vec![]).collect();

    for row in rows {
        if row.len() < 4 + nclasses {
            continue;
        }
        let scores = &row[4..4 + nclasses];
        let Some((class_index, &confidence)) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        if !confidence.is_finite() || confidence <= params.score_threshold {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        bboxes[class_index].push(Bbox {
            xmin: cx - w / 2.,
            ymin: cy - h / 2.,
            xmax: cx + w / 2.,
            ymax: cy + h / 2.,
            confidence,
            data: (),
        });
    }

    non_maximum_suppression(&mut bboxes, params.nms_threshold);

    let mut detections: Vec<Detection> = bboxes
        .iter()
        .enumerate()
        .flat_map(|(class_index, boxes)| {
            boxes.iter().map(move |b| Detection {
                class_name: label_for(labels, class_index),
                probability: b.confidence.clamp(0.0, 1.0) as f64,
                bounding_box: BoundingBox::from_corners(
                    (b.xmin, b.ymin, b.xmax, b.ymax),
                    width,
                    height,
                ),
            })
        })
        .collect();
    detections.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["person".into(), "cat".into()]
    }

    #[test]
    fn test_input_size() {
        assert_eq!(input_size(1280, 720), (640, 352));
        assert_eq!(input_size(480, 640), (480, 640));
        assert_eq!(input_size(100, 100), (640, 640));
        assert_eq!(input_size(4000, 10), (640, 32));
    }

    #[test]
    fn test_decode_thresholds_and_sorts() {
        let rows = vec![
            vec![320.0, 320.0, 64.0, 64.0, 0.1, 0.9],
            vec![100.0, 100.0, 20.0, 20.0, 0.6, 0.2],
            vec![500.0, 500.0, 20.0, 20.0, 0.2, 0.1],
        ];
        let dets = decode_rows(&rows, &labels(), DetectParams::default(), 640, 640);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_name, "cat");
        assert!((dets[0].probability - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].class_name, "person");

        let b = dets[0].bounding_box;
        assert!((b.x - 0.45).abs() < 1e-6);
        assert!((b.width - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_boxes_are_suppressed() {
        let rows = vec![
            vec![100.0, 100.0, 50.0, 50.0, 0.0, 0.8],
            vec![102.0, 101.0, 50.0, 50.0, 0.0, 0.7],
            vec![400.0, 400.0, 50.0, 50.0, 0.0, 0.6],
        ];
        let dets = decode_rows(&rows, &labels(), DetectParams::default(), 640, 640);
        assert_eq!(dets.len(), 2);
        assert!(dets.iter().all(|d| d.class_name == "cat"));
    }

    #[test]
    fn test_non_finite_rows_are_skipped() {
        let rows = vec![
            vec![320.0, 320.0, 64.0, 64.0, 0.1, f32::NAN],
            vec![f32::NAN, 100.0, 20.0, 20.0, 0.9, 0.0],
            vec![100.0, 100.0, 20.0, 20.0, 0.6, 0.2],
        ];
        let dets = decode_rows(&rows, &labels(), DetectParams::default(), 640, 640);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "person");
        assert!(dets[0].probability.is_finite());
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let rows = vec![vec![1.0, 2.0, 3.0]];
        assert!(decode_rows(&rows, &labels(), DetectParams::default(), 64, 64).is_empty());
    }
}

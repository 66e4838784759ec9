use anyhow::{bail, Context, Result};
use candle_core::Device;
use log::info;
use std::sync::Arc;

use super::artifact::{Artifact, ArtifactStore};
use super::classify::{ClassifierArch, ImageClassifier};
use super::labels::{read_label_file, COCO_CLASSES};
use super::yolo::{DetectParams, Multiples, YoloDetector};
use super::zoo::{Application, ModelHandle, ModelQuery, ModelZoo};

pub const ENGINE_NAME: &str = "candle";

const IMAGENET_LABELS_ENTRY: &str = "imagenet-labels";
const IMAGENET_LABELS: Artifact = Artifact {
    file: "imagenet_classes.txt",
    url: "https://raw.githubusercontent.com/pytorch/hub/master/imagenet_classes.txt",
    sha256: option_env!("GLANCE_SHA256_IMAGENET_LABELS"),
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arch {
    YoloV8(Multiples),
    Classifier(ClassifierArch),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelSource {
    Coco,
    /// Downloaded label file, stored under its own cache entry.
    File {
        entry: &'static str,
        artifact: Artifact,
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub application: Application,
    pub engine: &'static str,
    pub filters: &'static [(&'static str, &'static str)],
    pub arch: Arch,
    pub weights: Artifact,
    pub labels: LabelSource,
}

impl CatalogEntry {
    /// True when every constraint in the query holds for this entry.
    pub fn matches(&self, query: &ModelQuery) -> bool {
        if self.application.output() != query.output {
            return false;
        }
        if query.application.is_some_and(|app| app != self.application) {
            return false;
        }
        if let Some(engine) = &query.engine {
            if !engine.eq_ignore_ascii_case(self.engine) {
                return false;
            }
        }
        query
            .filters
            .iter()
            .all(|(k, v)| self.filters.iter().any(|(fk, fv)| fk == k && fv == v))
    }

    /// Every artifact the entry needs, with the cache entry it lives under.
    pub fn artifacts(&self) -> Vec<(&'static str, &Artifact)> {
        let mut out = vec![(self.name, &self.weights)];
        if let LabelSource::File { entry, artifact, .. } = &self.labels {
            out.push((*entry, artifact));
        }
        out
    }
}

/// Models the hub knows how to fetch and run.
pub fn catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            name: "yolov8n",
            application: Application::ObjectDetection,
            engine: ENGINE_NAME,
            filters: &[("backbone", "yolov8n"), ("dataset", "coco")],
            arch: Arch::YoloV8(Multiples::n()),
            weights: Artifact {
                file: "yolov8n.safetensors",
                url: "https://huggingface.co/lmz/candle-yolo-v8/resolve/main/yolov8n.safetensors",
                sha256: option_env!("GLANCE_SHA256_YOLOV8N"),
            },
            labels: LabelSource::Coco,
        },
        CatalogEntry {
            name: "yolov8m",
            application: Application::ObjectDetection,
            engine: ENGINE_NAME,
            filters: &[("backbone", "yolov8m"), ("dataset", "coco")],
            arch: Arch::YoloV8(Multiples::m()),
            weights: Artifact {
                file: "yolov8m.safetensors",
                url: "https://huggingface.co/lmz/candle-yolo-v8/resolve/main/yolov8m.safetensors",
                sha256: option_env!("GLANCE_SHA256_YOLOV8M"),
            },
            labels: LabelSource::Coco,
        },
        CatalogEntry {
            name: "resnet50",
            application: Application::ImageClassification,
            engine: ENGINE_NAME,
            filters: &[("backbone", "resnet50"), ("dataset", "imagenet")],
            arch: Arch::Classifier(ClassifierArch::ResNet50),
            weights: Artifact {
                file: "model.safetensors",
                url: "https://huggingface.co/timm/resnet50.a1_in1k/resolve/main/model.safetensors",
                sha256: option_env!("GLANCE_SHA256_RESNET50"),
            },
            labels: LabelSource::File {
                entry: IMAGENET_LABELS_ENTRY,
                artifact: IMAGENET_LABELS,
                count: 1000,
            },
        },
        CatalogEntry {
            name: "mobilenetv4",
            application: Application::ImageClassification,
            engine: ENGINE_NAME,
            filters: &[("backbone", "mobilenetv4"), ("dataset", "imagenet")],
            arch: Arch::Classifier(ClassifierArch::MobileNetV4Small),
            weights: Artifact {
                file: "model.safetensors",
                url: "https://huggingface.co/timm/mobilenetv4_conv_small.e2400_r224_in1k/resolve/main/model.safetensors",
                sha256: option_env!("GLANCE_SHA256_MOBILENETV4"),
            },
            labels: LabelSource::File {
                entry: IMAGENET_LABELS_ENTRY,
                artifact: IMAGENET_LABELS,
                count: 1000,
            },
        },
    ]
}

/// Model zoo backed by the built-in catalog, the artifact cache and candle.
pub struct HubZoo {
    store: ArtifactStore,
    device: Device,
    params: DetectParams,
    catalog: Vec<CatalogEntry>,
}

impl HubZoo {
    pub fn new(store: ArtifactStore, device: Device, params: DetectParams) -> Self {
        Self {
            store,
            device,
            params,
            catalog: catalog(),
        }
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// First catalog entry satisfying the query.
    pub fn resolve(&self, query: &ModelQuery) -> Result<&CatalogEntry> {
        match self.catalog.iter().find(|e| e.matches(query)) {
            Some(entry) => Ok(entry),
            None => bail!("no model in catalog matches [{}]", query),
        }
    }

    /// Downloads an entry's artifacts without loading it.
    pub fn prefetch(&self, entry: &CatalogEntry) -> Result<()> {
        for (dir, artifact) in entry.artifacts() {
            if self.store.is_cached(dir, artifact) {
                info!("{}/{} already cached", dir, artifact.file);
                continue;
            }
            self.store
                .fetch(dir, artifact)
                .with_context(|| format!("fetching {} for {}", artifact.file, entry.name))?;
        }
        Ok(())
    }

    fn labels(&self, entry: &CatalogEntry) -> Result<Vec<String>> {
        match &entry.labels {
            LabelSource::Coco => Ok(COCO_CLASSES.iter().map(|s| s.to_string()).collect()),
            LabelSource::File { entry: dir, artifact, count } => {
                let path = self.store.fetch(dir, artifact)?;
                read_label_file(&path, *count)
            }
        }
    }
}

impl ModelZoo for HubZoo {
    fn load(&self, query: &ModelQuery) -> Result<ModelHandle> {
        let entry = self.resolve(query)?;
        info!("loading {} from {}", entry.name, self.store.root().display());

        let weights = self
            .store
            .fetch(entry.name, &entry.weights)
            .with_context(|| format!("fetching weights for {}", entry.name))?;
        let labels = self.labels(entry)?;

        let model: ModelHandle = match entry.arch {
            Arch::YoloV8(multiples) => Arc::new(
                YoloDetector::load(entry.name, &weights, multiples, labels, &self.device, self.params)
                    .with_context(|| format!("loading {}", entry.name))?,
            ),
            Arch::Classifier(arch) => Arc::new(
                ImageClassifier::load(entry.name, arch, &weights, labels, &self.device)
                    .with_context(|| format!("loading {}", entry.name))?,
            ),
        };
        info!("{} ready", entry.name);
        Ok(model)
    }
}

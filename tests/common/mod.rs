//! Test doubles for the model zoo, image source and engine.
#![allow(dead_code)]

use anyhow::{bail, Result};
use image::DynamicImage;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use glance::model::{
    BoundingBox, CachedZoo, Classification, Detection, Engine, ImageSource, Model, ModelHandle,
    ModelQuery, ModelZoo, Prediction, Predictor,
};
use glance::{Handler, Pipeline, TaskProfile};

/// Shared call and resource counters.
#[derive(Default, Clone)]
pub struct Counters {
    pub loads: Arc<AtomicUsize>,
    pub fetches: Arc<AtomicUsize>,
    pub live_models: Arc<AtomicIsize>,
    pub live_predictors: Arc<AtomicIsize>,
    pub queries: Arc<Mutex<Vec<ModelQuery>>>,
    pub events: Arc<Mutex<Vec<&'static str>>>,
}

impl Counters {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn live_models(&self) -> isize {
        self.live_models.load(Ordering::SeqCst)
    }

    pub fn live_predictors(&self) -> isize {
        self.live_predictors.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<ModelQuery> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    fn event(&self, e: &'static str) {
        self.events.lock().unwrap().push(e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Detect,
    Classify,
    FailLoad,
    FailPredictor,
    FailPredict,
    Panic,
    EmptyClassifications,
    NanScore,
}

pub struct FakeEngine(pub &'static str);

impl Engine for FakeEngine {
    fn identity(&self) -> &str {
        self.0
    }
}

pub struct FakeModel {
    counters: Counters,
    behavior: Behavior,
}

impl Drop for FakeModel {
    fn drop(&mut self) {
        self.counters.live_models.fetch_sub(1, Ordering::SeqCst);
        self.counters.event("model released");
    }
}

impl Model for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    fn predictor(&self) -> Result<Box<dyn Predictor + '_>> {
        if self.behavior == Behavior::FailPredictor {
            bail!("predictor pool exhausted");
        }
        self.counters.live_predictors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePredictor { model: self }))
    }
}

struct FakePredictor<'a> {
    model: &'a FakeModel,
}

impl Drop for FakePredictor<'_> {
    fn drop(&mut self) {
        self.model.counters.live_predictors.fetch_sub(1, Ordering::SeqCst);
        self.model.counters.event("predictor released");
    }
}

impl Predictor for FakePredictor<'_> {
    fn predict(&mut self, image: &DynamicImage) -> Result<Prediction> {
        assert_eq!(image.width(), 8);
        match self.model.behavior {
            Behavior::Detect => Ok(Prediction::Detections(vec![
                Detection {
                    class_name: "cat".into(),
                    probability: 0.92,
                    bounding_box: BoundingBox { x: 0.1, y: 0.2, width: 0.5, height: 0.6 },
                },
                Detection {
                    class_name: "dog".into(),
                    probability: 0.41,
                    bounding_box: BoundingBox { x: 0.6, y: 0.1, width: 0.3, height: 0.3 },
                },
            ])),
            Behavior::Classify => Ok(Prediction::Classifications(vec![
                Classification { class_name: "Sushi".into(), probability: 0.83 },
                Classification { class_name: "Ramen".into(), probability: 0.11 },
            ])),
            Behavior::EmptyClassifications => Ok(Prediction::Classifications(vec![])),
            Behavior::NanScore => Ok(Prediction::Classifications(vec![
                Classification { class_name: "Sushi".into(), probability: f64::NAN },
                Classification { class_name: "Ramen".into(), probability: 0.11 },
            ])),
            Behavior::FailPredict => bail!("input shape mismatch: expected 3 channels"),
            Behavior::Panic => panic!("tensor index out of bounds"),
            Behavior::FailLoad | Behavior::FailPredictor => unreachable!(),
        }
    }
}

pub struct FakeZoo {
    counters: Counters,
    behavior: Behavior,
}

impl FakeZoo {
    pub fn new(counters: &Counters, behavior: Behavior) -> Self {
        Self { counters: counters.clone(), behavior }
    }
}

impl ModelZoo for FakeZoo {
    fn load(&self, query: &ModelQuery) -> Result<ModelHandle> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        self.counters.queries.lock().unwrap().push(query.clone());
        if self.behavior == Behavior::FailLoad {
            bail!("no model in catalog matches [{}]", query);
        }
        self.counters.live_models.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeModel {
            counters: self.counters.clone(),
            behavior: self.behavior,
        }))
    }
}

/// Serves an 8x8 image for any http(s) URL.
pub struct FakeImages {
    counters: Counters,
}

impl FakeImages {
    pub fn new(counters: &Counters) -> Self {
        Self { counters: counters.clone() }
    }
}

impl ImageSource for FakeImages {
    fn fetch(&self, url: &str) -> Result<DynamicImage> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            bail!("unsupported image url (expected http or https): {url}");
        }
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

pub fn handler(
    counters: &Counters,
    behavior: Behavior,
    profile: TaskProfile,
    engine: &'static str,
) -> Handler {
    Handler::new(Pipeline::new(
        Box::new(FakeZoo::new(counters, behavior)),
        Box::new(FakeImages::new(counters)),
        Box::new(FakeEngine(engine)),
        profile,
    ))
}

pub fn cached_handler(counters: &Counters, behavior: Behavior, profile: TaskProfile) -> Handler {
    Handler::new(Pipeline::new(
        Box::new(CachedZoo::new(FakeZoo::new(counters, behavior))),
        Box::new(FakeImages::new(counters)),
        Box::new(FakeEngine("cpu")),
        profile,
    ))
}

pub fn payload(url: &str) -> Vec<u8> {
    serde_json::json!({ "inputImageUrl": url }).to_string().into_bytes()
}

pub fn status_of(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("status")?.as_str().map(str::to_string)
}

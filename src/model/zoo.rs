use anyhow::Result;
use image::DynamicImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::prediction::{OutputKind, Prediction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Application {
    ObjectDetection,
    ImageClassification,
}

impl Application {
    pub fn as_str(&self) -> &'static str {
        match self {
            Application::ObjectDetection => "object-detection",
            Application::ImageClassification => "image-classification",
        }
    }

    /// Output kind a model of this application produces.
    pub fn output(&self) -> OutputKind {
        match self {
            Application::ObjectDetection => OutputKind::Detections,
            Application::ImageClassification => OutputKind::Classifications,
        }
    }
}

/// Capability query handed to a [`ModelZoo`]. Also the key of the
/// in-process model cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelQuery {
    pub application: Option<Application>,
    pub output: OutputKind,
    pub engine: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl ModelQuery {
    pub fn new(output: OutputKind) -> Self {
        Self {
            application: None,
            output,
            engine: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn application(mut self, application: Application) -> Self {
        self.application = Some(application);
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ModelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image -> {}", self.output)?;
        if let Some(app) = self.application {
            write!(f, ", application={}", app.as_str())?;
        }
        if let Some(engine) = &self.engine {
            write!(f, ", engine={}", engine)?;
        }
        for (k, v) in &self.filters {
            write!(f, ", {}={}", k, v)?;
        }
        Ok(())
    }
}

/// Runs inferences against one loaded model.
pub trait Predictor {
    fn predict(&mut self, image: &DynamicImage) -> Result<Prediction>;
}

/// A loaded model. Dropping the last handle frees its weights.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// The predictor borrows the model, so it is always released first.
    fn predictor(&self) -> Result<Box<dyn Predictor + '_>>;
}

pub type ModelHandle = Arc<dyn Model>;

/// Resolves a capability query into a loaded model.
pub trait ModelZoo: Send + Sync {
    fn load(&self, query: &ModelQuery) -> Result<ModelHandle>;
}

/// Keeps resolved models alive across warm invocations. Only successful
/// resolutions are cached.
pub struct CachedZoo<Z> {
    inner: Z,
    models: Mutex<HashMap<ModelQuery, ModelHandle>>,
}

impl<Z: ModelZoo> CachedZoo<Z> {
    pub fn new(inner: Z) -> Self {
        Self {
            inner,
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &Z {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Z: ModelZoo> ModelZoo for CachedZoo<Z> {
    fn load(&self, query: &ModelQuery) -> Result<ModelHandle> {
        // A panic in a previous load never left a half-inserted entry behind,
        // so a poisoned map is still consistent.
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = models.get(query) {
            debug!("model cache hit for {}", query);
            return Ok(Arc::clone(model));
        }

        info!("resolving model for {}", query);
        let model = self.inner.load(query)?;
        models.insert(query.clone(), Arc::clone(&model));
        Ok(model)
    }
}

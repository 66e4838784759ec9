use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::fault::InvokeFault;
use crate::model::hub::ENGINE_NAME;
use crate::model::{Application, Engine, ImageSource, ModelQuery, ModelZoo, OutputKind, Prediction};
use crate::request::Request;
use crate::response::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Detection,
    Classification,
}

impl Task {
    pub fn application(&self) -> Application {
        match self {
            Task::Detection => Application::ObjectDetection,
            Task::Classification => Application::ImageClassification,
        }
    }
}

impl std::str::FromStr for Task {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "detection" | "object-detection" => Ok(Task::Detection),
            "classification" | "image-classification" => Ok(Task::Classification),
            other => anyhow::bail!("unknown task: {other}"),
        }
    }
}

/// Engine identity -> backbone. Engines without an entry get the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneTable {
    entries: BTreeMap<String, String>,
    fallback: String,
}

impl BackboneTable {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with(mut self, engine: impl Into<String>, backbone: impl Into<String>) -> Self {
        self.entries.insert(engine.into(), backbone.into());
        self
    }

    /// CPU gets the lightweight detector, accelerators the heavier one.
    pub fn detection_default() -> Self {
        Self::new("yolov8m").with("cpu", "yolov8n")
    }

    pub fn set_fallback(&mut self, fallback: impl Into<String>) {
        self.fallback = fallback.into();
    }

    pub fn lookup(&self, engine: &str) -> &str {
        self.entries
            .get(engine)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

/// What to ask the zoo for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfile {
    pub task: Task,
    /// Required model engine, if any.
    pub engine: Option<String>,
    /// Static filters, e.g. `dataset`.
    pub filters: BTreeMap<String, String>,
    /// When set, adds a `backbone` filter chosen by engine identity.
    pub backbones: Option<BackboneTable>,
}

impl TaskProfile {
    pub fn detection() -> Self {
        Self {
            task: Task::Detection,
            engine: None,
            filters: BTreeMap::new(),
            backbones: Some(BackboneTable::detection_default()),
        }
    }

    pub fn classification() -> Self {
        let mut filters = BTreeMap::new();
        filters.insert("dataset".to_string(), "imagenet".to_string());
        Self {
            task: Task::Classification,
            engine: Some(ENGINE_NAME.to_string()),
            filters,
            backbones: None,
        }
    }

    pub fn for_task(task: Task) -> Self {
        match task {
            Task::Detection => Self::detection(),
            Task::Classification => Self::classification(),
        }
    }

    pub fn output(&self) -> OutputKind {
        self.task.application().output()
    }

    /// Builds the per-request query for the given engine identity.
    pub fn query(&self, engine_identity: &str) -> ModelQuery {
        let application = self.task.application();
        let mut query = ModelQuery::new(application.output()).application(application);
        if let Some(engine) = &self.engine {
            query = query.engine(engine.clone());
        }
        for (k, v) in &self.filters {
            query = query.filter(k.clone(), v.clone());
        }
        if let Some(table) = &self.backbones {
            let backbone = table.lookup(engine_identity);
            info!("engine: {}, backbone: {}", engine_identity, backbone);
            query = query.filter("backbone", backbone);
        }
        query
    }
}

/// Model Resolver & Predictor: one query, one model, one prediction.
pub struct Pipeline {
    zoo: Box<dyn ModelZoo>,
    images: Box<dyn ImageSource>,
    engine: Box<dyn Engine>,
    profile: TaskProfile,
}

impl Pipeline {
    pub fn new(
        zoo: Box<dyn ModelZoo>,
        images: Box<dyn ImageSource>,
        engine: Box<dyn Engine>,
        profile: TaskProfile,
    ) -> Self {
        Self {
            zoo,
            images,
            engine,
            profile,
        }
    }

    pub fn profile(&self) -> &TaskProfile {
        &self.profile
    }

    /// Runs the request. Panics inside the step come back as
    /// [`InvokeFault::Unexpected`]; handles are dropped while unwinding.
    pub fn run(&self, request: &Request) -> Result<Output, InvokeFault> {
        catch_unwind(AssertUnwindSafe(|| self.predict(request)))
            .unwrap_or_else(|payload| Err(InvokeFault::from_panic(payload)))
    }

    fn predict(&self, request: &Request) -> Result<Output, InvokeFault> {
        let query = self.profile.query(self.engine.identity());

        // Declaration order is release order in reverse: image, predictor, model.
        let model = self.zoo.load(&query).map_err(InvokeFault::resolution)?;
        info!("model: {}", model.name());
        let mut predictor = model.predictor().map_err(InvokeFault::prediction)?;
        let image = self
            .images
            .fetch(&request.input_image_url)
            .map_err(InvokeFault::transport)?;
        let prediction = predictor.predict(&image).map_err(InvokeFault::prediction)?;

        into_output(prediction, query.output)
    }
}

fn into_output(prediction: Prediction, expected: OutputKind) -> Result<Output, InvokeFault> {
    match (prediction, expected) {
        (Prediction::Detections(detections), OutputKind::Detections) => {
            if let Some(bad) = detections.iter().find(|d| !d.probability.is_finite()) {
                return Err(InvokeFault::Prediction(format!(
                    "model produced a non-finite probability for {}",
                    bad.class_name
                )));
            }
            info!("detections: {}", detections.len());
            Ok(Output::Detections(detections))
        }
        (Prediction::Classifications(classes), OutputKind::Classifications) => {
            if let Some(bad) = classes.iter().find(|c| !c.probability.is_finite()) {
                return Err(InvokeFault::Prediction(format!(
                    "model produced a non-finite probability for {}",
                    bad.class_name
                )));
            }
            let best = classes
                .into_iter()
                .max_by(|a, b| a.probability.total_cmp(&b.probability))
                .ok_or_else(|| {
                    InvokeFault::Prediction("model produced no classifications".into())
                })?;
            info!("classification: {} ({:.3})", best.class_name, best.probability);
            Ok(Output::Best(best))
        }
        (other, expected) => Err(InvokeFault::Prediction(format!(
            "model produced {}, expected {}",
            other.kind(),
            expected
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Classification;

    #[test]
    fn test_backbone_lookup() {
        let table = BackboneTable::detection_default();
        assert_eq!(table.lookup("cpu"), "yolov8n");
        assert_eq!(table.lookup("cuda"), "yolov8m");
        assert_eq!(table.lookup("metal"), "yolov8m");
    }

    #[test]
    fn test_backbone_table_is_configurable() {
        let mut table = BackboneTable::new("resnet50").with("TensorFlow", "mobilenet_v2");
        assert_eq!(table.lookup("TensorFlow"), "mobilenet_v2");
        assert_eq!(table.lookup("PyTorch"), "resnet50");
        table.set_fallback("yolov8s");
        assert_eq!(table.lookup("PyTorch"), "yolov8s");
    }

    #[test]
    fn test_detection_query() {
        let q = TaskProfile::detection().query("cpu");
        assert_eq!(q.application, Some(Application::ObjectDetection));
        assert_eq!(q.output, OutputKind::Detections);
        assert_eq!(q.filters.get("backbone").map(String::as_str), Some("yolov8n"));
        assert_eq!(q.engine, None);
    }

    #[test]
    fn test_classification_query() {
        let mut profile = TaskProfile::classification();
        profile.engine = Some("TFLite".into());
        profile.filters.insert("dataset".into(), "aiyDish".into());
        let q = profile.query("cuda");
        assert_eq!(q.output, OutputKind::Classifications);
        assert_eq!(q.engine.as_deref(), Some("TFLite"));
        assert_eq!(q.filters.get("dataset").map(String::as_str), Some("aiyDish"));
        assert!(!q.filters.contains_key("backbone"));
    }

    #[test]
    fn test_parse_task() {
        assert_eq!("Classification".parse::<Task>().unwrap(), Task::Classification);
        assert_eq!("object-detection".parse::<Task>().unwrap(), Task::Detection);
        assert!("segmentation".parse::<Task>().is_err());
    }

    #[test]
    fn test_into_output_picks_best() {
        let classes = vec![
            Classification { class_name: "ramen".into(), probability: 0.2 },
            Classification { class_name: "sushi".into(), probability: 0.7 },
        ];
        let out = into_output(Prediction::Classifications(classes), OutputKind::Classifications);
        assert_eq!(
            out,
            Ok(Output::Best(Classification { class_name: "sushi".into(), probability: 0.7 }))
        );
    }

    #[test]
    fn test_into_output_rejects_nan_probability() {
        let classes = vec![
            Classification { class_name: "ramen".into(), probability: f64::NAN },
            Classification { class_name: "sushi".into(), probability: 0.7 },
        ];
        let err = into_output(Prediction::Classifications(classes), OutputKind::Classifications)
            .unwrap_err();
        assert_eq!(
            err,
            InvokeFault::Prediction("model produced a non-finite probability for ramen".into())
        );

        let detections = vec![crate::model::Detection {
            class_name: "cat".into(),
            probability: f64::NAN,
            bounding_box: crate::model::BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0 },
        }];
        let err = into_output(Prediction::Detections(detections), OutputKind::Detections)
            .unwrap_err();
        assert_eq!(err.kind(), crate::fault::FaultKind::Prediction);
    }

    #[test]
    fn test_into_output_rejects_mismatch() {
        let err = into_output(Prediction::Detections(vec![]), OutputKind::Classifications)
            .unwrap_err();
        assert_eq!(
            err,
            InvokeFault::Prediction("model produced detections, expected classifications".into())
        );

        let err = into_output(Prediction::Classifications(vec![]), OutputKind::Classifications)
            .unwrap_err();
        assert_eq!(err, InvokeFault::Prediction("model produced no classifications".into()));
    }
}

pub mod artifact;
pub mod classify;
pub mod engine;
pub mod hub;
pub mod labels;
pub mod prediction;
pub mod source;
pub mod yolo;
pub mod zoo;

pub use engine::{CandleEngine, DeviceKind, Engine};
pub use hub::HubZoo;
pub use prediction::{BoundingBox, Classification, Detection, OutputKind, Prediction};
pub use source::{ImageSource, UrlImageSource};
pub use zoo::{Application, CachedZoo, Model, ModelHandle, ModelQuery, ModelZoo, Predictor};

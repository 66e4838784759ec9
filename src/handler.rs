use anyhow::Result;
use log::{error, info};
use std::io::{Read, Write};

use crate::config::Settings;
use crate::fault::{FaultKind, InvokeFault};
use crate::model::{CachedZoo, CandleEngine};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response;

/// The rendered response of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub body: String,
    /// Set when `body` is the failure envelope.
    pub fault: Option<FaultKind>,
}

/// Request Decoder -> Resolver & Predictor -> Response Encoder.
pub struct Handler {
    pipeline: Pipeline,
}

impl Handler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Wires the candle engine, the cached hub zoo and the URL image source
    /// from resolved startup settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = CandleEngine::new(settings.device)?;
        let zoo = CachedZoo::new(settings.hub_zoo(engine.device()));
        let pipeline = Pipeline::new(
            Box::new(zoo),
            Box::new(settings.image_source()),
            Box::new(engine),
            settings.profile.clone(),
        );
        Ok(Self::new(pipeline))
    }

    /// Handles one raw payload. Always yields exactly one JSON document.
    pub fn invoke(&self, payload: &[u8]) -> Invocation {
        let outcome = Request::decode(payload).and_then(|request| {
            info!("inputImageUrl: {}", request.input_image_url);
            self.pipeline.run(&request)
        });

        if let Err(fault) = &outcome {
            error!("failed to handle input: {}", String::from_utf8_lossy(payload));
            error!("{} ({})", fault, fault.kind());
        }

        Invocation {
            body: response::encode(&outcome),
            fault: outcome.err().map(|f| f.kind()),
        }
    }

    /// Renders a fault raised before the payload reached the decoder.
    pub fn reject(&self, fault: InvokeFault) -> Invocation {
        error!("{} ({})", fault, fault.kind());
        Invocation {
            body: response::failure_envelope(&fault),
            fault: Some(fault.kind()),
        }
    }

    /// Byte stream in, byte stream out. Only a broken output channel is an
    /// error here.
    pub fn handle<R: Read, W: Write>(&self, input: &mut R, output: &mut W) -> std::io::Result<()> {
        let mut payload = Vec::new();
        let invocation = match input.read_to_end(&mut payload) {
            Ok(_) => self.invoke(&payload),
            Err(e) => self.reject(InvokeFault::Decode(format!("reading payload: {e}"))),
        };
        output.write_all(invocation.body.as_bytes())?;
        output.flush()
    }
}

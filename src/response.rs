use serde::Serialize;

use crate::fault::InvokeFault;
use crate::model::{Classification, Detection};

/// A successful result as the caller sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Detections(Vec<Detection>),
    /// Best entry of the ranked classifications.
    Best(Classification),
}

/// Renders exactly one JSON document for an invocation outcome. Never fails.
pub fn encode(outcome: &Result<Output, InvokeFault>) -> String {
    match outcome {
        Ok(output) => encode_output(output),
        Err(
            fault @ (InvokeFault::Decode(_)
            | InvokeFault::Resolution(_)
            | InvokeFault::Prediction(_)
            | InvokeFault::Transport(_)
            | InvokeFault::Unexpected(_)),
        ) => failure_envelope(fault),
    }
}

fn encode_output(output: &Output) -> String {
    match serde_json::to_string_pretty(output) {
        Ok(body) => body,
        Err(e) => failure_envelope(&InvokeFault::Unexpected(format!("encoding response: {e}"))),
    }
}

/// `{"status": "invoke failed: <description>"}`
pub fn failure_envelope(fault: &InvokeFault) -> String {
    serde_json::json!({ "status": format!("invoke failed: {fault}") }).to_string()
}

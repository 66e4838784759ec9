use std::fmt;

use thiserror::Error;

/// Every way a single invocation can fail. The boundary in
/// [`crate::response`] turns each of these into the failure envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeFault {
    #[error("decode fault: {0}")]
    Decode(String),

    #[error("resolution fault: {0}")]
    Resolution(String),

    #[error("prediction fault: {0}")]
    Prediction(String),

    #[error("transport fault: {0}")]
    Transport(String),

    #[error("unexpected fault: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Decode,
    Resolution,
    Prediction,
    Transport,
    Unexpected,
}

impl InvokeFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            InvokeFault::Decode(_) => FaultKind::Decode,
            InvokeFault::Resolution(_) => FaultKind::Resolution,
            InvokeFault::Prediction(_) => FaultKind::Prediction,
            InvokeFault::Transport(_) => FaultKind::Transport,
            InvokeFault::Unexpected(_) => FaultKind::Unexpected,
        }
    }

    /// Wraps a collaborator error, keeping its whole context chain.
    pub fn resolution(err: anyhow::Error) -> Self {
        InvokeFault::Resolution(describe(&err))
    }

    pub fn prediction(err: anyhow::Error) -> Self {
        InvokeFault::Prediction(describe(&err))
    }

    pub fn transport(err: anyhow::Error) -> Self {
        InvokeFault::Transport(describe(&err))
    }

    /// Builds an unexpected fault from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        InvokeFault::Unexpected(format!("panicked: {msg}"))
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Decode => "decode",
            FaultKind::Resolution => "resolution",
            FaultKind::Prediction => "prediction",
            FaultKind::Transport => "transport",
            FaultKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

fn describe(err: &anyhow::Error) -> String {
    // `{:#}` joins the context chain: "outer: inner: root"
    let msg = format!("{err:#}");
    if msg.trim().is_empty() {
        "unknown error".to_string()
    } else {
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_description() {
        let fault = InvokeFault::Transport("connection refused".into());
        assert_eq!(fault.to_string(), "transport fault: connection refused");
        assert_eq!(fault.kind(), FaultKind::Transport);
    }

    #[test]
    fn test_context_chain_is_kept() {
        let err = anyhow::anyhow!("no such file").context("loading weights");
        let fault = InvokeFault::resolution(err);
        assert_eq!(
            fault,
            InvokeFault::Resolution("loading weights: no such file".into())
        );
    }

    #[test]
    fn test_empty_error_gets_description() {
        let fault = InvokeFault::prediction(anyhow::anyhow!(""));
        assert_eq!(fault, InvokeFault::Prediction("unknown error".into()));
    }

    #[test]
    fn test_from_panic_payloads() {
        let fault = InvokeFault::from_panic(Box::new("boom"));
        assert_eq!(fault, InvokeFault::Unexpected("panicked: boom".into()));

        let fault = InvokeFault::from_panic(Box::new(String::from("index out of range")));
        assert_eq!(
            fault,
            InvokeFault::Unexpected("panicked: index out of range".into())
        );

        let fault = InvokeFault::from_panic(Box::new(42u32));
        assert_eq!(fault.kind(), FaultKind::Unexpected);
    }
}

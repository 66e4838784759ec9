//! Serverless image inference: one image URL in, one JSON document out.

pub mod config;
pub mod fault;
pub mod handler;
pub mod model;
pub mod pipeline;
pub mod request;
pub mod response;
#[cfg(feature = "server")]
pub mod server;

pub use fault::{FaultKind, InvokeFault};
pub use handler::{Handler, Invocation};
pub use pipeline::{BackboneTable, Pipeline, Task, TaskProfile};
pub use request::Request;
pub use response::Output;

//! Error types for polyvox.
//!
//! Every error here is a build-time condition. Once a graph compiles, the
//! audio path never fails: unexpected input is ignored rather than reported.

use crate::graph::NodeId;
use crate::port::PortId;
use thiserror::Error;

/// Result type alias for polyvox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while wiring or compiling a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("invalid node")]
    InvalidNode,

    #[error("invalid port")]
    InvalidPort,

    /// An event port was wired to a stream port, or the other way round.
    #[error("port kind mismatch between edge endpoints")]
    PortKindMismatch,

    #[error("cycle detected involving {} nodes", nodes.len())]
    CycleDetected { nodes: Vec<NodeId> },

    /// More than one stream edge feeds an input that does not sum.
    #[error("input {port} of node '{node}' has multiple writers but does not sum")]
    MultipleWriters { node: String, port: PortId },

    /// The node has no path to the graph output.
    #[error("node '{name}' cannot reach the graph output")]
    Unreachable { name: String },

    #[error("no output node set")]
    NoOutput,

    #[error("graph has not been compiled")]
    NotCompiled,
}

/// Errors raised by parameter catalogue lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("parameter id {0} is not in the catalogue")]
    UnknownId(u32),

    #[error("no parameter named '{0}'")]
    UnknownName(String),
}

/// Errors raised by engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be finite and at least 8000 Hz, got {0}")]
    InvalidSampleRate(f64),

    #[error("{0} must be at least 1")]
    ZeroSized(&'static str),

    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any polyvox error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

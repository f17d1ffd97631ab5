//! # dotprobe Prelude
//!
//! The types a host integration or a probe implementation needs most often.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotprobe operations
pub use crate::Error;

/// The result type used throughout dotprobe
pub use crate::Result;

/// Metadata token type
pub use crate::token::Token;

// ================================================================================================
// Shadow Memory
// ================================================================================================

pub use crate::memory::{
    ContextId, ContextIdSource, ContextRegistry, ElementType, FixedContext, ShadowStack,
    SlotStore, SlotValue, StackFrame, StringPool,
};

// ================================================================================================
// Coverage and Session
// ================================================================================================

pub use crate::coverage::{CoverageNode, CoverageStep, CoverageTracker, ExpectedPath};

pub use crate::session::{ExceptionKind, ExecutionReport, Session, SessionConfig};

// ================================================================================================
// Protocol and Profiler Glue
// ================================================================================================

pub use crate::protocol::{
    CommandType, Deserializable, MetadataProvider, MethodBody, Protocol, Serializable, Transport,
};

pub use crate::profiler::{FunctionId, Instrumenter, ProfilerAdapter, ProfilerEvents, ThreadId};

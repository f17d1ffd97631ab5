//! Shadow memory maintained alongside the instrumented program.
//!
//! # Key Components
//!
//! - [`SlotStore`] - Typed, index-addressed table of operand values ("mem table")
//! - [`ShadowStack`] / [`StackFrame`] - Per-context mirror of the real call stack
//! - [`ContextRegistry`] - Maps execution-context ids to their shadow stacks
//! - [`StringPool`] - Interning pool for strings referenced from probes
//!
//! # Thread Safety
//!
//! A [`ShadowStack`] and the [`SlotStore`]s it owns belong to exactly one execution
//! context and are not synchronised. The [`ContextRegistry`] is owned by the session and
//! accessed through `&mut`; the host decides how calls from different threads reach it.
//! Only [`StringPool`] is shared between threads.

mod registry;
mod slot;
mod stack;
mod strings;

pub use registry::{ContextId, ContextIdSource, ContextRegistry, FixedContext};
pub use slot::{ElementType, SlotStore, SlotValue, DEFAULT_SLOT_CAPACITY};
pub use stack::{ShadowStack, StackFrame};
pub use strings::StringPool;

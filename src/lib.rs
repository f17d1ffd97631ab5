// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotprobe
//!
//! Runtime core for concolic instrumentation of .NET programs. Probes injected into the
//! target's bytecode call into this crate to record operand values, call boundaries and
//! executed offsets; the crate keeps that shadow state consistent with the real program
//! and exchanges it with an external analysis engine.
//!
//! ## Features
//!
//! - **Typed slot store** - growable index-addressed value table with type tags checked
//!   on every read
//! - **Shadow stacks** - one per execution context, frames mirroring the real call stack
//! - **Path coverage** - append-only log of visited locations with divergence detection
//!   against an expected path
//! - **Wire protocol** - framed, handshaked request/response exchange with the engine
//!
//! ## Quick Start
//!
//! ```rust
//! use dotprobe::prelude::*;
//!
//! let mut session = Session::new(FixedContext(ContextId(1)));
//! session.enter_main()?;
//!
//! let stack = session.current_stack();
//! stack.push_frame(1, Token::new(0x0600_0001));
//! let frame = stack.top_frame_mut()?;
//! let slot = frame.slots_mut().mem_i4(42);
//! assert_eq!(frame.slots().unmem_i4(slot)?, 42);
//!
//! session.add_coverage_step(0x00)?;
//! session.current_stack().pop_frame()?;
//! session.shutdown()?;
//! # Ok::<(), dotprobe::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`memory`] - slot stores, shadow stacks, the context registry and the string pool
//! - [`coverage`] - coverage nodes, expected paths and the tracker
//! - [`session`] - the per-process state object handed to every probe
//! - [`protocol`] - the engine connection
//! - [`profiler`] - forwarding of runtime profiling events into a session
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Errors fall into four classes:
//!
//! - type safety violations (wrong slot tag, empty stack) and consistency violations
//!   (leftover frames at shutdown) are fatal; [`Error::is_fatal`] reports them, and they
//!   are logged at `error` level where raised
//! - transport failures are returned from the protocol operation that hit them
//! - path divergence is not an error but a [`coverage::CoverageStep`] value
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotprobe::prelude::*;
///
/// let mut store = SlotStore::new();
/// let index = store.mem_i8(-1);
/// assert_eq!(store.read_tag(index)?, ElementType::I8);
/// # Ok::<(), dotprobe::Error>(())
/// ```
pub mod prelude;

/// Shadow memory: typed slot stores, shadow stacks and execution contexts.
///
/// # Key Types
///
/// - [`memory::SlotStore`] - index-addressed typed values
/// - [`memory::ShadowStack`] - frames of one execution context
/// - [`memory::ContextRegistry`] - context id to shadow stack mapping
/// - [`memory::StringPool`] - interned strings for the instrumenter
pub mod memory;

/// Path coverage tracking.
pub mod coverage;

/// Session state and configuration.
pub mod session;

/// Engine wire protocol.
pub mod protocol;

/// Runtime profiling event adapter.
pub mod profiler;

/// Metadata tokens.
pub mod token;

/// `dotprobe` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotprobe` Error type
///
/// # Examples
///
/// ```rust
/// use dotprobe::{memory::SlotStore, Error};
///
/// let mut store = SlotStore::new();
/// let index = store.mem_i4(7);
/// match store.unmem_i8(index) {
///     Err(e @ Error::SlotTypeMismatch { .. }) => assert!(e.is_fatal()),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub use error::Error;

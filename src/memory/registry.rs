//! Execution-context registry.
//!
//! Maps the host's execution-context identifiers (managed thread ids) to their
//! [`ShadowStack`]s. A stack is created the first time a context is observed and lives
//! until the registry is dropped.
//!
//! Probes ask for the current stack on nearly every instrumented instruction, so the
//! registry caches the last context it resolved. As long as the host keeps calling from
//! the same context, [`ContextRegistry::current_stack`] costs one comparison and no map
//! lookup.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    memory::{ShadowStack, DEFAULT_SLOT_CAPACITY},
    Error, Result,
};

/// Opaque identifier of a host execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// Supplies the id of the execution context the caller is running on.
///
/// Implemented by the host integration, typically by asking the profiling API for the
/// current managed thread. Any `Fn() -> ContextId` closure is a source.
pub trait ContextIdSource: Send + Sync {
    /// Returns the id of the calling execution context.
    fn current_context(&self) -> ContextId;
}

impl<F> ContextIdSource for F
where
    F: Fn() -> ContextId + Send + Sync,
{
    fn current_context(&self) -> ContextId {
        self()
    }
}

/// A source that always reports the same context, for single-threaded hosts.
#[derive(Debug, Clone, Copy)]
pub struct FixedContext(pub ContextId);

impl ContextIdSource for FixedContext {
    fn current_context(&self) -> ContextId {
        self.0
    }
}

/// Owner of every [`ShadowStack`] of a session.
pub struct ContextRegistry {
    source: Box<dyn ContextIdSource>,
    stacks: Vec<ShadowStack>,
    index: HashMap<ContextId, usize>,
    /// Last resolved context and the position of its stack
    cached: Option<(ContextId, usize)>,
    slot_capacity: usize,
}

impl ContextRegistry {
    /// Creates an empty registry reading context ids from `source`.
    pub fn new(source: impl ContextIdSource + 'static) -> Self {
        Self::with_slot_capacity(source, DEFAULT_SLOT_CAPACITY)
    }

    /// Creates an empty registry whose stacks reserve `slot_capacity` slots per store.
    pub fn with_slot_capacity(source: impl ContextIdSource + 'static, slot_capacity: usize) -> Self {
        ContextRegistry {
            source: Box::new(source),
            stacks: Vec::new(),
            index: HashMap::new(),
            cached: None,
            slot_capacity,
        }
    }

    /// Id of the context the caller is running on, as reported by the source.
    #[must_use]
    pub fn current_context(&self) -> ContextId {
        self.source.current_context()
    }

    /// The stack of the calling context, created on first use.
    pub fn current_stack(&mut self) -> &mut ShadowStack {
        let context = self.source.current_context();
        let position = match self.cached {
            Some((cached, position)) if cached == context => position,
            _ => {
                let position = self.resolve(context);
                self.cached = Some((context, position));
                position
            }
        };
        &mut self.stacks[position]
    }

    /// Position of the calling context among all registered contexts.
    ///
    /// Positions are dense and assigned in order of first observation, which makes them
    /// usable as small per-context tokens.
    pub fn current_ordinal(&mut self) -> usize {
        let context = self.current_stack().context();
        self.index[&context]
    }

    /// The stack of `context`, if it has been observed.
    #[must_use]
    pub fn stack(&self, context: ContextId) -> Option<&ShadowStack> {
        self.index.get(&context).map(|&position| &self.stacks[position])
    }

    /// Iterates every registered stack in order of first observation.
    pub fn stacks(&self) -> impl Iterator<Item = &ShadowStack> {
        self.stacks.iter()
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns `true` if no context has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Checks that every registered stack has no frames and empty operand memory.
    ///
    /// # Errors
    /// Returns [`Error::StackNotEmpty`] or [`Error::OperandMemoryNotEmpty`] for the first
    /// offending stack. Either means a call/return pair went untracked.
    pub fn validate_emptiness(&self) -> Result<()> {
        for stack in &self.stacks {
            if !stack.is_empty() {
                fail_loud!(Error::StackNotEmpty {
                    context: stack.context().0,
                    frames: stack.frames_count(),
                });
            }
            if !stack.opmem_is_empty() {
                fail_loud!(Error::OperandMemoryNotEmpty(stack.context().0));
            }
        }
        Ok(())
    }

    fn resolve(&mut self, context: ContextId) -> usize {
        if let Some(&position) = self.index.get(&context) {
            return position;
        }

        let position = self.stacks.len();
        self.stacks
            .push(ShadowStack::with_slot_capacity(context, self.slot_capacity));
        self.index.insert(context, position);
        debug!(context = context.0, "new execution context");
        position
    }
}

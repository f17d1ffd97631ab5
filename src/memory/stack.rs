//! Shadow call stack of one execution context.
//!
//! Every instrumented method entry pushes a [`StackFrame`] and every return (or
//! exception unwind) pops it, so the shadow stack mirrors the real one frame for frame.
//! Each frame owns a private [`SlotStore`] for the operands tracked inside that
//! activation. The stack itself additionally owns an operand memory used at call sites,
//! before the callee's frame exists.
//!
//! Only the top frame is addressable. A shadow stack is confined to the execution
//! context that owns it and needs no internal locking.

use tracing::debug;

use crate::{
    memory::{ContextId, SlotStore, DEFAULT_SLOT_CAPACITY},
    token::Token,
    Error, Result,
};

/// One activation on the shadow stack.
#[derive(Debug, Clone)]
pub struct StackFrame {
    module_token: u32,
    method_token: Token,
    last_offset: Option<u32>,
    slots: SlotStore,
}

impl StackFrame {
    fn new(module_token: u32, method_token: Token, slot_capacity: usize) -> Self {
        StackFrame {
            module_token,
            method_token,
            last_offset: None,
            slots: SlotStore::with_capacity(slot_capacity),
        }
    }

    /// Token of the module the executing method belongs to.
    #[must_use]
    pub fn module_token(&self) -> u32 {
        self.module_token
    }

    /// Resolved `MethodDef` token of the executing method.
    #[must_use]
    pub fn method_token(&self) -> Token {
        self.method_token
    }

    /// Last IL offset reported for this frame, if any.
    #[must_use]
    pub fn last_offset(&self) -> Option<u32> {
        self.last_offset
    }

    /// Records the IL offset the frame is currently executing.
    pub fn set_offset(&mut self, offset: u32) {
        self.last_offset = Some(offset);
    }

    /// Operand slots of this activation.
    #[must_use]
    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    /// Mutable operand slots of this activation.
    pub fn slots_mut(&mut self) -> &mut SlotStore {
        &mut self.slots
    }
}

/// LIFO sequence of [`StackFrame`]s for one execution context.
#[derive(Debug, Clone)]
pub struct ShadowStack {
    context: ContextId,
    frames: Vec<StackFrame>,
    opmem: SlotStore,
    ref_like_struct: Option<isize>,
    slot_capacity: usize,
}

impl ShadowStack {
    /// Creates an empty stack for `context`.
    #[must_use]
    pub fn new(context: ContextId) -> Self {
        Self::with_slot_capacity(context, DEFAULT_SLOT_CAPACITY)
    }

    /// Creates an empty stack whose slot stores reserve `slot_capacity` slots.
    #[must_use]
    pub fn with_slot_capacity(context: ContextId, slot_capacity: usize) -> Self {
        ShadowStack {
            context,
            frames: Vec::new(),
            opmem: SlotStore::with_capacity(slot_capacity),
            ref_like_struct: None,
            slot_capacity,
        }
    }

    /// The execution context this stack belongs to.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Pushes a frame for the method `method_token` of module `module_token`.
    pub fn push_frame(&mut self, module_token: u32, method_token: Token) {
        self.frames
            .push(StackFrame::new(module_token, method_token, self.slot_capacity));
        debug!(
            context = self.context.0,
            depth = self.frames.len(),
            module = module_token,
            method = %method_token,
            "push frame"
        );
    }

    /// Pops the top frame together with its slots.
    ///
    /// # Errors
    /// Returns [`Error::EmptyStack`] if there is no frame to pop; the instrumentation
    /// lost track of a call/return pair.
    pub fn pop_frame(&mut self) -> Result<StackFrame> {
        match self.frames.pop() {
            Some(frame) => {
                debug!(
                    context = self.context.0,
                    depth = self.frames.len(),
                    method = %frame.method_token,
                    "pop frame"
                );
                Ok(frame)
            }
            None => fail_loud!(Error::EmptyStack(self.context.0)),
        }
    }

    /// The top frame.
    ///
    /// # Errors
    /// Returns [`Error::EmptyStack`] if the stack has no frames.
    pub fn top_frame(&self) -> Result<&StackFrame> {
        match self.frames.last() {
            Some(frame) => Ok(frame),
            None => fail_loud!(Error::EmptyStack(self.context.0)),
        }
    }

    /// The top frame, mutably.
    ///
    /// # Errors
    /// Returns [`Error::EmptyStack`] if the stack has no frames.
    pub fn top_frame_mut(&mut self) -> Result<&mut StackFrame> {
        let context = self.context.0;
        match self.frames.last_mut() {
            Some(frame) => Ok(frame),
            None => fail_loud!(Error::EmptyStack(context)),
        }
    }

    /// Number of frames on the stack.
    #[must_use]
    pub fn frames_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the stack has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterates the frames from the bottom of the stack to the top.
    pub fn frames(&self) -> impl Iterator<Item = &StackFrame> {
        self.frames.iter()
    }

    /// Operand memory used at call sites, outside any frame.
    #[must_use]
    pub fn opmem(&self) -> &SlotStore {
        &self.opmem
    }

    /// Mutable operand memory.
    pub fn opmem_mut(&mut self) -> &mut SlotStore {
        &mut self.opmem
    }

    /// Returns `true` if the operand memory holds no values.
    #[must_use]
    pub fn opmem_is_empty(&self) -> bool {
        self.opmem.is_empty()
    }

    /// Remembers the address of the ref-like struct currently being passed around.
    pub fn mem_ref_like_struct(&mut self, address: isize) {
        self.ref_like_struct = Some(address);
    }

    /// Address last given to [`mem_ref_like_struct`](Self::mem_ref_like_struct).
    #[must_use]
    pub fn unmem_ref_like_struct(&self) -> Option<isize> {
        self.ref_like_struct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: u32 = 1;

    #[test]
    fn balanced_push_pop_leaves_stack_empty() {
        let mut stack = ShadowStack::new(ContextId(7));
        for i in 0..5 {
            stack.push_frame(MODULE, Token::new(0x0600_0001 + i));
        }
        assert_eq!(stack.frames_count(), 5);

        for i in (0..5).rev() {
            let frame = stack.pop_frame().unwrap();
            assert_eq!(frame.method_token(), Token::new(0x0600_0001 + i));
        }
        assert_eq!(stack.frames_count(), 0);
        assert!(stack.is_empty());
        assert!(stack.opmem_is_empty());
    }

    #[test]
    fn top_frame_of_empty_stack_fails() {
        let mut stack = ShadowStack::new(ContextId(3));
        assert!(matches!(stack.top_frame(), Err(Error::EmptyStack(3))));
        assert!(matches!(stack.pop_frame(), Err(Error::EmptyStack(3))));
    }

    #[test]
    fn frames_have_private_slots() {
        let mut stack = ShadowStack::new(ContextId(1));
        stack.push_frame(MODULE, Token::new(0x0600_0001));
        stack.top_frame_mut().unwrap().slots_mut().mem_i4(11);

        stack.push_frame(MODULE, Token::new(0x0600_0002));
        assert!(stack.top_frame().unwrap().slots().is_empty());
        stack.top_frame_mut().unwrap().slots_mut().mem_i8(22);

        stack.pop_frame().unwrap();
        let caller = stack.top_frame().unwrap();
        assert_eq!(caller.slots().unmem_i4(0).unwrap(), 11);
        assert_eq!(caller.slots().len(), 1);
    }

    #[test]
    fn offsets_are_tracked_per_frame() {
        let mut stack = ShadowStack::new(ContextId(1));
        stack.push_frame(MODULE, Token::new(0x0600_0001));
        assert_eq!(stack.top_frame().unwrap().last_offset(), None);
        stack.top_frame_mut().unwrap().set_offset(0x10);
        assert_eq!(stack.top_frame().unwrap().last_offset(), Some(0x10));
    }

    #[test]
    fn opmem_and_ref_like_struct() {
        let mut stack = ShadowStack::new(ContextId(1));
        stack.opmem_mut().mem_p(0x2000);
        assert!(!stack.opmem_is_empty());
        stack.opmem_mut().clear();
        assert!(stack.opmem_is_empty());

        assert_eq!(stack.unmem_ref_like_struct(), None);
        stack.mem_ref_like_struct(0x4000);
        assert_eq!(stack.unmem_ref_like_struct(), Some(0x4000));
    }
}

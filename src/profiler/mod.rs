//! Bridge between the host runtime's profiling callbacks and a [`Session`].
//!
//! The host integration receives lifecycle events from the runtime (method compilation,
//! exception unwinding, thread creation, shutdown) and forwards them through
//! [`ProfilerEvents`]. [`ProfilerAdapter`] is the implementation that keeps the session's
//! shadow state in step with those events and hands compilation to an [`Instrumenter`].
//!
//! Events the runtime can deliver but the session has no use for are accepted and
//! ignored by the default trait methods.

use tracing::{debug, trace};

use crate::{session::Session, Error, Result};

/// Runtime identifier of a function being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u64);

/// Runtime identifier of a managed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

/// Rewrites a method's bytecode before the runtime compiles it.
///
/// Any `FnMut(FunctionId, &Session) -> Result<()>` closure is an instrumenter.
pub trait Instrumenter {
    /// Instruments `function`. Called with the session's instrumentation lock held.
    ///
    /// # Errors
    /// Whatever the instrumenter fails with; it is passed back to the runtime.
    fn instrument(&mut self, function: FunctionId, session: &Session) -> Result<()>;
}

impl<F> Instrumenter for F
where
    F: FnMut(FunctionId, &Session) -> Result<()>,
{
    fn instrument(&mut self, function: FunctionId, session: &Session) -> Result<()> {
        self(function, session)
    }
}

/// Profiling events consumed by the instrumentation runtime.
#[allow(unused_variables)]
pub trait ProfilerEvents {
    /// A method is about to be compiled.
    ///
    /// # Errors
    /// Instrumentation failures.
    fn compilation_started(&mut self, function: FunctionId) -> Result<()> {
        Ok(())
    }

    /// An exception object was thrown.
    ///
    /// # Errors
    /// Implementation specific.
    fn exception_thrown(&mut self, object: u64) -> Result<()> {
        Ok(())
    }

    /// The runtime finished unwinding one function during exception dispatch.
    ///
    /// # Errors
    /// Shadow stack inconsistencies.
    fn exception_unwind_function_leave(&mut self) -> Result<()> {
        Ok(())
    }

    /// The runtime finished running an exception filter.
    ///
    /// # Errors
    /// Unsupported exception handling constructs.
    fn exception_search_filter_leave(&mut self) -> Result<()> {
        Ok(())
    }

    /// A catch handler is being entered.
    ///
    /// # Errors
    /// Implementation specific.
    fn exception_catcher_enter(&mut self, function: FunctionId, object: u64) -> Result<()> {
        Ok(())
    }

    /// A managed thread was created.
    ///
    /// # Errors
    /// Implementation specific.
    fn thread_created(&mut self, thread: ThreadId) -> Result<()> {
        Ok(())
    }

    /// A managed thread was destroyed.
    ///
    /// # Errors
    /// Implementation specific.
    fn thread_destroyed(&mut self, thread: ThreadId) -> Result<()> {
        Ok(())
    }

    /// The runtime is shutting down.
    ///
    /// # Errors
    /// Shadow state consistency failures.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Forwards profiling events into a [`Session`].
pub struct ProfilerAdapter<I: Instrumenter> {
    session: Session,
    instrumenter: I,
}

impl<I: Instrumenter> ProfilerAdapter<I> {
    /// Creates an adapter driving `session` and compiling through `instrumenter`.
    pub fn new(session: Session, instrumenter: I) -> Self {
        ProfilerAdapter {
            session,
            instrumenter,
        }
    }

    /// The driven session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The driven session, for probes.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Releases the session.
    pub fn into_session(self) -> Session {
        self.session
    }
}

impl<I: Instrumenter> ProfilerEvents for ProfilerAdapter<I> {
    fn compilation_started(&mut self, function: FunctionId) -> Result<()> {
        let _guard = self.session.instrumentation_guard()?;
        trace!(function = function.0, "compilation started");
        self.instrumenter.instrument(function, &self.session)
    }

    fn exception_thrown(&mut self, object: u64) -> Result<()> {
        debug!(object, "exception thrown");
        Ok(())
    }

    fn exception_unwind_function_leave(&mut self) -> Result<()> {
        if !self.session.is_main_entered() {
            return Ok(());
        }

        let stack = self.session.current_stack();
        if stack.frames_count() == 1 {
            debug!("unwinding out of the entry point");
        }
        let frame = stack.pop_frame()?;
        debug!(method = %frame.method_token(), "frame unwound");
        Ok(())
    }

    fn exception_search_filter_leave(&mut self) -> Result<()> {
        if self.session.is_main_entered() {
            fail_loud!(Error::NotSupported("exception filters"));
        }
        Ok(())
    }

    fn thread_created(&mut self, thread: ThreadId) -> Result<()> {
        debug!(thread = thread.0, "thread created");
        Ok(())
    }

    fn thread_destroyed(&mut self, thread: ThreadId) -> Result<()> {
        debug!(thread = thread.0, "thread destroyed");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.session.shutdown()
    }
}

//! Session state shared by the probes and the host integration.
//!
//! A [`Session`] owns everything the instrumentation runtime keeps between probe
//! calls: the [`ContextRegistry`] of shadow stacks, the [`CoverageTracker`], the debug
//! [`StringPool`], the exception register and the lifecycle flags. The host creates one
//! per instrumented process and passes it to every probe; nothing lives in globals.
//!
//! # Concurrency
//!
//! Lifecycle flags are atomics and can be flipped through a shared reference. Probe
//! operations that touch shadow stacks or coverage take `&mut self`: per-context state
//! is meant to be driven by one host thread per context, and a host running several
//! threads puts the session behind its own lock. [`Session::instrumentation_guard`]
//! serializes compilation-time instrumentation independently of that.
//!
//! # Example
//!
//! ```rust
//! use dotprobe::memory::{ContextId, FixedContext};
//! use dotprobe::session::{Session, SessionConfig};
//! use dotprobe::token::Token;
//!
//! let mut session = Session::with_config(FixedContext(ContextId(1)), SessionConfig::debug());
//! session.enter_main()?;
//!
//! session.current_stack().push_frame(1, Token::new(0x0600_0001));
//! assert!(session.add_coverage_step(0x00)?.is_accepted());
//! session.current_stack().pop_frame()?;
//!
//! session.main_left();
//! session.shutdown()?;
//! # Ok::<(), dotprobe::Error>(())
//! ```

mod config;
mod exception;
mod report;

pub use config::SessionConfig;
pub use exception::{ExceptionKind, ExceptionRegister};
pub use report::ExecutionReport;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use tracing::{debug, warn};

use crate::{
    coverage::{CoverageNode, CoverageStep, CoverageTracker, ExpectedPath},
    memory::{ContextIdSource, ContextRegistry, ShadowStack, StackFrame, StringPool},
    Error, Result,
};

/// Runtime state of one instrumented process.
pub struct Session {
    config: SessionConfig,
    registry: ContextRegistry,
    tracker: CoverageTracker,
    strings: StringPool,
    exception: ExceptionRegister,
    main_entered: AtomicBool,
    main_left: AtomicBool,
    instrumenting: AtomicBool,
    lock: Mutex<()>,
}

impl Session {
    /// Creates a session with the default configuration.
    pub fn new(source: impl ContextIdSource + 'static) -> Self {
        Self::with_config(source, SessionConfig::default())
    }

    /// Creates a session reading context ids from `source`.
    pub fn with_config(source: impl ContextIdSource + 'static, config: SessionConfig) -> Self {
        Session {
            registry: ContextRegistry::with_slot_capacity(source, config.initial_slot_capacity),
            tracker: CoverageTracker::new(),
            strings: StringPool::new(),
            exception: ExceptionRegister::default(),
            main_entered: AtomicBool::new(false),
            main_left: AtomicBool::new(false),
            instrumenting: AtomicBool::new(true),
            lock: Mutex::new(()),
            config,
        }
    }

    /// The configuration this session was created with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // Lifecycle

    /// Marks the entry point as entered.
    ///
    /// # Errors
    /// Returns [`Error::InstrumentationState`] if it was entered already.
    pub fn enter_main(&self) -> Result<()> {
        if self
            .main_entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            fail_loud!(Error::InstrumentationState("entry point entered twice"));
        }
        debug!("entered main");
        Ok(())
    }

    /// Returns `true` once [`enter_main`](Self::enter_main) succeeded.
    #[must_use]
    pub fn is_main_entered(&self) -> bool {
        self.main_entered.load(Ordering::Acquire)
    }

    /// Marks the entry point as returned.
    pub fn main_left(&self) {
        self.main_left.store(true, Ordering::Release);
        debug!("left main");
    }

    /// Returns `true` once [`main_left`](Self::main_left) was called.
    #[must_use]
    pub fn is_main_left(&self) -> bool {
        self.main_left.load(Ordering::Acquire)
    }

    /// Turns instrumentation of newly compiled methods back on.
    ///
    /// A new session starts with instrumentation enabled.
    pub fn enable_instrumentation(&self) {
        if self.instrumenting.swap(true, Ordering::AcqRel) {
            warn!("instrumentation enabled twice");
        }
    }

    /// Turns instrumentation of newly compiled methods off.
    pub fn disable_instrumentation(&self) {
        if !self.instrumenting.swap(false, Ordering::AcqRel) {
            warn!("instrumentation disabled twice");
        }
    }

    /// Returns `true` while instrumentation is enabled.
    #[must_use]
    pub fn instrumenting_enabled(&self) -> bool {
        self.instrumenting.load(Ordering::Acquire)
    }

    /// Serializes compilation-time instrumentation for as long as the guard lives.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a previous holder panicked.
    pub fn instrumentation_guard(&self) -> Result<MutexGuard<'_, ()>> {
        Ok(lock!(self.lock))
    }

    // Exceptions

    /// Records a thrown exception object.
    pub fn throw_exception(&mut self, object: u64, concrete: bool) {
        debug!(object, concrete, "exception thrown");
        self.exception.throw(object, concrete);
    }

    /// Marks the current exception as caught.
    pub fn catch_exception(&mut self) {
        self.exception.catch();
    }

    /// Marks the run as ended by an unhandled exception.
    pub fn terminate_by_exception(&mut self) {
        self.exception.terminate();
    }

    /// Returns `true` if the run ended by an unhandled exception.
    #[must_use]
    pub fn is_terminated_by_exception(&self) -> bool {
        self.exception.is_terminated()
    }

    /// `(kind, object, concrete)` of the last exception.
    #[must_use]
    pub fn exception_register(&self) -> (ExceptionKind, u64, bool) {
        self.exception.get()
    }

    // Shadow state

    /// The shadow stack of the calling context.
    pub fn current_stack(&mut self) -> &mut ShadowStack {
        self.registry.current_stack()
    }

    /// The top frame of the calling context.
    ///
    /// # Errors
    /// Returns [`Error::EmptyStack`] if the context has no frames.
    pub fn top_frame(&mut self) -> Result<&mut StackFrame> {
        self.registry.current_stack().top_frame_mut()
    }

    /// All shadow stacks.
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Checks that every shadow stack and operand memory is empty.
    ///
    /// # Errors
    /// See [`ContextRegistry::validate_emptiness`].
    pub fn validate_stack_emptiness(&self) -> Result<()> {
        self.registry.validate_emptiness()
    }

    // Coverage

    /// Installs the path the engine expects this run to follow.
    pub fn set_expected_coverage(&mut self, path: Option<ExpectedPath>) {
        self.tracker.set_expected_coverage(path);
    }

    /// Records that the calling context reached `offset` in its top frame's method.
    ///
    /// # Errors
    /// Returns [`Error::EmptyStack`] if the context has no frames. Path divergence is
    /// not an error; it is reported as [`CoverageStep::Diverged`].
    pub fn add_coverage_step(&mut self, offset: u32) -> Result<CoverageStep> {
        let context_token = if self.config.track_context_tokens {
            i32::try_from(self.registry.current_ordinal()).unwrap_or(i32::MAX)
        } else {
            0
        };

        let frame = self.registry.current_stack().top_frame_mut()?;
        frame.set_offset(offset);
        let node = CoverageNode::new(
            frame.module_token(),
            frame.method_token(),
            offset,
            context_token,
        );
        Ok(self.tracker.record_step(node))
    }

    /// Coverage nodes appended since the previous flush.
    pub fn flush_new_coverage(&mut self) -> &[CoverageNode] {
        self.tracker.flush_new_nodes()
    }

    /// The coverage tracker.
    #[must_use]
    pub fn coverage(&self) -> &CoverageTracker {
        &self.tracker
    }

    /// Flushes new coverage and packs it with the exception register and lifecycle
    /// flags, ready to be sent with the execute command.
    pub fn execution_report(&mut self) -> ExecutionReport {
        let (exception_kind, exception_object, exception_concrete) = self.exception.get();
        ExecutionReport {
            exception_kind,
            exception_object,
            exception_concrete,
            terminated_by_exception: self.exception.is_terminated(),
            main_left: self.is_main_left(),
            new_coverage: self.tracker.flush_new_nodes().to_vec(),
        }
    }

    // Strings

    /// Interns `s` and returns its pool index, or `None` when interning is off.
    pub fn intern_string(&self, s: impl Into<String>) -> Option<u32> {
        self.config.intern_strings.then(|| self.strings.allocate(s))
    }

    /// The string interned at `index`.
    #[must_use]
    pub fn string(&self, index: u32) -> Option<String> {
        self.strings.get(index)
    }

    /// Ends the session, validating shadow state if configured to.
    ///
    /// # Errors
    /// See [`validate_stack_emptiness`](Self::validate_stack_emptiness).
    pub fn shutdown(&self) -> Result<()> {
        debug!(
            contexts = self.registry.len(),
            nodes = self.tracker.nodes().len(),
            "session shutdown"
        );
        if self.config.validate_on_shutdown {
            self.validate_stack_emptiness()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{ContextId, FixedContext},
        test::switchable_context,
        token::Token,
    };
    use std::sync::atomic::Ordering;

    const MAIN: Token = Token::new(0x0600_0001);

    fn session() -> Session {
        Session::new(FixedContext(ContextId(7)))
    }

    #[test]
    fn main_can_be_entered_once() {
        let session = session();
        assert!(!session.is_main_entered());
        session.enter_main().unwrap();
        assert!(session.is_main_entered());

        let err = session.enter_main().unwrap_err();
        assert!(matches!(err, Error::InstrumentationState(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn instrumentation_toggles() {
        let session = session();
        assert!(session.instrumenting_enabled());
        session.disable_instrumentation();
        session.disable_instrumentation();
        assert!(!session.instrumenting_enabled());
        session.enable_instrumentation();
        assert!(session.instrumenting_enabled());
    }

    #[test]
    fn new_session_instruments_by_default() {
        let session = Session::with_config(FixedContext(ContextId(1)), SessionConfig::release());
        assert!(session.instrumenting_enabled());
        assert!(!session.is_main_entered());
    }

    #[test]
    fn guard_is_exclusive() {
        let session = session();
        let guard = session.instrumentation_guard().unwrap();
        assert!(session.lock.try_lock().is_err());
        drop(guard);
        assert!(session.lock.try_lock().is_ok());
    }

    #[test]
    fn coverage_resolves_top_frame() {
        let mut session = session();
        session.current_stack().push_frame(2, MAIN);
        session.add_coverage_step(0x10).unwrap();

        assert_eq!(
            session.coverage().last(),
            Some(&CoverageNode::new(2, MAIN, 0x10, 0))
        );
        assert_eq!(session.top_frame().unwrap().last_offset(), Some(0x10));
    }

    #[test]
    fn coverage_needs_a_frame() {
        let mut session = session();
        assert!(matches!(
            session.add_coverage_step(0),
            Err(Error::EmptyStack(7))
        ));
    }

    #[test]
    fn context_tokens() {
        let (current, source) = switchable_context(1);
        let mut session = Session::with_config(
            source,
            SessionConfig::debug().with_track_context_tokens(true),
        );

        session.current_stack().push_frame(1, MAIN);
        session.add_coverage_step(0).unwrap();
        current.store(2, Ordering::Relaxed);
        session.current_stack().push_frame(1, MAIN);
        session.add_coverage_step(0).unwrap();

        let contexts: Vec<i32> = session
            .coverage()
            .nodes()
            .iter()
            .map(|n| n.context_token)
            .collect();
        assert_eq!(contexts, vec![0, 1]);
    }

    #[test]
    fn exception_register() {
        let mut session = session();
        session.throw_exception(0x40, true);
        session.catch_exception();
        assert_eq!(
            session.exception_register(),
            (ExceptionKind::Caught, 0x40, true)
        );
        assert!(!session.is_terminated_by_exception());
        session.terminate_by_exception();
        assert!(session.is_terminated_by_exception());
    }

    #[test]
    fn report_flushes_coverage() {
        let mut session = session();
        session.current_stack().push_frame(1, MAIN);
        session.add_coverage_step(0).unwrap();
        session.add_coverage_step(2).unwrap();
        session.main_left();

        let report = session.execution_report();
        assert_eq!(report.new_coverage.len(), 2);
        assert!(report.main_left);
        assert!(session.execution_report().new_coverage.is_empty());
        assert_eq!(session.coverage().nodes().len(), 2);
    }

    #[test]
    fn shutdown_validation_follows_config() {
        let mut strict = session();
        strict.current_stack().push_frame(1, MAIN);
        assert!(matches!(
            strict.shutdown(),
            Err(Error::StackNotEmpty { context: 7, frames: 1 })
        ));

        let mut lenient = Session::with_config(FixedContext(ContextId(7)), SessionConfig::release());
        lenient.current_stack().push_frame(1, MAIN);
        lenient.shutdown().unwrap();
        assert!(lenient.validate_stack_emptiness().is_err());
    }

    #[test]
    fn string_interning() {
        let session = session();
        let index = session.intern_string("System.Console").unwrap();
        assert_eq!(session.string(index).as_deref(), Some("System.Console"));

        let off = Session::with_config(FixedContext(ContextId(1)), SessionConfig::release());
        assert_eq!(off.intern_string("x"), None);
    }
}

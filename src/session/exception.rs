use strum::{EnumCount, EnumIter};

/// State of the most recent exception observed by the probes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, EnumCount, strum::Display,
)]
#[repr(u8)]
pub enum ExceptionKind {
    /// Nothing was thrown, or the last exception was cleared.
    #[default]
    NoException = 1,
    /// An exception was thrown and has not been caught yet.
    Unhandled = 2,
    /// The last thrown exception reached a catch handler.
    Caught = 3,
}

/// The exception register of a session.
///
/// Holds the object of the last thrown exception, whether that object is concrete (as
/// opposed to symbolic on the engine side), and its handling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRegister {
    kind: ExceptionKind,
    object: u64,
    concrete: bool,
    terminated: bool,
}

impl Default for ExceptionRegister {
    fn default() -> Self {
        ExceptionRegister {
            kind: ExceptionKind::NoException,
            object: 0,
            concrete: true,
            terminated: false,
        }
    }
}

impl ExceptionRegister {
    /// Records a thrown exception object.
    pub fn throw(&mut self, object: u64, concrete: bool) {
        self.kind = ExceptionKind::Unhandled;
        self.object = object;
        self.concrete = concrete;
    }

    /// Marks the current exception as caught. The object stays in the register.
    pub fn catch(&mut self) {
        self.kind = ExceptionKind::Caught;
    }

    /// Marks the run as ended by an exception.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Returns `true` once [`terminate`](Self::terminate) was called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Handling state of the last exception.
    #[must_use]
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// `(kind, object, concrete)` of the last exception.
    #[must_use]
    pub fn get(&self) -> (ExceptionKind, u64, bool) {
        (self.kind, self.object, self.concrete)
    }
}

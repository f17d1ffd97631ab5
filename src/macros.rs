#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let _guard = lock!(self.instrumentation_lock);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Logs a fatal error at `error` level and returns it from the enclosing function.
///
/// Used for conditions that mean the instrumentation lost track of the program
/// (wrong slot tag, unbalanced call/return). These must never be swallowed.
///
/// ```rust, ignore
///  if frames != 0 {
///      fail_loud!(Error::StackNotEmpty { context, frames });
///  }
/// ```
macro_rules! fail_loud {
    ($err:expr) => {{
        let err: crate::Error = $err;
        tracing::error!("{}", err);
        return Err(err);
    }};
}

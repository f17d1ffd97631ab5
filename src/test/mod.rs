use std::{
    io::{self, Cursor, Read, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    memory::{ContextId, ContextIdSource},
    protocol::Transport,
};

/// In-memory transport: reads come from a fixed input, writes are collected.
#[derive(Default)]
pub struct MockTransport {
    input: Cursor<Vec<u8>>,
    pub written: Vec<u8>,
}

impl MockTransport {
    pub fn with_input(input: Vec<u8>) -> Self {
        MockTransport {
            input: Cursor::new(input),
            ..Default::default()
        }
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Helper function to create a context source that tests can switch between contexts
pub fn switchable_context(initial: u64) -> (Arc<AtomicU64>, impl ContextIdSource) {
    let current = Arc::new(AtomicU64::new(initial));
    let source = {
        let current = Arc::clone(&current);
        move || ContextId(current.load(Ordering::Relaxed))
    };
    (current, source)
}

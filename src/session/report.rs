use crate::{
    coverage::CoverageNode,
    protocol::{io::write_ne, Deserializable, Parser, Serializable},
    session::ExceptionKind,
    Result,
};

/// What the host tells the engine at an execution step.
///
/// Encoded as `[uint8 kind][uint64 object][uint8 concrete][uint8 terminated]`
/// `[uint8 mainLeft][int32 count][count coverage nodes]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Handling state of the last exception
    pub exception_kind: ExceptionKind,
    /// Object of the last thrown exception
    pub exception_object: u64,
    /// Whether the exception object is concrete
    pub exception_concrete: bool,
    /// Whether the run ended with an unhandled exception
    pub terminated_by_exception: bool,
    /// Whether the entry point has returned
    pub main_left: bool,
    /// Coverage nodes appended since the previous report
    pub new_coverage: Vec<CoverageNode>,
}

impl Serializable for ExecutionReport {
    fn serialize(&self, out: &mut Vec<u8>) {
        write_ne(out, self.exception_kind as u8);
        write_ne(out, self.exception_object);
        write_ne(out, u8::from(self.exception_concrete));
        write_ne(out, u8::from(self.terminated_by_exception));
        write_ne(out, u8::from(self.main_left));
        self.new_coverage.serialize(out);
    }
}

impl Deserializable for ExecutionReport {
    fn deserialize(parser: &mut Parser<'_>) -> Result<Self> {
        let exception_kind = match parser.read_ne::<u8>()? {
            1 => ExceptionKind::NoException,
            2 => ExceptionKind::Unhandled,
            3 => ExceptionKind::Caught,
            other => return Err(malformed_error!("Invalid exception kind - {}", other)),
        };

        Ok(ExecutionReport {
            exception_kind,
            exception_object: parser.read_ne()?,
            exception_concrete: parser.read_ne::<u8>()? != 0,
            terminated_by_exception: parser.read_ne::<u8>()? != 0,
            main_left: parser.read_ne::<u8>()? != 0,
            new_coverage: Vec::deserialize(parser)?,
        })
    }
}

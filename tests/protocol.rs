//! Integration tests for the engine connection over a real loopback socket.
//!
//! Each test spawns a thread playing the engine side with a second [`Protocol`] on the
//! accepted stream, so both directions go through the same framing code.

use dotprobe::{
    prelude::*,
    protocol::{ExceptionClause, ExceptionHandlerFlags},
};
use std::{
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

const ENTRY: Token = Token::new(0x0600_0001);

/// Host side metadata, answering engine queries from fixed tables.
struct Metadata;

impl MetadataProvider for Metadata {
    fn method_body(&mut self, method: Token) -> Result<MethodBody> {
        if method != ENTRY {
            return Err(Error::Unresolved(method));
        }
        let clause = ExceptionClause {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 4,
            handler_offset: 4,
            handler_length: 1,
            class_token_or_filter_offset: 0,
        };
        Ok(MethodBody::new(vec![0x00, 0x00, 0x00, 0xDD, 0xDC, 0x2A], 1, &[clause]))
    }

    fn user_string(&mut self, _token: Token) -> Result<String> {
        Ok("Hello, Welt".to_string())
    }

    fn type_info_from_method(&mut self, _method: Token) -> Result<Vec<Token>> {
        Ok(vec![Token::new(0x0100_0001), Token::new(0x0200_0003)])
    }

    fn type_token_from_type_ref(&mut self, _type_ref: Token) -> Result<Token> {
        Ok(Token::new(0x0200_0003))
    }

    fn type_token_from_type_spec(&mut self, _type_spec: Token) -> Result<Token> {
        Ok(Token::new(0x0200_0004))
    }
}

fn spawn_engine<F>(engine: F) -> Result<(TcpStream, JoinHandle<Result<()>>)>
where
    F: FnOnce(Protocol<TcpStream>) -> Result<()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let handle = thread::spawn(move || -> Result<()> {
        let (stream, _) = listener.accept()?;
        engine(Protocol::new(stream))
    });
    Ok((TcpStream::connect(addr)?, handle))
}

fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle.join().expect("engine thread panicked")
}

#[test]
fn test_handshake_and_session_start() -> Result<()> {
    let probes = vec![Token::new(0x0A00_0001), Token::new(0x0A00_0002)];
    let expected = probes.clone();

    let (stream, engine) = spawn_engine(move |mut engine| {
        engine.handshake()?;
        let received = Vec::<Token>::from_bytes(&engine.read_buffer()?)?;
        assert_eq!(received, expected);
        engine.write_confirmation()?;
        engine.write_buffer(&ENTRY.to_bytes())
    })?;

    let mut host = Protocol::new(stream);
    host.start_session(&probes)?;
    let entry = Token::from_bytes(&host.accept_entry_point()?)?;
    assert_eq!(entry, ENTRY);

    join(engine)?;
    host.shutdown()
}

#[test]
fn test_handshake_mismatch_aborts() -> Result<()> {
    let (stream, engine) = spawn_engine(|mut engine| {
        engine.read_buffer()?;
        engine.send_command(CommandType::ExecuteCommand)
    })?;

    let mut host = Protocol::new(stream);
    assert!(matches!(
        host.handshake(),
        Err(Error::HandshakeFailed {
            expected: 0x55,
            actual: 0x57
        })
    ));
    join(engine)
}

#[test]
fn test_instrumentation_with_engine_queries() -> Result<()> {
    let (stream, engine) = spawn_engine(|mut engine| {
        engine.handshake()?;
        assert_eq!(engine.accept_command()?, CommandType::InstrumentCommand);
        let method = Token::from_bytes(&engine.read_buffer()?)?;

        engine.send_command(CommandType::ReadMethodBody)?;
        engine.send_token(method)?;
        let original = engine.accept_method_body()?;
        assert_eq!(original.clauses()?.len(), 1);

        engine.send_command(CommandType::ReadString)?;
        engine.send_token(Token::new(0x7000_0001))?;
        assert_eq!(engine.accept_wstring()?.to_string_lossy(), "Hello, Welt");

        engine.send_command(CommandType::ParseTypeInfoFromMethod)?;
        engine.send_token(method)?;
        assert_eq!(engine.accept_type_info()?.len(), 2);

        engine.send_command(CommandType::GetTypeTokenFromTypeRef)?;
        engine.send_token(Token::new(0x0100_0001))?;
        assert_eq!(engine.accept_token()?, Token::new(0x0200_0003));

        engine.send_command(CommandType::GetTypeTokenFromTypeSpec)?;
        engine.send_token(Token::new(0x1B00_0001))?;
        assert_eq!(engine.accept_token()?, Token::new(0x0200_0004));

        // Reply: the original body with a probe call prepended
        let mut il = vec![0x28, 0x01, 0x00, 0x00, 0x0A];
        il.extend_from_slice(&original.il);
        engine.send_command(CommandType::InstrumentCommand)?;
        engine.send_method_body(&MethodBody {
            il,
            max_stack_size: original.max_stack_size + 1,
            exception_handlers: original.exception_handlers,
        })
    })?;

    let mut host = Protocol::new(stream);
    host.handshake()?;
    let body = host.instrument(&ENTRY, &mut Metadata)?;
    assert_eq!(body.il.len(), 11);
    assert_eq!(body.max_stack_size, 2);
    assert_eq!(body.clauses()?[0].flags, ExceptionHandlerFlags::FINALLY);

    join(engine)?;
    host.shutdown()
}

#[test]
fn test_execute_ships_coverage_report() -> Result<()> {
    let (stream, engine) = spawn_engine(|mut engine| {
        engine.handshake()?;
        assert_eq!(engine.accept_command()?, CommandType::ExecuteCommand);
        let report: ExecutionReport = engine.accept_serializable()?;
        assert_eq!(report.new_coverage.len(), 2);
        assert!(!report.main_left);

        let next = ExpectedPath::new(report.new_coverage);
        engine.send_command(CommandType::ExecuteCommand)?;
        engine.write_buffer(&next.to_bytes())
    })?;

    let mut session = Session::new(FixedContext(ContextId(1)));
    session.current_stack().push_frame(1, ENTRY);
    session.add_coverage_step(0)?;
    session.add_coverage_step(3)?;

    let mut host = Protocol::new(stream);
    host.handshake()?;
    let answer = host.execute(&session.execution_report(), &mut Metadata)?;
    let expected = ExpectedPath::from_bytes(&answer)?;
    assert_eq!(expected.nodes(), session.coverage().nodes());

    join(engine)?;
    host.shutdown()
}

#[test]
fn test_unresolved_query_surfaces_to_host() -> Result<()> {
    let (stream, engine) = spawn_engine(|mut engine| {
        engine.handshake()?;
        engine.accept_command()?;
        engine.read_buffer()?;
        engine.send_command(CommandType::ReadMethodBody)?;
        engine.send_token(Token::new(0x0600_0099))
    })?;

    let mut host = Protocol::new(stream);
    host.handshake()?;
    assert!(matches!(
        host.instrument(&Token::new(0x0600_0099), &mut Metadata),
        Err(Error::Unresolved(_))
    ));
    join(engine)
}

#[test]
fn test_closed_peer_is_transport_error() -> Result<()> {
    let (stream, engine) = spawn_engine(|engine| engine.shutdown())?;
    join(engine)?;

    let mut host = Protocol::new(stream);
    assert!(matches!(host.accept_command(), Err(Error::Io(_))));
    Ok(())
}

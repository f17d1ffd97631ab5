//! Framed request/response channel to the analysis engine.
//!
//! # Framing
//!
//! | Element | Encoding |
//! |---------|----------|
//! | command / confirmation | one-byte buffer: `int32 1` followed by the command byte |
//! | buffer | `int32 count` (native-endian) followed by `count` bytes |
//! | token, count, index | raw native-endian 32-bit integer |
//! | method body | `buffer il` `uint32 maxStackSize` `buffer exceptionHandlers` |
//!
//! # Session
//!
//! `connect` → [`Protocol::handshake`] → repeated (command, payload, reply) →
//! [`Protocol::shutdown`]. The handshake sends the confirmation byte and waits for the
//! engine to send it back.
//!
//! While the host waits for the reply to an [`CommandType::InstrumentCommand`] or
//! [`CommandType::ExecuteCommand`], the engine may send queries of its own
//! ([`CommandType::is_query`]). They are answered through a [`MetadataProvider`]. The
//! reply proper is announced by the engine echoing the request's command byte.
//!
//! # Failure
//!
//! Every operation returns a [`Result`]. A failed read or write aborts that exchange
//! step only; there is no retry, and the channel should be considered out of sync.
//! I/O is blocking with no timeout; a stalled engine stalls the caller.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use tracing::debug;
use widestring::{U16Str, U16String};

use crate::{
    protocol::{
        io::{read_ne, wire_count},
        CommandType, Deserializable, MethodBody, Parser, Serializable,
    },
    token::Token,
    Error, Result,
};

/// A byte stream the protocol can run over.
pub trait Transport: Read + Write {
    /// Closes the stream in both directions.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Answers the queries the engine sends while it prepares a reply.
///
/// Implemented by the host integration on top of the runtime's metadata API.
pub trait MetadataProvider {
    /// The original body of `method`.
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the method has no body.
    fn method_body(&mut self, method: Token) -> Result<MethodBody>;

    /// The user string referenced by `token`.
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the token names no string.
    fn user_string(&mut self, token: Token) -> Result<String>;

    /// Type tokens mentioned by the signature of `method`.
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the method cannot be found.
    fn type_info_from_method(&mut self, method: Token) -> Result<Vec<Token>>;

    /// The type a `TypeRef` resolves to.
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the reference cannot be resolved.
    fn type_token_from_type_ref(&mut self, type_ref: Token) -> Result<Token>;

    /// The type token a `TypeSpec` stands for.
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the specification cannot be resolved.
    fn type_token_from_type_spec(&mut self, type_spec: Token) -> Result<Token>;
}

/// Client end of the engine connection.
pub struct Protocol<T: Transport> {
    transport: T,
}

impl Protocol<TcpStream> {
    /// Connects to an engine listening on `addr` and performs the handshake.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the connection cannot be made and
    /// [`Error::HandshakeFailed`] if the engine does not confirm.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let mut protocol = Protocol::new(stream);
        protocol.handshake()?;
        Ok(protocol)
    }
}

impl<T: Transport> Protocol<T> {
    /// Wraps an already connected transport. No bytes are exchanged.
    pub fn new(transport: T) -> Self {
        Protocol { transport }
    }

    /// The underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Releases the underlying transport without closing it.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn read_count(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.transport.read_exact(&mut bytes)?;
        read_ne(&bytes)
    }

    fn write_count(&mut self, count: i32) -> Result<()> {
        self.transport.write_all(&count.to_ne_bytes())?;
        Ok(())
    }

    /// Reads one count-prefixed buffer.
    ///
    /// # Errors
    /// Returns [`Error::Io`] on transport failure or a short read, and
    /// [`Error::Malformed`] for a negative count.
    pub fn read_buffer(&mut self) -> Result<Vec<u8>> {
        let count = self.read_count()?;
        let Ok(length) = usize::try_from(count) else {
            return Err(malformed_error!("Negative buffer length - {}", count));
        };

        // Grows with the bytes that actually arrive, not with the announced count
        let mut buffer = Vec::new();
        (&mut self.transport)
            .take(length as u64)
            .read_to_end(&mut buffer)?;
        if buffer.len() != length {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("buffer announced {length} bytes, stream ended after {}", buffer.len()),
            )));
        }
        Ok(buffer)
    }

    /// Writes one count-prefixed buffer.
    ///
    /// # Errors
    /// Returns [`Error::Io`] on transport failure and [`Error::Malformed`] if the
    /// buffer is too large for an `int32` count.
    pub fn write_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        let count = wire_count(buffer.len())?;
        self.write_count(count)?;
        self.transport.write_all(buffer)?;
        self.transport.flush()?;
        Ok(())
    }

    fn read_command_byte(&mut self) -> Result<u8> {
        let buffer = self.read_buffer()?;
        match buffer.as_slice() {
            [byte] => Ok(*byte),
            other => Err(malformed_error!(
                "Command buffer must hold one byte, got {}",
                other.len()
            )),
        }
    }

    /// Waits for the confirmation byte.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedCommand`] if any other byte arrives.
    pub fn read_confirmation(&mut self) -> Result<()> {
        let byte = self.read_command_byte()?;
        if byte != CommandType::Confirmation.byte() {
            return Err(Error::UnexpectedCommand {
                expected: CommandType::Confirmation.byte(),
                actual: byte,
            });
        }
        Ok(())
    }

    /// Sends the confirmation byte.
    ///
    /// # Errors
    /// Returns [`Error::Io`] on transport failure.
    pub fn write_confirmation(&mut self) -> Result<()> {
        self.send_command(CommandType::Confirmation)
    }

    /// Exchanges confirmation bytes with the engine.
    ///
    /// # Errors
    /// Returns [`Error::HandshakeFailed`] if the engine answers with anything but the
    /// confirmation byte.
    pub fn handshake(&mut self) -> Result<()> {
        self.write_confirmation()?;
        match self.read_confirmation() {
            Err(Error::UnexpectedCommand { expected, actual }) => {
                Err(Error::HandshakeFailed { expected, actual })
            }
            result => {
                debug!("handshake complete");
                result
            }
        }
    }

    /// Handshakes, then ships the probe table and waits for the engine to accept it.
    ///
    /// # Errors
    /// Any handshake or transport failure.
    pub fn start_session<S: Serializable + ?Sized>(&mut self, probes: &S) -> Result<()> {
        self.handshake()?;
        self.write_buffer(&probes.to_bytes())?;
        self.read_confirmation()?;
        debug!("session started");
        Ok(())
    }

    /// Receives the serialized entry point the engine wants executed.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn accept_entry_point(&mut self) -> Result<Vec<u8>> {
        self.read_buffer()
    }

    /// Receives a command byte.
    ///
    /// # Errors
    /// Returns [`Error::UnknownCommand`] for bytes outside the command set.
    pub fn accept_command(&mut self) -> Result<CommandType> {
        let command = CommandType::try_from(self.read_command_byte()?)?;
        debug!(%command, "accepted command");
        Ok(command)
    }

    /// Sends a bare command byte.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_command(&mut self, command: CommandType) -> Result<()> {
        self.write_buffer(&[command.byte()])
    }

    /// Receives a UTF-8 string; trailing NULs are dropped.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for invalid UTF-8.
    pub fn accept_string(&mut self) -> Result<String> {
        let mut buffer = self.read_buffer()?;
        while buffer.last() == Some(&0) {
            buffer.pop();
        }
        String::from_utf8(buffer).map_err(|e| malformed_error!("Invalid UTF-8 string - {}", e))
    }

    /// Sends a UTF-8 string.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_string(&mut self, string: &str) -> Result<()> {
        self.write_buffer(string.as_bytes())
    }

    /// Receives a UTF-16 string; trailing NULs are dropped.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for an odd byte count.
    pub fn accept_wstring(&mut self) -> Result<U16String> {
        let buffer = self.read_buffer()?;
        if buffer.len() % 2 != 0 {
            return Err(malformed_error!(
                "Invalid UTF-16 length - {}",
                buffer.len()
            ));
        }

        let mut units: Vec<u16> = buffer
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }
        Ok(U16String::from_vec(units))
    }

    /// Sends a UTF-16 string.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_wstring(&mut self, string: &U16Str) -> Result<()> {
        let bytes: Vec<u8> = string
            .as_slice()
            .iter()
            .flat_map(|unit| unit.to_ne_bytes())
            .collect();
        self.write_buffer(&bytes)
    }

    /// Receives a metadata token.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn accept_token(&mut self) -> Result<Token> {
        let mut bytes = [0u8; 4];
        self.transport.read_exact(&mut bytes)?;
        Ok(Token::new(read_ne(&bytes)?))
    }

    /// Sends a metadata token.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_token(&mut self, token: Token) -> Result<()> {
        self.transport.write_all(&token.value().to_ne_bytes())?;
        self.transport.flush()?;
        Ok(())
    }

    /// Sends the index of a string interned in the host's string pool.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_strings_pool_index(&mut self, index: u32) -> Result<()> {
        self.transport.write_all(&index.to_ne_bytes())?;
        self.transport.flush()?;
        Ok(())
    }

    /// Sends the type tokens of a method signature as a buffer of `[count][tokens]`.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_type_info_from_method(&mut self, types: &[Token]) -> Result<()> {
        self.write_buffer(&types.to_bytes())
    }

    /// Receives type tokens sent by [`send_type_info_from_method`](Self::send_type_info_from_method).
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] or [`Error::OutOfBounds`] for a bad payload.
    pub fn accept_type_info(&mut self) -> Result<Vec<Token>> {
        Vec::<Token>::from_bytes(&self.read_buffer()?)
    }

    /// Receives a method body.
    ///
    /// # Errors
    /// Any transport failure, or a malformed buffer count.
    pub fn accept_method_body(&mut self) -> Result<MethodBody> {
        let il = self.read_buffer()?;
        let mut max_stack = [0u8; 4];
        self.transport.read_exact(&mut max_stack)?;
        let exception_handlers = self.read_buffer()?;
        Ok(MethodBody {
            il,
            max_stack_size: read_ne(&max_stack)?,
            exception_handlers,
        })
    }

    /// Sends a method body.
    ///
    /// # Errors
    /// Any transport failure, and [`Error::Malformed`] if the bytecode or the clause
    /// table is too large for an `int32` count.
    pub fn send_method_body(&mut self, body: &MethodBody) -> Result<()> {
        wire_count(body.il.len())?;
        wire_count(body.exception_handlers.len())?;

        let mut out = Vec::new();
        body.serialize(&mut out);
        self.transport.write_all(&out)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Sends `command` followed by `object` serialized into a buffer.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn send_serializable<S: Serializable + ?Sized>(
        &mut self,
        command: CommandType,
        object: &S,
    ) -> Result<()> {
        self.send_command(command)?;
        let bytes = object.to_bytes();
        debug!(%command, bytes = bytes.len(), "send serializable");
        self.write_buffer(&bytes)
    }

    /// Receives a buffer sent with [`send_serializable`](Self::send_serializable) and
    /// decodes it.
    ///
    /// # Errors
    /// Any transport or decoding failure.
    pub fn accept_serializable<D: Deserializable>(&mut self) -> Result<D> {
        let bytes = self.read_buffer()?;
        let mut parser = Parser::new(&bytes);
        D::deserialize(&mut parser)
    }

    /// Receives the engine's answer to an execution step.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn accept_exec_result(&mut self) -> Result<Vec<u8>> {
        self.read_buffer()
    }

    /// Answers one engine query.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `command` is not a query, and any provider or
    /// transport failure.
    pub fn serve_query<P: MetadataProvider + ?Sized>(
        &mut self,
        command: CommandType,
        provider: &mut P,
    ) -> Result<()> {
        let token = match command {
            c if c.is_query() => self.accept_token()?,
            other => return Err(malformed_error!("{} is not an engine query", other)),
        };
        debug!(%command, %token, "serving query");

        match command {
            CommandType::ReadMethodBody => {
                let body = provider.method_body(token)?;
                self.send_method_body(&body)
            }
            CommandType::ReadString => {
                let string = provider.user_string(token)?;
                self.send_wstring(&U16String::from_str(&string))
            }
            CommandType::ParseTypeInfoFromMethod => {
                let types = provider.type_info_from_method(token)?;
                self.send_type_info_from_method(&types)
            }
            CommandType::GetTypeTokenFromTypeRef => {
                let resolved = provider.type_token_from_type_ref(token)?;
                self.send_token(resolved)
            }
            _ => {
                let resolved = provider.type_token_from_type_spec(token)?;
                self.send_token(resolved)
            }
        }
    }

    /// Serves engine queries until the engine announces the reply to `request`.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedCommand`] if a non-query command other than `request`
    /// arrives, and any query or transport failure.
    pub fn await_reply<P: MetadataProvider + ?Sized>(
        &mut self,
        request: CommandType,
        provider: &mut P,
    ) -> Result<()> {
        loop {
            let command = self.accept_command()?;
            if command == request {
                return Ok(());
            }
            if !command.is_query() {
                return Err(Error::UnexpectedCommand {
                    expected: request.byte(),
                    actual: command.byte(),
                });
            }
            self.serve_query(command, provider)?;
        }
    }

    /// Asks the engine to instrument a method and returns the rewritten body.
    ///
    /// # Errors
    /// Any transport, query or decoding failure.
    pub fn instrument<S: Serializable + ?Sized, P: MetadataProvider + ?Sized>(
        &mut self,
        request: &S,
        provider: &mut P,
    ) -> Result<MethodBody> {
        self.send_serializable(CommandType::InstrumentCommand, request)?;
        self.await_reply(CommandType::InstrumentCommand, provider)?;
        self.accept_method_body()
    }

    /// Reports an execution step and returns the engine's raw answer.
    ///
    /// # Errors
    /// Any transport or query failure.
    pub fn execute<S: Serializable + ?Sized, P: MetadataProvider + ?Sized>(
        &mut self,
        report: &S,
        provider: &mut P,
    ) -> Result<Vec<u8>> {
        self.send_serializable(CommandType::ExecuteCommand, report)?;
        self.await_reply(CommandType::ExecuteCommand, provider)?;
        self.accept_exec_result()
    }

    /// Flushes and closes the transport.
    ///
    /// # Errors
    /// Any transport failure.
    pub fn shutdown(mut self) -> Result<()> {
        self.transport.flush()?;
        self.transport.close()?;
        debug!("connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::ExceptionClause, test::MockTransport};

    struct Metadata;

    impl MetadataProvider for Metadata {
        fn method_body(&mut self, method: Token) -> Result<MethodBody> {
            if method.table() != Token::METHOD_DEF {
                return Err(Error::Unresolved(method));
            }
            Ok(MethodBody::new(vec![0x00, 0x2A], 1, &[]))
        }

        fn user_string(&mut self, _token: Token) -> Result<String> {
            Ok("hi".to_string())
        }

        fn type_info_from_method(&mut self, _method: Token) -> Result<Vec<Token>> {
            Ok(vec![Token::new(0x0200_0001)])
        }

        fn type_token_from_type_ref(&mut self, type_ref: Token) -> Result<Token> {
            Ok(Token::new(type_ref.row() | 0x0200_0000))
        }

        fn type_token_from_type_spec(&mut self, _type_spec: Token) -> Result<Token> {
            Ok(Token::new(0x0200_0009))
        }
    }

    fn command(byte: u8) -> Vec<u8> {
        let mut out = 1i32.to_ne_bytes().to_vec();
        out.push(byte);
        out
    }

    fn buffer(bytes: &[u8]) -> Vec<u8> {
        let mut out = (bytes.len() as i32).to_ne_bytes().to_vec();
        out.extend_from_slice(bytes);
        out
    }

    #[test]
    fn buffer_round_trip() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut writer = Protocol::new(MockTransport::default());
        writer.write_buffer(&payload).unwrap();
        writer.write_buffer(&[]).unwrap();

        let written = writer.into_inner().written;
        let mut reader = Protocol::new(MockTransport::with_input(written));
        assert_eq!(reader.read_buffer().unwrap(), payload);
        assert_eq!(reader.read_buffer().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn truncated_buffer_is_transport_error() {
        let mut input = i32::MAX.to_ne_bytes().to_vec();
        input.extend_from_slice(&[1, 2, 3]);
        let mut protocol = Protocol::new(MockTransport::with_input(input));
        match protocol.read_buffer() {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negative_buffer_length_is_malformed() {
        let mut protocol = Protocol::new(MockTransport::with_input((-1i32).to_ne_bytes().to_vec()));
        assert!(matches!(
            protocol.read_buffer(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn handshake_exchanges_confirmation() {
        let mut protocol = Protocol::new(MockTransport::with_input(command(0x55)));
        protocol.handshake().unwrap();
        assert_eq!(protocol.get_ref().written, command(0x55));
    }

    #[test]
    fn handshake_rejects_other_bytes() {
        let mut protocol = Protocol::new(MockTransport::with_input(command(0x57)));
        assert!(matches!(
            protocol.handshake(),
            Err(Error::HandshakeFailed {
                expected: 0x55,
                actual: 0x57
            })
        ));
    }

    #[test]
    fn handshake_fails_on_closed_stream() {
        let mut protocol = Protocol::new(MockTransport::default());
        assert!(matches!(protocol.handshake(), Err(Error::Io(_))));
    }

    #[test]
    fn send_serializable_envelope() {
        let mut protocol = Protocol::new(MockTransport::default());
        let tokens = vec![Token::new(5)];
        protocol
            .send_serializable(CommandType::ExecuteCommand, &tokens)
            .unwrap();

        let mut expected = command(0x57);
        expected.extend(buffer(&tokens.to_bytes()));
        assert_eq!(protocol.get_ref().written, expected);
    }

    #[test]
    fn strings_drop_trailing_nul() {
        let mut input = buffer(b"Program\0");
        let wide: Vec<u8> = "Main\0"
            .encode_utf16()
            .flat_map(|u| u.to_ne_bytes())
            .collect();
        input.extend(buffer(&wide));

        let mut protocol = Protocol::new(MockTransport::with_input(input));
        assert_eq!(protocol.accept_string().unwrap(), "Program");
        assert_eq!(protocol.accept_wstring().unwrap().to_string_lossy(), "Main");
    }

    #[test]
    fn odd_wide_string_is_malformed() {
        let mut protocol = Protocol::new(MockTransport::with_input(buffer(&[1, 2, 3])));
        assert!(matches!(
            protocol.accept_wstring(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn method_body_framing() {
        let body = MethodBody::new(
            vec![0x14, 0x2A],
            3,
            &ExceptionClause::decode_table(&[0u8; 24]).unwrap(),
        );
        let mut writer = Protocol::new(MockTransport::default());
        writer.send_method_body(&body).unwrap();

        let mut reader = Protocol::new(MockTransport::with_input(writer.into_inner().written));
        assert_eq!(reader.accept_method_body().unwrap(), body);
    }

    #[test]
    fn unknown_command_byte() {
        let mut protocol = Protocol::new(MockTransport::with_input(command(0x99)));
        assert!(matches!(
            protocol.accept_command(),
            Err(Error::UnknownCommand(0x99))
        ));
    }

    #[test]
    fn instrument_serves_queries_before_reply() {
        let reply_body = MethodBody::new(vec![0x00, 0x00, 0x2A], 2, &[]);

        let mut input = command(CommandType::GetTypeTokenFromTypeRef.byte());
        input.extend(0x0100_0004u32.to_ne_bytes());
        input.extend(command(CommandType::ReadString.byte()));
        input.extend(0x7000_0001u32.to_ne_bytes());
        input.extend(command(CommandType::InstrumentCommand.byte()));
        input.extend(reply_body.to_bytes());

        let mut protocol = Protocol::new(MockTransport::with_input(input));
        let request = Token::new(0x0600_0001);
        let body = protocol.instrument(&request, &mut Metadata).unwrap();
        assert_eq!(body, reply_body);

        let mut expected = command(CommandType::InstrumentCommand.byte());
        expected.extend(buffer(&request.to_bytes()));
        expected.extend(0x0200_0004u32.to_ne_bytes());
        let wide: Vec<u8> = "hi".encode_utf16().flat_map(|u| u.to_ne_bytes()).collect();
        expected.extend(buffer(&wide));
        assert_eq!(protocol.get_ref().written, expected);
    }

    #[test]
    fn await_reply_rejects_foreign_commands() {
        let mut protocol = Protocol::new(MockTransport::with_input(command(0x56)));
        assert!(matches!(
            protocol.await_reply(CommandType::ExecuteCommand, &mut Metadata),
            Err(Error::UnexpectedCommand {
                expected: 0x57,
                actual: 0x56
            })
        ));
    }

    #[test]
    fn provider_failures_propagate() {
        let mut input = command(CommandType::ReadMethodBody.byte());
        input.extend(0x0200_0001u32.to_ne_bytes());
        let mut protocol = Protocol::new(MockTransport::with_input(input));
        assert!(matches!(
            protocol.await_reply(CommandType::ExecuteCommand, &mut Metadata),
            Err(Error::Unresolved(_))
        ));
    }

    #[test]
    fn serve_query_rejects_non_queries() {
        let mut protocol = Protocol::new(MockTransport::default());
        assert!(protocol
            .serve_query(CommandType::Confirmation, &mut Metadata)
            .is_err());
    }

    #[test]
    fn shutdown_closes_transport() {
        let protocol = Protocol::new(MockTransport::default());
        protocol.shutdown().unwrap();
    }
}

//! Core connection type

use super::connector::{RpcConnection, SessionToken};
use super::state::ConnectionState;
use super::transport::Transport;
use crate::protocol::{
    constants, decode_response, encode_handshake, encode_request, Protocol, Request, Response,
};
use crate::stream::{RecordBatch, SchemaRef};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::io;

/// Wire protocol connection
pub struct Connection {
    transport: Transport,
    protocol: Protocol,
    state: ConnectionState,
    read_buf: BytesMut,
    /// Schema of the result currently being read
    schema: Option<SchemaRef>,
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport, protocol: Protocol) -> Self {
        Self {
            transport,
            protocol,
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            schema: None,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Send the handshake and wait for the server to accept it
    pub async fn handshake(&mut self) -> Result<()> {
        self.state.transition(ConnectionState::Handshaking)?;

        self.transport
            .write_all(&encode_handshake(self.protocol))
            .await?;
        self.transport.flush().await?;

        while self.read_buf.is_empty() {
            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                self.state = ConnectionState::Closed;
                return Err(Error::ConnectionClosed);
            }
        }

        let response = self.read_buf[0];
        self.read_buf.advance(1);

        match response {
            constants::HANDSHAKE_ACCEPT => {
                self.state.transition(ConnectionState::Idle)?;
                tracing::debug!(protocol = %self.protocol, "handshake accepted");
                Ok(())
            }
            constants::HANDSHAKE_REJECT => {
                self.state = ConnectionState::Closed;
                Err(Error::Connection(format!(
                    "server rejected protocol version {} with {} encoding",
                    constants::PROTOCOL_VERSION,
                    self.protocol
                )))
            }
            other => {
                self.state = ConnectionState::Closed;
                Err(Error::Protocol(format!(
                    "unexpected handshake response byte: 0x{:02X}",
                    other
                )))
            }
        }
    }

    /// Send a request
    async fn send_request(&mut self, msg: &Request) -> Result<()> {
        let buf = encode_request(msg, self.protocol)?;
        self.transport.write_all(&buf).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Receive a response
    async fn receive_response(&mut self) -> Result<Response> {
        loop {
            match decode_response(&self.read_buf, self.protocol) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            // Need more data
            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Send a request from `Idle` and read its first response.
    ///
    /// Any other state means an earlier exchange never finished and the read
    /// buffer is somewhere inside it, so the connection is given up.
    async fn call(&mut self, msg: &Request) -> Result<Response> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            other => {
                self.state = ConnectionState::Closed;
                self.schema = None;
                return Err(Error::Protocol(format!(
                    "request issued while connection was {}",
                    other
                )));
            }
        }
        self.state.transition(ConnectionState::AwaitingResponse)?;
        self.send_request(msg).await?;
        self.receive_response().await
    }

    /// A fatal error leaves the stream at an unknown position
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::debug!(error = %e, "connection unusable, marking closed");
                self.state = ConnectionState::Closed;
                self.schema = None;
            }
        }
        result
    }

    async fn authenticate_inner(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<SessionToken> {
        let request = Request::Connect {
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        };
        match self.call(&request).await? {
            Response::Session(token) => {
                self.state.transition(ConnectionState::Idle)?;
                Ok(SessionToken::new(token))
            }
            Response::Error(err) => {
                self.state.transition(ConnectionState::Idle)?;
                Err(Error::Auth(err.to_string()))
            }
            other => Err(Error::Protocol(format!(
                "unexpected response to connect: {:?}",
                other
            ))),
        }
    }

    async fn execute_inner(
        &mut self,
        session: &SessionToken,
        sql: &str,
        first_n: Option<u64>,
    ) -> Result<SchemaRef> {
        let first_n = match first_n {
            Some(n) => i64::try_from(n)
                .map_err(|_| Error::Config(format!("row limit too large: {}", n)))?,
            None => constants::NO_ROW_LIMIT,
        };
        let request = Request::Execute {
            session: session.as_str().to_string(),
            sql: sql.to_string(),
            first_n,
        };
        match self.call(&request).await? {
            Response::Schema(schema) => {
                self.state.transition(ConnectionState::ReadingResults)?;
                self.schema = Some(schema.clone());
                Ok(schema)
            }
            Response::Error(err) => {
                self.state.transition(ConnectionState::Idle)?;
                Err(Error::Query(err.to_string()))
            }
            other => Err(Error::Protocol(format!(
                "unexpected response to execute: {:?}",
                other
            ))),
        }
    }

    async fn next_batch_inner(&mut self) -> Result<Option<RecordBatch>> {
        let schema = match (&self.state, &self.schema) {
            (ConnectionState::ReadingResults, Some(schema)) => schema.clone(),
            (ConnectionState::Closed, _) => return Err(Error::ConnectionClosed),
            (state, _) => {
                return Err(Error::InvalidState {
                    expected: ConnectionState::ReadingResults.to_string(),
                    actual: state.to_string(),
                })
            }
        };

        match self.receive_response().await? {
            // Share the result's schema; a batch that doesn't fit it is corrupt
            Response::Batch(batch) => batch
                .with_schema(schema)
                .map(Some)
                .map_err(|e| Error::Protocol(format!("batch does not match result schema: {}", e))),
            Response::Complete { rows, execution_ms } => {
                tracing::debug!(rows, execution_ms, "result complete");
                self.schema = None;
                self.state.transition(ConnectionState::Idle)?;
                Ok(None)
            }
            Response::Error(err) => {
                self.schema = None;
                self.state.transition(ConnectionState::Idle)?;
                Err(Error::Query(err.to_string()))
            }
            other => Err(Error::Protocol(format!(
                "unexpected message while reading results: {:?}",
                other
            ))),
        }
    }

    async fn logout_inner(&mut self, session: &SessionToken) -> Result<()> {
        let request = Request::Disconnect {
            session: session.as_str().to_string(),
        };
        match self.call(&request).await? {
            Response::Ok => {
                self.state.transition(ConnectionState::Idle)?;
                Ok(())
            }
            Response::Error(err) => {
                self.state.transition(ConnectionState::Idle)?;
                Err(Error::Query(err.to_string()))
            }
            other => Err(Error::Protocol(format!(
                "unexpected response to disconnect: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RpcConnection for Connection {
    async fn authenticate(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<SessionToken> {
        let result = self.authenticate_inner(database, user, password).await;
        self.check(result)
    }

    async fn execute(
        &mut self,
        session: &SessionToken,
        sql: &str,
        first_n: Option<u64>,
    ) -> Result<SchemaRef> {
        let result = self.execute_inner(session, sql, first_n).await;
        self.check(result)
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let result = self.next_batch_inner().await;
        self.check(result)
    }

    async fn logout(&mut self, session: &SessionToken) -> Result<()> {
        let result = self.logout_inner(session).await;
        self.check(result)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if self.state == ConnectionState::Closed {
            // Already failed; the socket may be half-dead, just drop it
            return Ok(());
        }
        self.state.transition(ConnectionState::Closed)?;
        let _ = self.send_request(&Request::Terminate).await;
        self.transport.shutdown().await?;
        Ok(())
    }
}

//! Minimal request/response client for the TCP adapter.

use bytes::BytesMut;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::{
    error::ServerError,
    protocol::{self, ProtocolError, Request, Response},
};

/// One connection to a ledger server. Requests are answered in order.
#[derive(Debug)]
pub struct LedgerClient {
    stream: TcpStream,
    buf: BytesMut,
    max_frame_bytes: usize,
    max_response_bytes: usize,
}

impl LedgerClient {
    /// Connect to a server whose request limit is `max_frame_bytes`.
    ///
    /// # Errors
    ///
    /// `Transport` if the connection cannot be established.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        max_frame_bytes: usize,
    ) -> Result<Self, ServerError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            max_frame_bytes,
            max_response_bytes: protocol::response_limit(max_frame_bytes),
        })
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// `Protocol` on framing failures, including the server closing the
    /// connection before answering.
    pub async fn call(&mut self, request: &Request) -> Result<Response, ServerError> {
        protocol::write_frame(&mut self.stream, request, self.max_frame_bytes).await?;

        protocol::read_frame(&mut self.stream, &mut self.buf, self.max_response_bytes)
            .await?
            .ok_or(ServerError::Protocol(ProtocolError::Truncated))
    }
}

//! Channel plumbing: byte-stream and in-process connections.
//!
//! The endpoints never block on their own; the channel decides how the
//! suspension points behave. [`StreamChannel`] drives a blocking byte
//! stream to completion, while [`DirectChannel`] wires a client to an
//! in-process server by handing buffers across, with no kernel
//! transport and no would-block conditions at all.

use std::io::{Read, Write};

use modmap_wire::{MessageBuffer, ReadStatus, WriteStatus};
use tracing::{debug, info};

use crate::error::{MapperError, MapperResult};
use crate::resolver::Resolver;
use crate::server::{Dispatch, MapperServer};

/// One request-batch/response-batch exchange.
pub trait Channel {
    /// Flush `outgoing` (already terminated) to the peer and fill
    /// `incoming` with the complete response batch.
    fn roundtrip(
        &mut self,
        outgoing: &mut MessageBuffer,
        incoming: &mut MessageBuffer,
    ) -> MapperResult<()>;
}

/// Channel over a byte stream such as a socket or pipe pair.
///
/// `roundtrip` retries the nonblocking suspension points until the
/// exchange completes, so the stream should be in blocking mode; a
/// nonblocking embedder drives [`MessageBuffer`] directly from its own
/// event loop instead.
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
}

impl<S: Read + Write> StreamChannel<S> {
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Recover the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Channel for StreamChannel<S> {
    fn roundtrip(
        &mut self,
        outgoing: &mut MessageBuffer,
        incoming: &mut MessageBuffer,
    ) -> MapperResult<()> {
        incoming.prepare_to_read();
        loop {
            match outgoing.drain_to(&mut self.stream)? {
                WriteStatus::Complete => break,
                WriteStatus::NeedMore | WriteStatus::Interrupted => continue,
            }
        }
        self.stream.flush().map_err(MapperError::Io)?;
        loop {
            match incoming.fill_from(&mut self.stream)? {
                ReadStatus::Complete => return Ok(()),
                ReadStatus::NeedMore | ReadStatus::Interrupted => continue,
                ReadStatus::Eof => return Err(MapperError::UnexpectedEof),
            }
        }
    }
}

/// Channel to an in-process server.
///
/// The client's outgoing buffer becomes the server's input on each
/// exchange and the server's response batch comes straight back; a
/// pivoting handshake swaps the owned resolver.
pub struct DirectChannel {
    server: MapperServer,
    resolver: Option<Box<dyn Resolver>>,
}

impl DirectChannel {
    /// Wire a server and its resolver into a same-thread channel.
    pub fn new(server: MapperServer, resolver: Box<dyn Resolver>) -> Self {
        Self {
            server,
            resolver: Some(resolver),
        }
    }

    /// The wrapped server, for introspection.
    pub fn server(&self) -> &MapperServer {
        &self.server
    }

    /// True until a resolver closes the session.
    pub fn is_open(&self) -> bool {
        self.resolver.is_some()
    }
}

impl Channel for DirectChannel {
    fn roundtrip(
        &mut self,
        outgoing: &mut MessageBuffer,
        incoming: &mut MessageBuffer,
    ) -> MapperResult<()> {
        let mut resolver = self.resolver.take().ok_or(MapperError::SessionClosed)?;
        self.server.accept_batch(outgoing.take_bytes())?;
        match self.server.parse_requests(resolver.as_mut()) {
            Dispatch::Retained => self.resolver = Some(resolver),
            Dispatch::Pivoted(next) => {
                debug!("direct session pivoted to a new resolver");
                self.resolver = Some(next);
            }
            Dispatch::Closed => {}
        }
        self.server.prepare_to_write();
        incoming.load_batch(self.server.take_response_batch())?;
        Ok(())
    }
}

/// Run one server session over a blocking stream until the peer closes
/// it. Returns the resolver that ends up owning the session, so a
/// listener can keep a pivoted handler across connections.
pub fn serve<S: Read + Write>(
    server: &mut MapperServer,
    stream: &mut S,
    mut resolver: Box<dyn Resolver>,
) -> MapperResult<Box<dyn Resolver>> {
    info!("session started");
    loop {
        match server.read_from(stream)? {
            ReadStatus::NeedMore | ReadStatus::Interrupted => continue,
            ReadStatus::Eof => {
                info!("peer closed the session");
                return Ok(resolver);
            }
            ReadStatus::Complete => {}
        }

        match server.parse_requests(resolver.as_mut()) {
            Dispatch::Retained => {}
            Dispatch::Pivoted(next) => resolver = next,
            Dispatch::Closed => {
                // Flush whatever responses were emitted before the
                // close, then report the termination.
                server.prepare_to_write();
                flush(server, stream)?;
                return Err(MapperError::SessionClosed);
            }
        }

        server.prepare_to_write();
        flush(server, stream)?;
    }
}

fn flush<S: Read + Write>(server: &mut MapperServer, stream: &mut S) -> MapperResult<()> {
    loop {
        match server.write_to(stream)? {
            WriteStatus::Complete => return Ok(()),
            WriteStatus::NeedMore | WriteStatus::Interrupted => continue,
        }
    }
}

//! Helper-side endpoint: session state machine and request dispatch.

use std::io::{Read, Write};

use modmap_wire::{MessageBuffer, ReadStatus, WireError, WriteStatus};
use tracing::{debug, info, warn};

use crate::error::MapperResult;
use crate::packet::{codes, DecodeError, Request, Response};
use crate::resolver::{Pivot, Resolver};
use crate::PROTOCOL_VERSION;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Only `HELLO` is valid.
    Disconnected,
    /// The handshake completed; all other requests are valid.
    Connected,
}

/// Where the server is in its read → dispatch → write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accumulating a request batch.
    Reading,
    /// A complete batch is buffered and being dispatched.
    Dispatching,
    /// A response batch is being flushed.
    Writing,
}

/// Outcome of dispatching one request batch.
#[must_use]
pub enum Dispatch {
    /// Keep using the resolver that handled this batch.
    Retained,
    /// The handshake supplied a new resolver; use it for this session
    /// from now on.
    Pivoted(Box<dyn Resolver>),
    /// The resolver ended the session; requests remaining in the batch
    /// were dropped with it.
    Closed,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Retained => f.write_str("Retained"),
            Dispatch::Pivoted(_) => f.write_str("Pivoted(..)"),
            Dispatch::Closed => f.write_str("Closed"),
        }
    }
}

/// Helper-side protocol endpoint.
///
/// The server owns one buffer per direction. Resolver methods answer
/// each request by calling exactly one response helper, which appends
/// one line to the outgoing buffer; dispatch enforces the pairing.
#[derive(Debug)]
pub struct MapperServer {
    input: MessageBuffer,
    output: MessageBuffer,
    state: SessionState,
    phase: Phase,
    /// min(client version, ours), fixed during the handshake.
    negotiated_version: u32,
    /// Response lines emitted so far, for the 1:1 pairing check.
    responses: usize,
}

impl Default for MapperServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MapperServer {
    /// Create a server in the disconnected state.
    pub fn new() -> Self {
        Self {
            input: MessageBuffer::new(),
            output: MessageBuffer::new(),
            state: SessionState::Disconnected,
            phase: Phase::Reading,
            negotiated_version: PROTOCOL_VERSION,
            responses: 0,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once a handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Current position in the read → dispatch → write cycle.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Pull request bytes from the transport. One nonblocking read per
    /// call; [`ReadStatus::Complete`] means a full batch is ready for
    /// [`parse_requests`](Self::parse_requests).
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> MapperResult<ReadStatus> {
        if self.phase != Phase::Reading {
            self.input.prepare_to_read();
            self.phase = Phase::Reading;
        }
        match self.input.fill_from(reader) {
            Ok(status) => {
                if status == ReadStatus::Complete {
                    self.phase = Phase::Dispatching;
                }
                Ok(status)
            }
            Err(WireError::TrailingData) => {
                // The buffer still holds one complete batch; the caller
                // may dispatch it before tearing the session down.
                self.phase = Phase::Dispatching;
                Err(WireError::TrailingData.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Install a complete request batch handed over in-process.
    pub fn accept_batch(&mut self, batch: Vec<u8>) -> MapperResult<()> {
        self.input.load_batch(batch)?;
        self.phase = Phase::Dispatching;
        Ok(())
    }

    /// Dispatch every request of the buffered batch through `resolver`,
    /// emitting exactly one response line per request in order.
    ///
    /// Framing and protocol violations become `ERROR` responses and the
    /// batch continues; they never escape as `Err`. The returned
    /// [`Dispatch`] tells the caller which resolver owns the session
    /// from here on.
    pub fn parse_requests(&mut self, resolver: &mut dyn Resolver) -> Dispatch {
        debug_assert_eq!(self.phase, Phase::Dispatching);

        let mut pivoted: Option<Box<dyn Resolver>> = None;
        let mut closed = false;

        while !closed {
            let words = match self.input.lex() {
                None => break,
                Some(Ok(words)) => words,
                Some(Err(WireError::MalformedLine { raw })) => {
                    warn!(line = %raw, "discarding malformed request line");
                    self.error_with_context(codes::MALFORMED_REQUEST, &raw);
                    continue;
                }
                Some(Err(_)) => break,
            };

            let request = match Request::decode(&words) {
                Ok(request) => request,
                Err(DecodeError::UnknownVerb) => {
                    let line = self.input.lexed_line();
                    warn!(line = %line, "unrecognized request");
                    self.error_with_context(codes::UNRECOGNIZED_REQUEST, &line);
                    continue;
                }
                Err(DecodeError::BadArguments) => {
                    let line = self.input.lexed_line();
                    warn!(line = %line, "malformed request arguments");
                    self.error_with_context(codes::MALFORMED_REQUEST, &line);
                    continue;
                }
            };

            debug!(verb = request.verb(), "dispatching request");
            let before = self.responses;

            match request {
                Request::Hello {
                    version,
                    agent,
                    ident,
                } => {
                    if self.state == SessionState::Connected {
                        self.error_response(codes::ALREADY_CONNECTED);
                    } else {
                        self.negotiated_version = version.min(PROTOCOL_VERSION);
                        let current = current_resolver(&mut pivoted, resolver);
                        match current.connect_request(self, version, &agent, &ident) {
                            Pivot::Stay => {}
                            Pivot::Swap(next) => pivoted = Some(next),
                            Pivot::Close => closed = true,
                        }
                    }
                }
                other if self.state == SessionState::Disconnected => {
                    debug!(verb = other.verb(), "request before handshake");
                    self.error_response(codes::NOT_CONNECTED);
                }
                Request::ModuleRepo => {
                    current_resolver(&mut pivoted, resolver).module_repo_request(self);
                }
                Request::ModuleExport { module } => {
                    current_resolver(&mut pivoted, resolver).module_export_request(self, &module);
                }
                Request::ModuleImport { module } => {
                    current_resolver(&mut pivoted, resolver).module_import_request(self, &module);
                }
                Request::ModuleCompiled { module } => {
                    current_resolver(&mut pivoted, resolver).module_compiled_request(self, &module);
                }
                Request::IncludeTranslate { include } => {
                    current_resolver(&mut pivoted, resolver)
                        .include_translate_request(self, &include);
                }
            }

            debug_assert_eq!(
                self.responses,
                before + 1,
                "a resolver must emit exactly one response per request"
            );
        }

        if closed {
            info!("resolver closed the session");
            Dispatch::Closed
        } else if let Some(next) = pivoted {
            Dispatch::Pivoted(next)
        } else {
            Dispatch::Retained
        }
    }

    /// Close the response batch: terminate the final line with a bare
    /// newline and rewind for flushing.
    pub fn prepare_to_write(&mut self) {
        debug_assert_eq!(self.phase, Phase::Dispatching);
        self.output.prepare_to_write();
        self.phase = Phase::Writing;
    }

    /// Push response bytes to the transport. One nonblocking write per
    /// call; on [`WriteStatus::Complete`] the server is ready for the
    /// next request batch.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> MapperResult<WriteStatus> {
        debug_assert_eq!(self.phase, Phase::Writing);
        let status = self.output.drain_to(writer)?;
        if status == WriteStatus::Complete {
            self.input.prepare_to_read();
            self.phase = Phase::Reading;
        }
        Ok(status)
    }

    /// Hand the finished response batch over in-process.
    pub fn take_response_batch(&mut self) -> Vec<u8> {
        debug_assert_eq!(self.phase, Phase::Writing);
        self.input.prepare_to_read();
        self.phase = Phase::Reading;
        self.output.take_bytes()
    }

    // ─── Response helpers, called by resolver methods ────────────────

    fn push_response(&mut self, response: &Response) {
        self.output.begin_line();
        response.encode(&mut self.output);
        self.responses += 1;
    }

    /// Accept the handshake, announcing `agent` and the negotiated
    /// version. Flips the session to connected.
    pub fn connect_response(&mut self, agent: &str) {
        let version = self.negotiated_version;
        self.push_response(&Response::Connected {
            version,
            ident: agent.to_string(),
        });
        self.state = SessionState::Connected;
        info!(version, agent, "session connected");
    }

    /// Answer `MODULE-REPO` with the repository directory.
    pub fn module_repo_response(&mut self, repo: &str) {
        self.push_response(&Response::Repo {
            path: repo.to_string(),
        });
    }

    /// Answer with a CMI pathname.
    pub fn module_cmi_response(&mut self, cmi: &str) {
        self.push_response(&Response::Cmi {
            path: cmi.to_string(),
        });
    }

    /// Answer `INCLUDE-TRANSLATE`: the include stays textual, under the
    /// given replacement path if any.
    pub fn include_translate_response(&mut self, path: Option<&str>) {
        self.push_response(&Response::IncludeText {
            path: path.map(str::to_string),
        });
    }

    /// Plain acknowledgement.
    pub fn ok_response(&mut self) {
        self.push_response(&Response::Ok);
    }

    /// Error response. Leaves the connection state untouched.
    pub fn error_response(&mut self, message: &str) {
        self.push_response(&Response::Error {
            message: message.to_string(),
        });
    }

    fn error_with_context(&mut self, code: &str, line: &str) {
        self.error_response(&format!("{code} {line}"));
    }
}

/// The resolver requests currently dispatch through: the pivoted one if
/// the handshake installed it, otherwise the caller's.
fn current_resolver<'a>(
    pivoted: &'a mut Option<Box<dyn Resolver>>,
    fallback: &'a mut dyn Resolver,
) -> &'a mut dyn Resolver {
    match pivoted {
        Some(boxed) => boxed.as_mut(),
        None => fallback,
    }
}

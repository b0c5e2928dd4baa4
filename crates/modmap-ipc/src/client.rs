//! Compiler-side endpoint: typed operations over a channel.

use modmap_wire::MessageBuffer;
use tracing::debug;

use crate::error::{MapperError, MapperResult};
use crate::packet::{Request, Response};
use crate::transport::Channel;
use crate::PROTOCOL_VERSION;

/// Answer to an `INCLUDE-TRANSLATE` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeTranslation {
    /// Import the named CMI instead of textual inclusion.
    Module(String),
    /// Keep the include textual, optionally under a replacement path.
    Text(Option<String>),
}

/// Compiler-side protocol endpoint.
///
/// Operations are synchronous: each flushes the pending request batch
/// over the channel and decodes the matching response. While the client
/// is corked, operations instead queue their request and return
/// `Ok(None)`; [`uncork`](Self::uncork) flushes the whole batch and
/// returns the responses in request order.
#[derive(Debug, Default)]
pub struct MapperClient {
    requests: MessageBuffer,
    responses: MessageBuffer,
    pending: usize,
    corked: bool,
    connected: bool,
}

impl MapperClient {
    /// Create a disconnected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a handshake has been accepted.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True while operations are being batched.
    pub fn is_corked(&self) -> bool {
        self.corked
    }

    /// Start batching: subsequent operations queue their requests
    /// instead of flushing.
    pub fn cork(&mut self) {
        self.corked = true;
    }

    /// Flush the queued batch and return its responses in request
    /// order.
    pub fn uncork<C: Channel>(&mut self, channel: &mut C) -> MapperResult<Vec<Response>> {
        self.corked = false;
        if self.pending == 0 {
            return Ok(Vec::new());
        }
        let responses = self.exchange(channel)?;
        for response in &responses {
            if let Response::Connected { .. } = response {
                self.connected = true;
            }
        }
        Ok(responses)
    }

    /// `HELLO`: negotiate the connection. Returns the agreed version
    /// and the server's identifier.
    pub fn connect<C: Channel>(
        &mut self,
        channel: &mut C,
        agent: &str,
        ident: &str,
    ) -> MapperResult<Option<(u32, String)>> {
        self.enqueue(&Request::Hello {
            version: PROTOCOL_VERSION,
            agent: agent.to_string(),
            ident: ident.to_string(),
        });
        if self.corked {
            return Ok(None);
        }
        match self.exchange_one(channel)? {
            Response::Connected { version, ident } => {
                self.connected = true;
                Ok(Some((version, ident)))
            }
            other => Err(unexpected(other)),
        }
    }

    /// `MODULE-REPO`: the repository directory CMI names are relative
    /// to.
    pub fn module_repo<C: Channel>(&mut self, channel: &mut C) -> MapperResult<Option<String>> {
        self.enqueue(&Request::ModuleRepo);
        if self.corked {
            return Ok(None);
        }
        match self.exchange_one(channel)? {
            Response::Repo { path } => Ok(Some(path)),
            other => Err(unexpected(other)),
        }
    }

    /// `MODULE-EXPORT`: where this compilation should write the
    /// module's CMI.
    pub fn module_export<C: Channel>(
        &mut self,
        channel: &mut C,
        module: &str,
    ) -> MapperResult<Option<String>> {
        self.enqueue(&Request::ModuleExport {
            module: module.to_string(),
        });
        self.cmi_reply(channel)
    }

    /// `MODULE-IMPORT`: where to read an imported module's CMI.
    pub fn module_import<C: Channel>(
        &mut self,
        channel: &mut C,
        module: &str,
    ) -> MapperResult<Option<String>> {
        self.enqueue(&Request::ModuleImport {
            module: module.to_string(),
        });
        self.cmi_reply(channel)
    }

    /// `MODULE-COMPILED`: announce that an exported CMI is on disk.
    pub fn module_compiled<C: Channel>(
        &mut self,
        channel: &mut C,
        module: &str,
    ) -> MapperResult<Option<()>> {
        self.enqueue(&Request::ModuleCompiled {
            module: module.to_string(),
        });
        if self.corked {
            return Ok(None);
        }
        match self.exchange_one(channel)? {
            Response::Ok => Ok(Some(())),
            other => Err(unexpected(other)),
        }
    }

    /// `INCLUDE-TRANSLATE`: should this include become an import?
    pub fn include_translate<C: Channel>(
        &mut self,
        channel: &mut C,
        include: &str,
    ) -> MapperResult<Option<IncludeTranslation>> {
        self.enqueue(&Request::IncludeTranslate {
            include: include.to_string(),
        });
        if self.corked {
            return Ok(None);
        }
        match self.exchange_one(channel)? {
            Response::Cmi { path } => Ok(Some(IncludeTranslation::Module(path))),
            Response::IncludeText { path } => Ok(Some(IncludeTranslation::Text(path))),
            other => Err(unexpected(other)),
        }
    }

    /// Shared tail of the two operations answered by `MODULE-CMI`.
    fn cmi_reply<C: Channel>(&mut self, channel: &mut C) -> MapperResult<Option<String>> {
        if self.corked {
            return Ok(None);
        }
        match self.exchange_one(channel)? {
            Response::Cmi { path } => Ok(Some(path)),
            other => Err(unexpected(other)),
        }
    }

    fn enqueue(&mut self, request: &Request) {
        debug!(verb = request.verb(), corked = self.corked, "queueing request");
        self.requests.begin_line();
        request.encode(&mut self.requests);
        self.pending += 1;
    }

    fn exchange_one<C: Channel>(&mut self, channel: &mut C) -> MapperResult<Response> {
        let mut responses = self.exchange(channel)?;
        match responses.pop() {
            Some(Response::Error { message }) => Err(MapperError::Remote { message }),
            Some(response) if responses.is_empty() => Ok(response),
            _ => Err(MapperError::MalformedResponse {
                detail: "expected exactly one response".to_string(),
            }),
        }
    }

    /// Flush the pending batch and decode the full response batch,
    /// checking the 1:1 pairing.
    fn exchange<C: Channel>(&mut self, channel: &mut C) -> MapperResult<Vec<Response>> {
        let sent = self.pending;
        self.pending = 0;
        self.requests.prepare_to_write();
        channel.roundtrip(&mut self.requests, &mut self.responses)?;

        let mut responses = Vec::with_capacity(sent);
        while let Some(line) = self.responses.lex() {
            let words = line.map_err(|e| MapperError::MalformedResponse {
                detail: e.to_string(),
            })?;
            let response = Response::decode(&words).map_err(|_| MapperError::MalformedResponse {
                detail: words.join(" "),
            })?;
            responses.push(response);
        }
        if responses.len() != sent {
            return Err(MapperError::BatchMismatch {
                sent,
                received: responses.len(),
            });
        }
        Ok(responses)
    }
}

fn unexpected(response: Response) -> MapperError {
    match response {
        Response::Error { message } => MapperError::Remote { message },
        other => MapperError::MalformedResponse {
            detail: format!("{other:?}"),
        },
    }
}

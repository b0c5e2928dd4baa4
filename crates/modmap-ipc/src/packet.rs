//! The request/response verb set and its wire mapping.
//!
//! Requests and responses within a batch correspond 1:1 by position; a
//! line's first word selects the verb and the remaining words are its
//! arguments.

use modmap_wire::MessageBuffer;
use thiserror::Error;

/// Request and response verbs as they appear on the wire.
pub mod verbs {
    /// Connection handshake.
    pub const HELLO: &str = "HELLO";
    /// Ask for the module repository directory.
    pub const MODULE_REPO: &str = "MODULE-REPO";
    /// Announce a module this compilation exports.
    pub const MODULE_EXPORT: &str = "MODULE-EXPORT";
    /// Ask where to read an imported module's CMI.
    pub const MODULE_IMPORT: &str = "MODULE-IMPORT";
    /// Announce that an exported module's CMI has been written.
    pub const MODULE_COMPILED: &str = "MODULE-COMPILED";
    /// Ask whether an include should be translated to an import.
    pub const INCLUDE_TRANSLATE: &str = "INCLUDE-TRANSLATE";
    /// Response carrying a CMI pathname.
    pub const MODULE_CMI: &str = "MODULE-CMI";
    /// Response keeping an include textual.
    pub const INCLUDE_TEXT: &str = "INCLUDE-TEXT";
    /// Plain acknowledgement.
    pub const OK: &str = "OK";
    /// Error response; the single argument carries the code.
    pub const ERROR: &str = "ERROR";
}

/// Error-response codes, underscore-joined, optionally followed by the
/// offending request text.
pub mod codes {
    /// A non-handshake request arrived before `HELLO`.
    pub const NOT_CONNECTED: &str = "not_connected";
    /// A second `HELLO` arrived on a connected session.
    pub const ALREADY_CONNECTED: &str = "already_connected";
    /// The verb is not in the request table.
    pub const UNRECOGNIZED_REQUEST: &str = "unrecognized_request";
    /// The line broke the framing grammar or carried bad arguments.
    pub const MALFORMED_REQUEST: &str = "malformed_request";
    /// The client asked for a newer protocol than this side speaks.
    pub const VERSION_MISMATCH: &str = "version mismatch";
}

/// A decoded compiler request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `HELLO version agent ident`: the connection handshake.
    Hello {
        /// Protocol version the client speaks.
        version: u32,
        /// Client agent name.
        agent: String,
        /// Client-chosen identifier for this compilation.
        ident: String,
    },
    /// `MODULE-REPO`: where do CMIs live?
    ModuleRepo,
    /// `MODULE-EXPORT module`: where should this module's CMI go?
    ModuleExport {
        /// Module or header-unit name.
        module: String,
    },
    /// `MODULE-IMPORT module`: where is this module's CMI?
    ModuleImport {
        /// Module or header-unit name.
        module: String,
    },
    /// `MODULE-COMPILED module`: the CMI is now on disk.
    ModuleCompiled {
        /// Module or header-unit name.
        module: String,
    },
    /// `INCLUDE-TRANSLATE header`: import or keep textual?
    IncludeTranslate {
        /// Header path as spelled in the include directive.
        include: String,
    },
}

/// A decoded helper response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `HELLO version ident`: handshake accepted.
    Connected {
        /// Agreed protocol version.
        version: u32,
        /// Server agent identifier.
        ident: String,
    },
    /// `MODULE-REPO path`.
    Repo {
        /// Module repository directory.
        path: String,
    },
    /// `MODULE-CMI path`.
    Cmi {
        /// CMI pathname, relative to the repository.
        path: String,
    },
    /// `INCLUDE-TEXT [path]`: the include stays textual.
    IncludeText {
        /// Optional replacement header path.
        path: Option<String>,
    },
    /// `OK`.
    Ok,
    /// `ERROR 'code ...'`.
    Error {
        /// Error code, optionally followed by human text.
        message: String,
    },
}

/// Why a line failed to decode into a request or response.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The first word is not a known verb.
    #[error("unrecognized verb")]
    UnknownVerb,
    /// Wrong argument count, a bad integer, or an empty name.
    #[error("malformed arguments")]
    BadArguments,
}

/// Exactly one argument, and not an empty word.
fn one_name(args: &[String]) -> Result<String, DecodeError> {
    match args {
        [name] if !name.is_empty() => Ok(name.clone()),
        _ => Err(DecodeError::BadArguments),
    }
}

impl Request {
    /// Decode a lexed line into a request.
    pub fn decode(words: &[String]) -> Result<Self, DecodeError> {
        let (verb, args) = words.split_first().ok_or(DecodeError::UnknownVerb)?;
        match verb.as_str() {
            verbs::HELLO => match args {
                [version, agent, ident] => {
                    let version = version.parse().map_err(|_| DecodeError::BadArguments)?;
                    Ok(Request::Hello {
                        version,
                        agent: agent.clone(),
                        ident: ident.clone(),
                    })
                }
                _ => Err(DecodeError::BadArguments),
            },
            verbs::MODULE_REPO => {
                if args.is_empty() {
                    Ok(Request::ModuleRepo)
                } else {
                    Err(DecodeError::BadArguments)
                }
            }
            verbs::MODULE_EXPORT => Ok(Request::ModuleExport {
                module: one_name(args)?,
            }),
            verbs::MODULE_IMPORT => Ok(Request::ModuleImport {
                module: one_name(args)?,
            }),
            verbs::MODULE_COMPILED => Ok(Request::ModuleCompiled {
                module: one_name(args)?,
            }),
            verbs::INCLUDE_TRANSLATE => Ok(Request::IncludeTranslate {
                include: one_name(args)?,
            }),
            _ => Err(DecodeError::UnknownVerb),
        }
    }

    /// Append this request as one line of `out`.
    pub fn encode(&self, out: &mut MessageBuffer) {
        match self {
            Request::Hello {
                version,
                agent,
                ident,
            } => {
                out.append_word(verbs::HELLO);
                out.append_integer(*version);
                out.append_word(agent);
                out.append_word(ident);
            }
            Request::ModuleRepo => out.append_word(verbs::MODULE_REPO),
            Request::ModuleExport { module } => {
                out.append_word(verbs::MODULE_EXPORT);
                out.append_word(module);
            }
            Request::ModuleImport { module } => {
                out.append_word(verbs::MODULE_IMPORT);
                out.append_word(module);
            }
            Request::ModuleCompiled { module } => {
                out.append_word(verbs::MODULE_COMPILED);
                out.append_word(module);
            }
            Request::IncludeTranslate { include } => {
                out.append_word(verbs::INCLUDE_TRANSLATE);
                out.append_word(include);
            }
        }
    }

    /// The request's wire verb.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Hello { .. } => verbs::HELLO,
            Request::ModuleRepo => verbs::MODULE_REPO,
            Request::ModuleExport { .. } => verbs::MODULE_EXPORT,
            Request::ModuleImport { .. } => verbs::MODULE_IMPORT,
            Request::ModuleCompiled { .. } => verbs::MODULE_COMPILED,
            Request::IncludeTranslate { .. } => verbs::INCLUDE_TRANSLATE,
        }
    }
}

impl Response {
    /// Decode a lexed line into a response.
    pub fn decode(words: &[String]) -> Result<Self, DecodeError> {
        let (verb, args) = words.split_first().ok_or(DecodeError::UnknownVerb)?;
        match verb.as_str() {
            verbs::HELLO => match args {
                [version, ident] => {
                    let version = version.parse().map_err(|_| DecodeError::BadArguments)?;
                    Ok(Response::Connected {
                        version,
                        ident: ident.clone(),
                    })
                }
                _ => Err(DecodeError::BadArguments),
            },
            verbs::MODULE_REPO => Ok(Response::Repo {
                path: one_name(args)?,
            }),
            verbs::MODULE_CMI => Ok(Response::Cmi {
                path: one_name(args)?,
            }),
            verbs::INCLUDE_TEXT => match args {
                [] => Ok(Response::IncludeText { path: None }),
                [path] => Ok(Response::IncludeText {
                    path: Some(path.clone()),
                }),
                _ => Err(DecodeError::BadArguments),
            },
            verbs::OK => {
                if args.is_empty() {
                    Ok(Response::Ok)
                } else {
                    Err(DecodeError::BadArguments)
                }
            }
            verbs::ERROR => {
                if args.is_empty() {
                    Err(DecodeError::BadArguments)
                } else {
                    Ok(Response::Error {
                        message: args.join(" "),
                    })
                }
            }
            _ => Err(DecodeError::UnknownVerb),
        }
    }

    /// Append this response as one line of `out`. Error payloads are
    /// always quoted so they arrive as a single argument.
    pub fn encode(&self, out: &mut MessageBuffer) {
        match self {
            Response::Connected { version, ident } => {
                out.append_word(verbs::HELLO);
                out.append_integer(*version);
                out.append_word(ident);
            }
            Response::Repo { path } => {
                out.append_word(verbs::MODULE_REPO);
                out.append_word(path);
            }
            Response::Cmi { path } => {
                out.append_word(verbs::MODULE_CMI);
                out.append_word(path);
            }
            Response::IncludeText { path } => {
                out.append_word(verbs::INCLUDE_TEXT);
                if let Some(path) = path {
                    out.append_word(path);
                }
            }
            Response::Ok => out.append_word(verbs::OK),
            Response::Error { message } => {
                out.append_word(verbs::ERROR);
                out.append_quoted(message);
            }
        }
    }
}

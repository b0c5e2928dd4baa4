//! Client and server endpoints for the module-mapper protocol.
//!
//! A C++ compiler resolves module names to Compiled Module Interface
//! (CMI) artifacts by talking to a build-system helper over a
//! line-oriented text protocol. This crate provides both ends of that
//! conversation on top of the [`modmap_wire`] framing codec.
//!
//! # Architecture
//!
//! - [`server`]: request decoding, the session state machine, and batch
//!   dispatch with 1:1 response ordering
//! - [`resolver`]: the pluggable policy answering semantic requests,
//!   with a filesystem-backed default
//! - [`client`]: typed compiler-side operations with request batching
//! - [`packet`]: the request/response verb set
//! - [`transport`]: channel plumbing for byte streams and in-process
//!   connections
//! - [`error`]: endpoint error types
//!
//! # Example
//!
//! ```no_run
//! use modmap_ipc::prelude::*;
//!
//! fn run(stream: std::os::unix::net::UnixStream) -> MapperResult<()> {
//!     let mut server = MapperServer::new();
//!     let resolver = Box::new(FileResolver::default());
//!     transport::serve(&mut server, &mut &stream, resolver)?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod packet;
pub mod prelude;
pub mod resolver;
pub mod server;
pub mod transport;

pub use client::{IncludeTranslation, MapperClient};
pub use error::{MapperError, MapperResult};
pub use packet::{Request, Response};
pub use resolver::{FileResolver, Pivot, Resolver, ResolverConfig};
pub use server::{Dispatch, MapperServer};
pub use transport::{Channel, DirectChannel, StreamChannel};

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Agent identifier the default resolver announces in its handshake
/// response.
pub const DEFAULT_AGENT: &str = "default";

/// Default module repository directory.
pub const DEFAULT_REPO_DIR: &str = "cmi.cache";

/// Default CMI filename suffix.
pub const DEFAULT_CMI_SUFFIX: &str = "cmi";

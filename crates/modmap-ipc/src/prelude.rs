//! Prelude module for convenient imports.

pub use crate::client::{IncludeTranslation, MapperClient};
pub use crate::error::{MapperError, MapperResult};
pub use crate::packet::{codes, verbs, Request, Response};
pub use crate::resolver::{FileResolver, Pivot, Resolver, ResolverConfig};
pub use crate::server::{Dispatch, MapperServer, Phase, SessionState};
pub use crate::transport::{self, Channel, DirectChannel, StreamChannel};
pub use crate::{DEFAULT_AGENT, DEFAULT_CMI_SUFFIX, DEFAULT_REPO_DIR, PROTOCOL_VERSION};

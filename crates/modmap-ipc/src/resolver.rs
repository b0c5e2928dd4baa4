//! Pluggable request-handling policy and the filesystem-backed default.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::packet::codes;
use crate::server::MapperServer;
use crate::{DEFAULT_AGENT, DEFAULT_CMI_SUFFIX, DEFAULT_REPO_DIR, PROTOCOL_VERSION};

/// Replacement for `.` in header-unit names, chosen so it cannot
/// collide with a `.` in a path segment.
const DOT_REPLACE: u8 = b',';

/// Replacement for the `:` partition separator in named modules.
const COLON_REPLACE: u8 = b'-';

/// What `connect_request` decided about the rest of the session.
pub enum Pivot {
    /// Keep dispatching through the current resolver.
    Stay,
    /// Hand the session to this resolver, starting with the next
    /// request of the same batch.
    Swap(Box<dyn Resolver>),
    /// Terminate the session.
    Close,
}

/// A value that answers semantic requests.
///
/// Each method replies by calling exactly one response helper on the
/// server it is handed. Handlers never abort dispatch; anything they
/// want to report travels as an `ERROR` response.
pub trait Resolver {
    /// Handle `HELLO`. The default gates on the protocol version and
    /// announces [`DEFAULT_AGENT`].
    fn connect_request(
        &mut self,
        server: &mut MapperServer,
        version: u32,
        agent: &str,
        ident: &str,
    ) -> Pivot {
        let _ = (agent, ident);
        if version > PROTOCOL_VERSION {
            server.error_response(codes::VERSION_MISMATCH);
        } else {
            server.connect_response(DEFAULT_AGENT);
        }
        Pivot::Stay
    }

    /// Handle `MODULE-REPO`.
    fn module_repo_request(&mut self, server: &mut MapperServer);

    /// Handle `MODULE-EXPORT`.
    fn module_export_request(&mut self, server: &mut MapperServer, module: &str);

    /// Handle `MODULE-IMPORT`.
    fn module_import_request(&mut self, server: &mut MapperServer, module: &str);

    /// Handle `MODULE-COMPILED`. The default acknowledges and ignores
    /// it.
    fn module_compiled_request(&mut self, server: &mut MapperServer, module: &str) {
        let _ = module;
        server.ok_response();
    }

    /// Handle `INCLUDE-TRANSLATE`.
    fn include_translate_request(&mut self, server: &mut MapperServer, include: &str);
}

/// Configuration for [`FileResolver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Directory holding CMIs under their canonical names.
    pub repo_dir: PathBuf,
    /// Suffix appended to every CMI name.
    pub cmi_suffix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from(DEFAULT_REPO_DIR),
            cmi_suffix: DEFAULT_CMI_SUFFIX.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Set the module repository directory.
    pub fn with_repo_dir(mut self, repo_dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = repo_dir.into();
        self
    }

    /// Set the CMI filename suffix.
    pub fn with_cmi_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.cmi_suffix = suffix.into();
        self
    }
}

/// The default resolver: deterministic name mapping under a repository
/// directory, no other state.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    config: ResolverConfig,
}

impl FileResolver {
    /// Create a resolver over the given repository configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// The resolver's configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Map a module or header-unit name to its canonical CMI filename.
    ///
    /// Header units keep their path shape: an absolute path gains a
    /// leading `.` so the result is relative, and a relative header's
    /// leading `.` becomes `,`. Any `..` path component becomes `,,`,
    /// so the result cannot climb out of the repository. A named
    /// module's single `:` partition separator becomes `-`. The CMI
    /// suffix is appended last.
    pub fn cmi_name(&self, module: &str) -> String {
        let is_abs = is_absolute_path(module);
        let is_rel_header = !is_abs
            && module.as_bytes().first() == Some(&b'.')
            && module.as_bytes().get(1).is_some_and(|&b| is_dir_sep(b));

        let mut name = Vec::with_capacity(module.len() + 8);
        if is_abs {
            name.push(b'.');
        }
        name.extend_from_slice(module.as_bytes());

        if is_rel_header {
            name[0] = DOT_REPLACE;
        }
        rewrite_dot_dot(&mut name);

        if !(is_abs || is_rel_header) {
            // There can be only one partition separator.
            if let Some(colon) = name.iter().position(|&b| b == b':') {
                name[colon] = COLON_REPLACE;
            }
        }

        name.push(b'.');
        name.extend_from_slice(self.config.cmi_suffix.as_bytes());
        String::from_utf8_lossy(&name).into_owned()
    }
}

impl Resolver for FileResolver {
    fn module_repo_request(&mut self, server: &mut MapperServer) {
        server.module_repo_response(&self.config.repo_dir.display().to_string());
    }

    fn module_export_request(&mut self, server: &mut MapperServer, module: &str) {
        let cmi = self.cmi_name(module);
        server.module_cmi_response(&cmi);
    }

    fn module_import_request(&mut self, server: &mut MapperServer, module: &str) {
        let cmi = self.cmi_name(module);
        server.module_cmi_response(&cmi);
    }

    fn include_translate_request(&mut self, server: &mut MapperServer, include: &str) {
        let cmi = self.cmi_name(include);
        let candidate = self.config.repo_dir.join(&cmi);
        let translate = fs::metadata(&candidate).is_ok_and(|m| m.is_file());
        debug!(include, cmi = %cmi, translate, "include translation probe");
        if translate {
            server.module_cmi_response(&cmi);
        } else {
            server.include_translate_response(None);
        }
    }
}

#[cfg(windows)]
fn is_dir_sep(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

#[cfg(not(windows))]
fn is_dir_sep(b: u8) -> bool {
    b == b'/'
}

#[cfg(windows)]
fn is_absolute_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes.first() {
        Some(&b) if is_dir_sep(b) => true,
        Some(&b) => b.is_ascii_alphabetic() && bytes.get(1) == Some(&b':'),
        None => false,
    }
}

#[cfg(not(windows))]
fn is_absolute_path(path: &str) -> bool {
    path.as_bytes().first().is_some_and(|&b| is_dir_sep(b))
}

/// Replace every `..` path component with `,,` in place. A component
/// boundary is the string edge or a directory separator.
fn rewrite_dot_dot(name: &mut [u8]) {
    let len = name.len();
    let mut ix = 0;
    while ix + 1 < len {
        let at_start = ix == 0 || is_dir_sep(name[ix - 1]);
        let at_end = ix + 2 == len || is_dir_sep(name[ix + 2]);
        if at_start && at_end && name[ix] == b'.' && name[ix + 1] == b'.' {
            name[ix] = DOT_REPLACE;
            name[ix + 1] = DOT_REPLACE;
        }
        ix += 1;
    }
}

//! Line framing codec for the module-mapper protocol.
//!
//! The wire format is a line-oriented text framing designed to ride on
//! sockets, pipes, or in-process channels:
//!
//! - A line is a sequence of words separated by SPACE (0x20) or TAB
//!   (0x09) and terminated by NEWLINE (0x0a).
//! - Words built only from `[-+_/%.A-Za-z0-9]` travel unquoted; anything
//!   else is wrapped in single quotes with backslash escapes (`\n`,
//!   `\t`, `\\`, `\'`, and `\<hex><hex>` for other control bytes).
//!   Non-ASCII bytes pass through quoted words verbatim, so UTF-8
//!   content survives untouched.
//! - A batch spans several lines: every non-final line ends with the
//!   standalone word `;` immediately before its newline, and the final
//!   line ends with a bare newline.
//!
//! [`MessageBuffer`] is the single type: it accumulates outgoing lines,
//! performs nonblocking reads and writes against any byte stream, and
//! lexes a received batch back into word vectors with per-line recovery
//! from malformed input.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod buffer;
pub mod error;

pub use buffer::{word_needs_quoting, MessageBuffer};
pub use error::{ReadStatus, WireError, WireResult, WriteStatus};

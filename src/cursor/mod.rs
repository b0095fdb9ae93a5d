//! Forward-only pull traversal over a [`Tree`](crate::tree::Tree).

use thiserror::Error;

use crate::tree::{NodeKind, TextPos};

mod typed;
mod walk;

pub use typed::FromXmlText;
pub use walk::{AttrRef, Attributes, NamespaceDecl, TreeCursor};

/// Kind of event a [`TreeCursor`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Initial state of every cursor; never returned by
    /// [`advance`](TreeCursor::advance).
    StartDocument,
    StartElement,
    EndElement,
    Characters,
    Cdata,
    Comment,
    ProcessingInstruction,
    EntityReference,
    Doctype,
    /// Terminal state; advancing past it is an error.
    EndDocument,
}

/// Traversal switches, fixed when the cursor is built.
#[derive(Clone, Copy, Debug)]
pub struct CursorOptions {
    /// Report `xmlns` attributes as namespace declarations rather than
    /// ordinary attributes, and report name parts and namespace names.
    pub namespace_aware: bool,
    /// Merge runs of adjacent text and cdata siblings into single
    /// `Characters` events.
    pub coalescing: bool,
}

impl Default for CursorOptions {
    fn default() -> CursorOptions {
        CursorOptions {
            namespace_aware: true,
            coalescing: false,
        }
    }
}

pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Debug, Error)]
pub enum CursorError {
    /// An accessor was called on an event it does not apply to.
    #[error("{operation} is not valid on {found:?}, requires {expected}")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        found: EventKind,
    },

    #[error("index {index} out of range, {count} entries in scope")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("no more events, EndDocument was already reported")]
    Exhausted,

    #[error("cannot traverse from a {0:?} node, the root must be a document, fragment or element")]
    UnsupportedRoot(NodeKind),

    /// The tree violates a structural assumption, such as a container node
    /// appearing in element content.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("cannot decode {raw:?} as {target}{}", fmt_pos(.pos))]
    Decode {
        target: &'static str,
        raw: String,
        pos: Option<TextPos>,
    },
}

fn fmt_pos(pos: &Option<TextPos>) -> String {
    match pos {
        Some(p) => format!(" at {}", p),
        None => String::new(),
    }
}

pub(crate) fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

//! In-memory XML trees with a forward-only pull cursor.
//!
//! A [`Tree`] is an arena of typed nodes, built either programmatically or
//! by parsing a complete document with [`Tree::parse`]. A [`TreeCursor`]
//! walks a tree and reports the same events a streaming parser would
//! produce for the equivalent markup, so pull-style code works unchanged on
//! trees that are already in memory.
//!
//! ```
//! use xml_grove::{CursorOptions, EventKind, Tree, TreeCursor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = Tree::parse(r#"<feed><title>grove</title><entry id="1"/></feed>"#)?;
//!
//! let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default())?;
//! let mut titles: Vec<String> = vec![];
//! while cursor.has_next() {
//!     match cursor.advance()? {
//!         EventKind::StartElement if cursor.name()? == "title" => {
//!             titles.push(cursor.read_element_text()?);
//!         }
//!         _ => {}
//!     }
//! }
//! assert_eq!(titles, vec!["grove"]);
//! # Ok(())
//! # }
//! ```

pub mod cursor;
pub mod tree;

pub use cursor::{
    AttrRef, Attributes, CursorError, CursorOptions, CursorResult, EventKind, FromXmlText,
    NamespaceDecl, TreeCursor,
};
pub use tree::{Attr, Children, NodeId, NodeKind, ParseError, QName, TextPos, Tree, TreeError};

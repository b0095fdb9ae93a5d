use std::fmt;

use thiserror::Error;

pub mod parse;

pub use parse::ParseError;

/// Namespace name bound to the reserved `xml` prefix.
pub const NS_XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Position of a node in the text the tree was parsed from. Row and column
/// start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextPos {
    pub row: u32,
    pub col: u32,
}

impl TextPos {
    pub fn new(row: u32, col: u32) -> TextPos {
        TextPos { row, col }
    }
}

impl fmt::Display for TextPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

/// Index of a node inside its [`Tree`]. Ids are only meaningful for the tree
/// that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Structural kind of a tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Whole-document container. Only ever the root node.
    Document,
    /// Rootless container for a partial document. Only ever the root node.
    Fragment,
    Element,
    Text,
    Cdata,
    Comment,
    ProcessingInstruction,
    EntityReference,
    Doctype,
}

/// Qualified name split into its parts, plus the namespace name the prefix
/// resolved to (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QName {
    /// Name as written, `prefix:local` or bare `local`.
    pub name: String,
    pub local_name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
}

impl QName {
    /// Name with no prefix and no namespace.
    pub fn local(local_name: &str) -> QName {
        QName {
            name: local_name.to_string(),
            local_name: local_name.to_string(),
            prefix: None,
            namespace: None,
        }
    }

    /// Unprefixed name in a namespace, as under a default declaration.
    pub fn with_namespace(local_name: &str, namespace: &str) -> QName {
        QName {
            name: local_name.to_string(),
            local_name: local_name.to_string(),
            prefix: None,
            namespace: Some(namespace.to_string()),
        }
    }

    pub fn prefixed(prefix: &str, local_name: &str, namespace: &str) -> QName {
        QName {
            name: format!("{}:{}", prefix, local_name),
            local_name: local_name.to_string(),
            prefix: Some(prefix.to_string()),
            namespace: Some(namespace.to_string()),
        }
    }

    /// Prefixed name with no namespace binding, as used for `xmlns:p`
    /// declaration attributes themselves.
    pub fn with_prefix(prefix: &str, local_name: &str) -> QName {
        QName {
            name: format!("{}:{}", prefix, local_name),
            local_name: local_name.to_string(),
            prefix: Some(prefix.to_string()),
            namespace: None,
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One entry of an element's attribute list, in document order. Namespace
/// declarations are kept in the same list as ordinary attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    pub name: QName,
    pub value: String,
}

impl Attr {
    /// True for `xmlns="..."` and `xmlns:prefix="..."` entries.
    pub fn is_namespace_decl(&self) -> bool {
        self.name.prefix.as_deref() == Some("xmlns")
            || (self.name.prefix.is_none() && self.name.local_name == "xmlns")
    }

    /// Prefix a declaration binds, `None` for the default declaration.
    /// Only meaningful when [`is_namespace_decl`](Attr::is_namespace_decl)
    /// holds.
    pub fn declared_prefix(&self) -> Option<&str> {
        if self.name.prefix.as_deref() == Some("xmlns") {
            Some(&self.name.local_name)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    // Element name, processing instruction target or entity reference name.
    name: Option<QName>,
    // Text, cdata, comment content; pi data; raw doctype declaration.
    value: Option<String>,
    attributes: Vec<Attr>,
    parent: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    pos: Option<TextPos>,
}

impl NodeData {
    fn new(kind: NodeKind) -> NodeData {
        NodeData {
            kind,
            name: None,
            value: None,
            attributes: Vec::new(),
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            pos: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("{0:?} nodes cannot have children")]
    NotAContainer(NodeKind),
    #[error("attributes can only be set on elements, not on {0:?} nodes")]
    NotAnElement(NodeKind),
    #[error("doctype nodes can only appear directly under a document root")]
    MisplacedDoctype,
}

/// An XML document held in memory as an arena of nodes.
///
/// The root is always a [`NodeKind::Document`] or [`NodeKind::Fragment`]
/// node created by [`Tree::new`] or [`Tree::fragment`]; everything else
/// hangs off it. Nodes are addressed by [`NodeId`] and never move or
/// disappear once appended.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    xml_version: Option<String>,
    xml_encoding: Option<String>,
    xml_standalone: Option<bool>,
}

impl Tree {
    /// Empty tree with a document root.
    pub fn new() -> Tree {
        Tree {
            nodes: vec![NodeData::new(NodeKind::Document)],
            xml_version: None,
            xml_encoding: None,
            xml_standalone: None,
        }
    }

    /// Empty tree with a fragment root. Fragments have no well-formedness
    /// shape at the top level; any run of content nodes is fine.
    pub fn fragment() -> Tree {
        Tree {
            nodes: vec![NodeData::new(NodeKind::Fragment)],
            xml_version: None,
            xml_encoding: None,
            xml_standalone: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// First element child of the root, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|&id| self.kind(id) == NodeKind::Element)
    }

    /// `version` from the XML declaration, when the tree was parsed from
    /// text that carried one.
    pub fn xml_version(&self) -> Option<&str> {
        self.xml_version.as_deref()
    }

    pub fn xml_encoding(&self) -> Option<&str> {
        self.xml_encoding.as_deref()
    }

    pub fn xml_standalone(&self) -> Option<bool> {
        self.xml_standalone
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    /// Element name, processing instruction target or entity reference name.
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.node(id).name.as_ref()
    }

    /// Text, cdata or comment content, processing instruction data, or the
    /// raw doctype declaration.
    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.node(id).value.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.node(id).first_child.is_some()
    }

    /// Attribute list in document order, namespace declarations included.
    /// Empty for non-element nodes.
    pub fn attributes(&self, id: NodeId) -> &[Attr] {
        &self.node(id).attributes
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.first_child(id),
        }
    }

    /// Source position of a node. `None` for programmatically built nodes.
    pub fn pos(&self, id: NodeId) -> Option<TextPos> {
        self.node(id).pos
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Namespace name bound to `prefix` at `from`, found by walking towards
    /// the root. Pass `""` for the default namespace. Returns `None` when
    /// the prefix is unbound or was undeclared with an empty value.
    pub fn resolve_prefix(&self, from: NodeId, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(NS_XML_URI);
        }
        let mut cur = Some(from);
        while let Some(id) = cur {
            if self.kind(id) == NodeKind::Element {
                for attr in self.attributes(id) {
                    if !attr.is_namespace_decl() {
                        continue;
                    }
                    let bound = attr.declared_prefix().unwrap_or("");
                    if bound == prefix {
                        if attr.value.is_empty() {
                            return None;
                        }
                        return Some(&attr.value);
                    }
                }
            }
            cur = self.parent(id);
        }
        None
    }

    pub fn append_element(&mut self, parent: NodeId, name: QName) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut data = NodeData::new(NodeKind::Element);
        data.name = Some(name);
        Ok(self.append_node(parent, data))
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut data = NodeData::new(NodeKind::Text);
        data.value = Some(text.to_string());
        Ok(self.append_node(parent, data))
    }

    pub fn append_cdata(&mut self, parent: NodeId, text: &str) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut data = NodeData::new(NodeKind::Cdata);
        data.value = Some(text.to_string());
        Ok(self.append_node(parent, data))
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut data = NodeData::new(NodeKind::Comment);
        data.value = Some(text.to_string());
        Ok(self.append_node(parent, data))
    }

    pub fn append_pi(
        &mut self,
        parent: NodeId,
        target: &str,
        data: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut node = NodeData::new(NodeKind::ProcessingInstruction);
        node.name = Some(QName::local(target));
        node.value = data.map(str::to_string);
        Ok(self.append_node(parent, node))
    }

    pub fn append_entity_ref(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        self.check_container(parent)?;
        let mut data = NodeData::new(NodeKind::EntityReference);
        data.name = Some(QName::local(name));
        Ok(self.append_node(parent, data))
    }

    /// Appends a doctype node holding the raw declaration text. Doctype
    /// nodes only make sense in a document prolog, so the parent must be a
    /// document root.
    pub fn append_doctype(&mut self, parent: NodeId, raw: &str) -> Result<NodeId, TreeError> {
        if self.kind(parent) != NodeKind::Document {
            return Err(TreeError::MisplacedDoctype);
        }
        let mut data = NodeData::new(NodeKind::Doctype);
        data.value = Some(raw.to_string());
        Ok(self.append_node(parent, data))
    }

    /// Appends an attribute to an element's list. No deduplication is done;
    /// callers own well-formedness.
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        name: QName,
        value: &str,
    ) -> Result<(), TreeError> {
        let kind = self.kind(element);
        if kind != NodeKind::Element {
            return Err(TreeError::NotAnElement(kind));
        }
        self.nodes[element.0].attributes.push(Attr {
            name,
            value: value.to_string(),
        });
        Ok(())
    }

    fn check_container(&self, parent: NodeId) -> Result<(), TreeError> {
        match self.kind(parent) {
            NodeKind::Document | NodeKind::Fragment | NodeKind::Element => Ok(()),
            other => Err(TreeError::NotAContainer(other)),
        }
    }

    // Infallible append for the parser, which only ever appends under
    // container nodes.
    pub(crate) fn append_raw(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        name: Option<QName>,
        value: Option<String>,
    ) -> NodeId {
        let mut data = NodeData::new(kind);
        data.name = name;
        data.value = value;
        self.append_node(parent, data)
    }

    pub(crate) fn push_attribute(&mut self, element: NodeId, attr: Attr) {
        self.nodes[element.0].attributes.push(attr);
    }

    fn append_node(&mut self, parent: NodeId, mut data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        data.parent = Some(parent);
        data.prev_sibling = self.nodes[parent.0].last_child;
        self.nodes.push(data);
        if let Some(prev) = self.nodes[id.0].prev_sibling {
            self.nodes[prev.0].next_sibling = Some(id);
        }
        let parent_data = &mut self.nodes[parent.0];
        if parent_data.first_child.is_none() {
            parent_data.first_child = Some(id);
        }
        parent_data.last_child = Some(id);
        id
    }

    pub(crate) fn set_pos(&mut self, id: NodeId, pos: TextPos) {
        self.nodes[id.0].pos = Some(pos);
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

/// Iterator over the children of one node, in document order.
pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.next_sibling(id);
        Some(id)
    }
}

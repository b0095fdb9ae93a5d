//! The advance algorithm: tree walking as pull iteration.

use crate::cursor::{is_xml_space, CursorError, CursorOptions, CursorResult, EventKind};
use crate::tree::{Attr, NodeId, NodeKind, QName, TextPos, Tree};

/// Forward-only event cursor over a [`Tree`].
///
/// The cursor reports the tree through the same events a streaming parser
/// would produce for the equivalent markup: a StartElement/EndElement pair
/// for every element (childless ones included), Characters for text, and so
/// on. Code written against it cannot tell whether the input came from bytes
/// or from a tree that was already in memory.
///
/// A new cursor rests on a synthetic [`EventKind::StartDocument`] and is
/// driven with [`advance`](TreeCursor::advance) until it reports
/// [`EventKind::EndDocument`]; advancing further is an error. The cursor
/// never mutates the tree and holds only shared references into it, so any
/// number of cursors can traverse one tree independently.
///
/// With [`CursorOptions::coalescing`] enabled, one Characters event can
/// cover a whole run of adjacent text and cdata siblings; callers must not
/// assume a 1:1 correspondence between events and tree nodes.
#[derive(Debug)]
pub struct TreeCursor<'t> {
    tree: &'t Tree,
    options: CursorOptions,
    // node the traversal started from
    root: NodeId,
    // node the current event describes
    node: NodeId,
    event: EventKind,
    // open elements, counting the one a current Start/EndElement names
    depth: usize,
    // attribute/namespace partition of the current start element
    scope: Option<ScopeCache>,
    // merged text for the current event only
    text: Option<String>,
}

/// One ordinary attribute of the current start element, namespace
/// declarations excluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrRef<'a> {
    /// Attribute name as written, `prefix:local` or bare `local`.
    pub name: &'a str,
    pub local_name: &'a str,
    pub prefix: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub value: &'a str,
}

/// One namespace declaration of the current start element. `prefix` is
/// `None` for the default declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamespaceDecl<'a> {
    pub prefix: Option<&'a str>,
    pub uri: &'a str,
}

// The partition is valid for exactly one element scope; `element` pins the
// owner so a stale cache can never leak into another element.
#[derive(Debug)]
struct ScopeCache {
    element: NodeId,
    // indices into the element's conflated attribute list, document order
    attributes: Vec<usize>,
    namespaces: Vec<usize>,
}

// Event kind a landed node reports. Containers never appear in content.
fn classify(kind: NodeKind) -> CursorResult<EventKind> {
    match kind {
        NodeKind::Element => Ok(EventKind::StartElement),
        NodeKind::Text => Ok(EventKind::Characters),
        NodeKind::Cdata => Ok(EventKind::Cdata),
        NodeKind::Comment => Ok(EventKind::Comment),
        NodeKind::ProcessingInstruction => Ok(EventKind::ProcessingInstruction),
        NodeKind::EntityReference => Ok(EventKind::EntityReference),
        NodeKind::Doctype => Ok(EventKind::Doctype),
        NodeKind::Document | NodeKind::Fragment => Err(CursorError::MalformedTree(format!(
            "{:?} node in content",
            kind
        ))),
    }
}

// One pass over the conflated attribute list, in document order. With
// namespace awareness off every entry counts as an ordinary attribute.
fn partition(tree: &Tree, element: NodeId, namespace_aware: bool) -> ScopeCache {
    let mut scope = ScopeCache {
        element,
        attributes: Vec::new(),
        namespaces: Vec::new(),
    };
    let attrs = tree.attributes(element);
    if attrs.is_empty() {
        return scope;
    }
    for (index, attr) in attrs.iter().enumerate() {
        if namespace_aware && attr.is_namespace_decl() {
            scope.namespaces.push(index);
        } else {
            scope.attributes.push(index);
        }
    }
    scope
}

fn attr_ref(attr: &Attr, namespace_aware: bool) -> AttrRef<'_> {
    if namespace_aware {
        AttrRef {
            name: &attr.name.name,
            local_name: &attr.name.local_name,
            prefix: attr.name.prefix.as_deref(),
            namespace: attr.name.namespace.as_deref(),
            value: &attr.value,
        }
    } else {
        AttrRef {
            name: &attr.name.name,
            local_name: &attr.name.name,
            prefix: None,
            namespace: None,
            value: &attr.value,
        }
    }
}

impl<'t> TreeCursor<'t> {
    /// Builds a cursor rooted at `root`, which must be a document, fragment
    /// or element node. An element root is reported without a synthetic
    /// document wrapper: the first advance yields its StartElement.
    pub fn new(
        tree: &'t Tree,
        root: NodeId,
        options: CursorOptions,
    ) -> CursorResult<TreeCursor<'t>> {
        match tree.kind(root) {
            NodeKind::Document | NodeKind::Fragment | NodeKind::Element => Ok(TreeCursor {
                tree,
                options,
                root,
                node: root,
                event: EventKind::StartDocument,
                depth: 0,
                scope: None,
                text: None,
            }),
            other => Err(CursorError::UnsupportedRoot(other)),
        }
    }

    /// Moves to the next event and returns its kind.
    ///
    /// Fails with [`CursorError::Exhausted`] once EndDocument has been
    /// reported. One advance may pass over several tree nodes when
    /// coalescing merges a run of text siblings.
    pub fn advance(&mut self) -> CursorResult<EventKind> {
        self.text = None;
        self.scope = None;
        match self.event {
            EventKind::EndDocument => Err(CursorError::Exhausted),
            EventKind::StartDocument => match self.tree.kind(self.root) {
                NodeKind::Element => self.land(self.root),
                _ => match self.tree.first_child(self.root) {
                    Some(child) => self.land(child),
                    None => Ok(self.finish()),
                },
            },
            EventKind::StartElement => match self.tree.first_child(self.node) {
                Some(child) => self.land(child),
                None => {
                    // virtual empty element: the tree cannot distinguish
                    // <a></a> from <a/>, so the same node is reported twice
                    self.event = EventKind::EndElement;
                    Ok(EventKind::EndElement)
                }
            },
            EventKind::EndElement => {
                self.depth -= 1;
                if self.node == self.root {
                    return Ok(self.finish());
                }
                self.leave()
            }
            _ => self.leave(),
        }
    }

    // Lands on a node and classifies it. Start elements grow the depth here,
    // so a StartElement's depth already counts the element itself.
    fn land(&mut self, id: NodeId) -> CursorResult<EventKind> {
        self.node = id;
        let mut event = classify(self.tree.kind(id))?;
        match event {
            EventKind::StartElement => self.depth += 1,
            EventKind::Characters | EventKind::Cdata if self.options.coalescing => {
                self.coalesce(id);
                event = EventKind::Characters;
            }
            _ => {}
        }
        self.event = event;
        Ok(event)
    }

    // Next sibling if any, otherwise close the parent.
    fn leave(&mut self) -> CursorResult<EventKind> {
        if let Some(next) = self.tree.next_sibling(self.node) {
            return self.land(next);
        }
        match self.tree.parent(self.node) {
            Some(parent) => match self.tree.kind(parent) {
                NodeKind::Document | NodeKind::Fragment => Ok(self.finish()),
                NodeKind::Element => {
                    self.node = parent;
                    self.event = EventKind::EndElement;
                    Ok(EventKind::EndElement)
                }
                other => Err(CursorError::MalformedTree(format!(
                    "content under a {:?} node",
                    other
                ))),
            },
            None => Err(CursorError::MalformedTree(
                "node below the traversal root has no parent".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> EventKind {
        self.node = self.root;
        self.event = EventKind::EndDocument;
        EventKind::EndDocument
    }

    // Absorbs the run of text and cdata siblings starting at `first`,
    // leaving the cursor on the last node of the run so the next advance
    // resumes after it.
    fn coalesce(&mut self, first: NodeId) {
        let mut merged = self.tree.value(first).unwrap_or("").to_string();
        let mut last = first;
        while let Some(next) = self.tree.next_sibling(last) {
            match self.tree.kind(next) {
                NodeKind::Text | NodeKind::Cdata => {
                    merged.push_str(self.tree.value(next).unwrap_or(""));
                    last = next;
                }
                _ => break,
            }
        }
        self.node = last;
        self.text = Some(merged);
    }

    /// True until EndDocument has been reported.
    pub fn has_next(&self) -> bool {
        self.event != EventKind::EndDocument
    }

    /// Kind of the current event.
    pub fn event(&self) -> EventKind {
        self.event
    }

    /// Number of open elements. 0 in the prolog and epilog; a Start/End
    /// element pair both see the depth that counts their own element.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Flags the cursor was built with.
    pub fn options(&self) -> CursorOptions {
        self.options
    }

    /// Source position of the node behind the current event. `None` when
    /// the tree was built programmatically rather than parsed.
    pub fn position(&self) -> Option<TextPos> {
        self.tree.pos(self.node)
    }

    fn element_name(&self, operation: &'static str) -> CursorResult<&'t QName> {
        match self.event {
            EventKind::StartElement | EventKind::EndElement => match self.tree.name(self.node) {
                Some(name) => Ok(name),
                None => Err(CursorError::MalformedTree(
                    "element node without a name".to_string(),
                )),
            },
            found => Err(CursorError::InvalidState {
                operation,
                expected: "StartElement or EndElement",
                found,
            }),
        }
    }

    /// Element name as written, `prefix:local` or bare `local`. Valid on
    /// StartElement and EndElement.
    pub fn name(&self) -> CursorResult<&'t str> {
        Ok(&self.element_name("name")?.name)
    }

    /// Local part of the element name. Without namespace awareness the name
    /// is not split and this is the name as written.
    pub fn local_name(&self) -> CursorResult<&'t str> {
        let name = self.element_name("local_name")?;
        if self.options.namespace_aware {
            Ok(&name.local_name)
        } else {
            Ok(&name.name)
        }
    }

    /// Element name prefix, if the name has one.
    pub fn prefix(&self) -> CursorResult<Option<&'t str>> {
        let name = self.element_name("prefix")?;
        if self.options.namespace_aware {
            Ok(name.prefix.as_deref())
        } else {
            Ok(None)
        }
    }

    /// Namespace name of the element, resolved when the tree was built.
    pub fn namespace_uri(&self) -> CursorResult<Option<&'t str>> {
        let name = self.element_name("namespace_uri")?;
        if self.options.namespace_aware {
            Ok(name.namespace.as_deref())
        } else {
            Ok(None)
        }
    }

    /// Namespace name bound to `prefix` at the current element, walking
    /// outward through the declarations in scope. Pass `""` for the default
    /// namespace. Valid on StartElement and EndElement.
    pub fn namespace_for_prefix(&self, prefix: &str) -> CursorResult<Option<&'t str>> {
        match self.event {
            EventKind::StartElement | EventKind::EndElement => {
                if !self.options.namespace_aware {
                    return Ok(None);
                }
                Ok(self.tree.resolve_prefix(self.node, prefix))
            }
            found => Err(CursorError::InvalidState {
                operation: "namespace_for_prefix",
                expected: "StartElement or EndElement",
                found,
            }),
        }
    }

    /// Content of the current Characters, Cdata, Comment or Doctype event.
    /// Under coalescing this is the merged text of the whole sibling run.
    pub fn text(&self) -> CursorResult<&str> {
        match self.event {
            EventKind::Characters | EventKind::Cdata | EventKind::Comment | EventKind::Doctype => {
                match &self.text {
                    Some(merged) => Ok(merged),
                    None => Ok(self.tree.value(self.node).unwrap_or("")),
                }
            }
            found => Err(CursorError::InvalidState {
                operation: "text",
                expected: "Characters, Cdata, Comment or Doctype",
                found,
            }),
        }
    }

    /// Target of the current ProcessingInstruction event.
    pub fn pi_target(&self) -> CursorResult<&'t str> {
        match self.event {
            EventKind::ProcessingInstruction => Ok(self
                .tree
                .name(self.node)
                .map(|name| name.name.as_str())
                .unwrap_or("")),
            found => Err(CursorError::InvalidState {
                operation: "pi_target",
                expected: "ProcessingInstruction",
                found,
            }),
        }
    }

    /// Data of the current ProcessingInstruction event, if the instruction
    /// carries any.
    pub fn pi_data(&self) -> CursorResult<Option<&'t str>> {
        match self.event {
            EventKind::ProcessingInstruction => Ok(self.tree.value(self.node)),
            found => Err(CursorError::InvalidState {
                operation: "pi_data",
                expected: "ProcessingInstruction",
                found,
            }),
        }
    }

    /// Name of the entity behind the current EntityReference event.
    pub fn entity_name(&self) -> CursorResult<&'t str> {
        match self.event {
            EventKind::EntityReference => Ok(self
                .tree
                .name(self.node)
                .map(|name| name.name.as_str())
                .unwrap_or("")),
            found => Err(CursorError::InvalidState {
                operation: "entity_name",
                expected: "EntityReference",
                found,
            }),
        }
    }

    // Partition of the current start element, computed on first use and
    // kept until the traversal leaves the element.
    fn scope(&mut self, operation: &'static str) -> CursorResult<&ScopeCache> {
        if self.event != EventKind::StartElement {
            return Err(CursorError::InvalidState {
                operation,
                expected: "StartElement",
                found: self.event,
            });
        }
        if self.scope.as_ref().map_or(false, |s| s.element != self.node) {
            self.scope = None;
        }
        let tree = self.tree;
        let node = self.node;
        let namespace_aware = self.options.namespace_aware;
        Ok(self
            .scope
            .get_or_insert_with(|| partition(tree, node, namespace_aware)))
    }

    /// Number of ordinary attributes of the current start element.
    pub fn attribute_count(&mut self) -> CursorResult<usize> {
        Ok(self.scope("attribute_count")?.attributes.len())
    }

    /// The `index`th ordinary attribute of the current start element, in
    /// document order.
    pub fn attribute(&mut self, index: usize) -> CursorResult<AttrRef<'t>> {
        let tree = self.tree;
        let namespace_aware = self.options.namespace_aware;
        let scope = self.scope("attribute")?;
        let tree_index = match scope.attributes.get(index) {
            Some(&tree_index) => tree_index,
            None => {
                return Err(CursorError::IndexOutOfRange {
                    index,
                    count: scope.attributes.len(),
                })
            }
        };
        Ok(attr_ref(
            &tree.attributes(scope.element)[tree_index],
            namespace_aware,
        ))
    }

    /// Iterator over the ordinary attributes of the current start element.
    pub fn attributes(&mut self) -> CursorResult<Attributes<'_, 't>> {
        let tree = self.tree;
        let namespace_aware = self.options.namespace_aware;
        let scope = self.scope("attributes")?;
        Ok(Attributes {
            tree,
            element: scope.element,
            indices: scope.attributes.iter(),
            namespace_aware,
        })
    }

    /// Number of namespace declarations on the current start element.
    /// Always 0 without namespace awareness.
    pub fn namespace_count(&mut self) -> CursorResult<usize> {
        Ok(self.scope("namespace_count")?.namespaces.len())
    }

    /// The `index`th namespace declaration of the current start element, in
    /// document order.
    pub fn namespace_decl(&mut self, index: usize) -> CursorResult<NamespaceDecl<'t>> {
        let tree = self.tree;
        let scope = self.scope("namespace_decl")?;
        let tree_index = match scope.namespaces.get(index) {
            Some(&tree_index) => tree_index,
            None => {
                return Err(CursorError::IndexOutOfRange {
                    index,
                    count: scope.namespaces.len(),
                })
            }
        };
        let attr = &tree.attributes(scope.element)[tree_index];
        Ok(NamespaceDecl {
            prefix: attr.declared_prefix(),
            uri: &attr.value,
        })
    }

    /// Collects all text up to the matching end tag.
    ///
    /// The cursor must be on a StartElement. Text and cdata content is
    /// concatenated, comments and processing instructions are skipped, and
    /// any other event before the matching EndElement is an error. On
    /// success the cursor rests on the matching EndElement.
    pub fn read_element_text(&mut self) -> CursorResult<String> {
        if self.event != EventKind::StartElement {
            return Err(CursorError::InvalidState {
                operation: "read_element_text",
                expected: "StartElement",
                found: self.event,
            });
        }
        let mut out = String::new();
        loop {
            match self.advance()? {
                EventKind::Characters | EventKind::Cdata => out.push_str(self.text()?),
                EventKind::Comment | EventKind::ProcessingInstruction => {}
                EventKind::EndElement => return Ok(out),
                found => {
                    return Err(CursorError::InvalidState {
                        operation: "read_element_text",
                        expected: "text content, Comment or ProcessingInstruction",
                        found,
                    })
                }
            }
        }
    }

    /// Advances past whitespace-only text, comments and processing
    /// instructions, stopping on the next StartElement or EndElement.
    /// Anything else before a tag is an error.
    pub fn advance_to_tag(&mut self) -> CursorResult<EventKind> {
        loop {
            match self.advance()? {
                EventKind::StartElement | EventKind::EndElement => return Ok(self.event),
                EventKind::Characters | EventKind::Cdata => {
                    if !self.text()?.chars().all(is_xml_space) {
                        return Err(CursorError::InvalidState {
                            operation: "advance_to_tag",
                            expected: "StartElement or EndElement",
                            found: self.event,
                        });
                    }
                }
                EventKind::Comment | EventKind::ProcessingInstruction => {}
                found => {
                    return Err(CursorError::InvalidState {
                        operation: "advance_to_tag",
                        expected: "StartElement or EndElement",
                        found,
                    })
                }
            }
        }
    }
}

/// Iterator over the ordinary attributes of one start element, in document
/// order.
pub struct Attributes<'c, 't> {
    tree: &'t Tree,
    element: NodeId,
    indices: std::slice::Iter<'c, usize>,
    namespace_aware: bool,
}

impl<'c, 't> Iterator for Attributes<'c, 't> {
    type Item = AttrRef<'t>;

    fn next(&mut self) -> Option<AttrRef<'t>> {
        let &tree_index = self.indices.next()?;
        Some(attr_ref(
            &self.tree.attributes(self.element)[tree_index],
            self.namespace_aware,
        ))
    }
}

#[cfg(test)]
fn kinds_of(tree: &Tree, options: CursorOptions) -> Vec<EventKind> {
    let mut cursor = TreeCursor::new(tree, tree.root(), options).unwrap();
    let mut kinds = vec![];
    while cursor.has_next() {
        kinds.push(cursor.advance().unwrap());
    }
    kinds
}

#[test]
fn test_walk_smoke() {
    let tree = Tree::parse("<r><a x='1'/>text<b>t</b></r>").unwrap();
    use EventKind::*;
    assert_eq!(
        kinds_of(&tree, CursorOptions::default()),
        vec![
            StartElement, // r
            StartElement, // a
            EndElement,
            Characters,
            StartElement, // b
            Characters,
            EndElement,
            EndElement,
            EndDocument,
        ]
    );
}

#[test]
fn test_classify_rejects_containers() {
    assert!(matches!(
        classify(NodeKind::Document),
        Err(CursorError::MalformedTree(_))
    ));
    assert!(matches!(
        classify(NodeKind::Fragment),
        Err(CursorError::MalformedTree(_))
    ));
    assert_eq!(classify(NodeKind::Text).unwrap(), EventKind::Characters);
}

#[test]
fn test_depth_counts_open_elements() {
    let tree = Tree::parse("<r>a<b><c/></b></r>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    let mut seen = vec![];
    while cursor.has_next() {
        let event = cursor.advance().unwrap();
        seen.push((event, cursor.depth()));
    }
    use EventKind::*;
    assert_eq!(
        seen,
        vec![
            (StartElement, 1), // r
            (Characters, 1),
            (StartElement, 2), // b
            (StartElement, 3), // c
            (EndElement, 3),
            (EndElement, 2),
            (EndElement, 1),
            (EndDocument, 0),
        ]
    );
}

#[test]
fn test_exhausted_cursor_keeps_failing() {
    let tree = Tree::parse("<r/>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    while cursor.has_next() {
        cursor.advance().unwrap();
    }
    assert!(matches!(cursor.advance(), Err(CursorError::Exhausted)));
    assert!(matches!(cursor.advance(), Err(CursorError::Exhausted)));
}

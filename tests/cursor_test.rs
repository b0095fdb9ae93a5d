use xml_grove::{CursorError, CursorOptions, EventKind, NodeKind, QName, Tree, TreeCursor};

struct MyCollector {
    start_counter: usize,
    end_counter: usize,
    start_el_name_vec: Vec<String>,
    end_el_name_vec: Vec<String>,
    // characters can arrive split or merged depending on coalescing, so
    // they are collected per event
    characters_collected_vec: Vec<String>,
    characters_buf: String,
    kinds: Vec<EventKind>,
    depths: Vec<usize>,
}

fn collect_with_cursor(tree: &Tree, options: CursorOptions) -> MyCollector {
    let mut data = MyCollector {
        start_counter: 0,
        end_counter: 0,
        start_el_name_vec: Vec::new(),
        end_el_name_vec: Vec::new(),
        characters_collected_vec: Vec::new(),
        characters_buf: String::new(),
        kinds: Vec::new(),
        depths: Vec::new(),
    };

    let mut cursor = TreeCursor::new(tree, tree.root(), options).unwrap();

    loop {
        let res = cursor.advance();
        // println!("{:?}", res);
        match res {
            Ok(event) => {
                data.kinds.push(event);
                data.depths.push(cursor.depth());
                match event {
                    EventKind::StartElement => {
                        data.start_counter += 1;
                        data.start_el_name_vec.push(cursor.name().unwrap().to_owned());
                    }
                    EventKind::EndElement => {
                        data.end_counter += 1;
                        data.end_el_name_vec.push(cursor.name().unwrap().to_owned());
                    }
                    EventKind::Characters | EventKind::Cdata => {
                        let chars = cursor.text().unwrap();
                        data.characters_buf.push_str(chars);
                        data.characters_collected_vec.push(chars.to_string());
                    }
                    EventKind::EndDocument => {
                        break;
                    }
                    _ => {}
                }
            }
            Err(err) => {
                panic!("{}", err);
            }
        }
    }

    data
}

#[test]
fn test_basic() {
    let tree = Tree::parse("<rootEl><value>5</value></rootEl>").unwrap();

    let data = collect_with_cursor(&tree, CursorOptions::default());

    assert_eq!(data.start_counter, 2);
    assert_eq!(data.end_counter, 2);
    assert_eq!(data.start_el_name_vec, vec!["rootEl", "value"]);
    assert_eq!(data.end_el_name_vec, vec!["value", "rootEl"]);
    assert_eq!(data.characters_buf, "5");
}

#[test]
fn test_start_end_events_balance() {
    let tree = Tree::parse(
        "<shelf><book genre=\"ref\"><title>T</title><blurb/></book><book/></shelf>",
    )
    .unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    let mut open: Vec<String> = Vec::new();
    let mut max_depth = 0;
    while cursor.has_next() {
        match cursor.advance().unwrap() {
            EventKind::StartElement => {
                open.push(cursor.name().unwrap().to_owned());
                assert_eq!(cursor.depth(), open.len());
            }
            EventKind::EndElement => {
                let name = open.pop().unwrap();
                assert_eq!(cursor.name().unwrap(), name);
                assert_eq!(cursor.depth(), open.len() + 1);
            }
            EventKind::EndDocument => {
                assert_eq!(cursor.depth(), 0);
            }
            _ => {
                assert!(cursor.depth() > 0);
            }
        }
        max_depth = max_depth.max(cursor.depth());
    }
    assert!(open.is_empty());
    assert_eq!(max_depth, 3);
}

// A childless element cannot be told apart from <a></a> in the tree, and
// the cursor hides the difference the other way around: both produce a
// start/end pair without a second node.
#[test]
fn test_empty_element_gets_both_events() {
    let mut tree = Tree::new();
    let root = tree.root();
    let outer = tree.append_element(root, QName::local("outer")).unwrap();
    tree.append_element(outer, QName::local("empty")).unwrap();
    assert_eq!(tree.node_count(), 3);

    let data = collect_with_cursor(&tree, CursorOptions::default());
    assert_eq!(
        data.kinds,
        vec![
            EventKind::StartElement,
            EventKind::StartElement,
            EventKind::EndElement,
            EventKind::EndElement,
            EventKind::EndDocument,
        ]
    );
    assert_eq!(data.start_el_name_vec, vec!["outer", "empty"]);
    assert_eq!(data.end_el_name_vec, vec!["empty", "outer"]);
}

#[test]
fn test_coalescing_merges_adjacent_text() {
    let mut tree = Tree::new();
    let root = tree.root();
    let e = tree.append_element(root, QName::local("e")).unwrap();
    tree.append_text(e, "ab").unwrap();
    tree.append_text(e, "cd").unwrap();

    let split = collect_with_cursor(&tree, CursorOptions::default());
    assert_eq!(split.characters_collected_vec, vec!["ab", "cd"]);

    let merged = collect_with_cursor(
        &tree,
        CursorOptions {
            coalescing: true,
            ..CursorOptions::default()
        },
    );
    assert_eq!(merged.characters_collected_vec, vec!["abcd"]);
    // both traversals see the same content
    assert_eq!(merged.characters_buf, split.characters_buf);
}

#[test]
fn test_coalescing_covers_cdata_and_stops_at_markup() {
    let tree = Tree::parse("<e>one<![CDATA[two]]><!--x-->three</e>").unwrap();

    let data = collect_with_cursor(
        &tree,
        CursorOptions {
            coalescing: true,
            ..CursorOptions::default()
        },
    );
    assert_eq!(data.characters_collected_vec, vec!["onetwo", "three"]);
    assert_eq!(
        data.kinds,
        vec![
            EventKind::StartElement,
            EventKind::Characters,
            EventKind::Comment,
            EventKind::Characters,
            EventKind::EndElement,
            EventKind::EndDocument,
        ]
    );

    // a run that begins with cdata is still reported as Characters
    let tree = Tree::parse("<e><![CDATA[a]]>b</e>").unwrap();
    let data = collect_with_cursor(
        &tree,
        CursorOptions {
            coalescing: true,
            ..CursorOptions::default()
        },
    );
    assert_eq!(data.kinds[1], EventKind::Characters);
    assert_eq!(data.characters_collected_vec, vec!["ab"]);
}

#[test]
fn test_read_element_text_skips_comments_and_pis() {
    let tree = Tree::parse("<e>foo<!--c--><?skip me?>bar</e>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    assert_eq!(cursor.advance().unwrap(), EventKind::StartElement);
    assert_eq!(cursor.read_element_text().unwrap(), "foobar");
    // the cursor rests on the matching end tag
    assert_eq!(cursor.event(), EventKind::EndElement);
    assert_eq!(cursor.name().unwrap(), "e");
    assert_eq!(cursor.advance().unwrap(), EventKind::EndDocument);
}

#[test]
fn test_read_element_text_of_empty_element() {
    let tree = Tree::parse("<e/>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    cursor.advance().unwrap();
    assert_eq!(cursor.read_element_text().unwrap(), "");
    assert_eq!(cursor.event(), EventKind::EndElement);
}

#[test]
fn test_read_element_text_rejects_child_elements() {
    let tree = Tree::parse("<e>a<child/>b</e>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    cursor.advance().unwrap();

    let err = cursor.read_element_text().unwrap_err();
    assert!(matches!(
        err,
        CursorError::InvalidState {
            found: EventKind::StartElement,
            ..
        }
    ));
}

#[test]
fn test_read_element_text_rejects_entity_references() {
    let tree = Tree::parse("<e>a&unknown;b</e>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    cursor.advance().unwrap();

    let err = cursor.read_element_text().unwrap_err();
    assert!(matches!(
        err,
        CursorError::InvalidState {
            found: EventKind::EntityReference,
            ..
        }
    ));
}

#[test]
fn test_element_root_needs_no_wrapper() {
    let tree = Tree::parse("<doc><inner>x</inner></doc>").unwrap();
    let inner = tree.first_child(tree.document_element().unwrap()).unwrap();
    assert_eq!(tree.kind(inner), NodeKind::Element);

    let mut cursor = TreeCursor::new(&tree, inner, CursorOptions::default()).unwrap();
    assert_eq!(cursor.advance().unwrap(), EventKind::StartElement);
    assert_eq!(cursor.name().unwrap(), "inner");
    assert_eq!(cursor.depth(), 1);
    assert_eq!(cursor.advance().unwrap(), EventKind::Characters);
    assert_eq!(cursor.advance().unwrap(), EventKind::EndElement);
    assert_eq!(cursor.advance().unwrap(), EventKind::EndDocument);
    assert!(!cursor.has_next());
}

#[test]
fn test_text_node_root_is_rejected() {
    let mut tree = Tree::new();
    let root = tree.root();
    let e = tree.append_element(root, QName::local("e")).unwrap();
    let text = tree.append_text(e, "x").unwrap();

    let err = TreeCursor::new(&tree, text, CursorOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        CursorError::UnsupportedRoot(NodeKind::Text)
    ));
}

#[test]
fn test_prolog_and_epilog_run_at_depth_zero() {
    let s = "<?xml version=\"1.0\"?><!DOCTYPE d><!--before--><?pi data?><d/><!--after-->";
    let tree = Tree::parse(s).unwrap();

    let data = collect_with_cursor(&tree, CursorOptions::default());
    assert_eq!(
        data.kinds,
        vec![
            EventKind::Doctype,
            EventKind::Comment,
            EventKind::ProcessingInstruction,
            EventKind::StartElement,
            EventKind::EndElement,
            EventKind::Comment,
            EventKind::EndDocument,
        ]
    );
    assert_eq!(data.depths, vec![0, 0, 0, 1, 1, 0, 0]);
}

#[test]
fn test_parsed_and_built_trees_drive_identical_events() {
    let parsed = Tree::parse("<list n=\"2\"><item>a</item><item/></list>").unwrap();

    let mut built = Tree::new();
    let root = built.root();
    let list = built.append_element(root, QName::local("list")).unwrap();
    built.set_attribute(list, QName::local("n"), "2").unwrap();
    let item = built.append_element(list, QName::local("item")).unwrap();
    built.append_text(item, "a").unwrap();
    built.append_element(list, QName::local("item")).unwrap();

    let a = collect_with_cursor(&parsed, CursorOptions::default());
    let b = collect_with_cursor(&built, CursorOptions::default());
    assert_eq!(a.kinds, b.kinds);
    assert_eq!(a.depths, b.depths);
    assert_eq!(a.start_el_name_vec, b.start_el_name_vec);
    assert_eq!(a.characters_collected_vec, b.characters_collected_vec);
}

#[test]
fn test_fragment_root_walks_its_content_run() {
    let mut tree = Tree::fragment();
    let root = tree.root();
    tree.append_text(root, "lead").unwrap();
    let e = tree.append_element(root, QName::local("e")).unwrap();
    tree.append_text(e, "x").unwrap();
    tree.append_comment(root, "tail").unwrap();

    let data = collect_with_cursor(&tree, CursorOptions::default());
    assert_eq!(
        data.kinds,
        vec![
            EventKind::Characters,
            EventKind::StartElement,
            EventKind::Characters,
            EventKind::EndElement,
            EventKind::Comment,
            EventKind::EndDocument,
        ]
    );
    assert_eq!(data.depths, vec![0, 1, 1, 1, 0, 0]);
}

#[test]
fn test_childless_document_ends_immediately() {
    let tree = Tree::new();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    assert!(cursor.has_next());
    assert_eq!(cursor.advance().unwrap(), EventKind::EndDocument);
    assert!(!cursor.has_next());
    assert!(matches!(cursor.advance(), Err(CursorError::Exhausted)));
}

#[test]
fn test_advance_to_tag_skips_ignorable_content() {
    let tree = Tree::parse("<r>\n  <!--c-->\n  <a>1</a>\n</r>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    assert_eq!(cursor.advance().unwrap(), EventKind::StartElement);
    assert_eq!(cursor.advance_to_tag().unwrap(), EventKind::StartElement);
    assert_eq!(cursor.name().unwrap(), "a");
    assert_eq!(cursor.read_element_text().unwrap(), "1");
    assert_eq!(cursor.advance_to_tag().unwrap(), EventKind::EndElement);
    assert_eq!(cursor.name().unwrap(), "r");
}

#[test]
fn test_advance_to_tag_rejects_real_text() {
    let tree = Tree::parse("<r>solid<a/></r>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    cursor.advance().unwrap();

    let err = cursor.advance_to_tag().unwrap_err();
    assert!(matches!(
        err,
        CursorError::InvalidState {
            found: EventKind::Characters,
            ..
        }
    ));
}

#[test]
fn test_accessors_reject_incompatible_events() {
    let tree = Tree::parse("<e>x</e>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    cursor.advance().unwrap(); // <e>
    let err = cursor.text().unwrap_err();
    assert!(matches!(
        err,
        CursorError::InvalidState {
            found: EventKind::StartElement,
            ..
        }
    ));

    cursor.advance().unwrap(); // "x"
    let err = cursor.name().unwrap_err();
    assert!(matches!(
        err,
        CursorError::InvalidState {
            found: EventKind::Characters,
            ..
        }
    ));
    let err = cursor.pi_target().unwrap_err();
    assert!(matches!(err, CursorError::InvalidState { .. }));
}

#[test]
fn test_several_cursors_share_one_tree() {
    let tree = Tree::parse("<e><a/><b/></e>").unwrap();
    let mut one = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    let mut two = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    one.advance().unwrap(); // <e>
    one.advance().unwrap(); // <a>
    assert_eq!(two.advance().unwrap(), EventKind::StartElement);
    assert_eq!(two.name().unwrap(), "e");
    assert_eq!(one.name().unwrap(), "a");
}

#[test]
fn test_pi_and_entity_accessors() {
    let tree = Tree::parse("<e><?target some data?>&chapter;</e>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();
    cursor.advance().unwrap();

    assert_eq!(
        cursor.advance().unwrap(),
        EventKind::ProcessingInstruction
    );
    assert_eq!(cursor.pi_target().unwrap(), "target");
    assert_eq!(cursor.pi_data().unwrap(), Some("some data"));

    assert_eq!(cursor.advance().unwrap(), EventKind::EntityReference);
    assert_eq!(cursor.entity_name().unwrap(), "chapter");
}

#[test]
fn test_comment_and_doctype_text() {
    let tree = Tree::parse("<!DOCTYPE d SYSTEM \"d.dtd\"><d><!-- note --></d>").unwrap();
    let mut cursor = TreeCursor::new(&tree, tree.root(), CursorOptions::default()).unwrap();

    assert_eq!(cursor.advance().unwrap(), EventKind::Doctype);
    assert_eq!(cursor.text().unwrap(), "<!DOCTYPE d SYSTEM \"d.dtd\">");
    cursor.advance().unwrap(); // <d>
    assert_eq!(cursor.advance().unwrap(), EventKind::Comment);
    assert_eq!(cursor.text().unwrap(), " note ");
}

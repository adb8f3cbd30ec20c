//! HTML parsing, serialization, and DOM construction helpers built on
//! `html5ever` + `markup5ever_rcdom` — the combination the retrieval pack's
//! `html_to_markdown`-style crates use for mutable, `Rc`-linked HTML trees.

use std::cell::RefCell;
use std::rc::Rc;

use bundler_err::BundlerErr;
use html5ever::interface::QualName;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, parse_document, parse_fragment, serialize};
use markup5ever::Attribute;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

pub fn parse_document_str(url: &str, source: &str) -> Result<RcDom, BundlerErr> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut source.as_bytes())
        .map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))?;
    Ok(dom)
}

/// Parse `source` as an HTML fragment (no implied `<html>`/`<head>`/`<body>`),
/// used when inlining an imported document's children into a host document.
pub fn parse_fragment_str(url: &str, source: &str) -> Result<Vec<Handle>, BundlerErr> {
    let context = qual_html("body");
    let dom = parse_fragment(RcDom::default(), Default::default(), context, vec![])
        .from_utf8()
        .read_from(&mut source.as_bytes())
        .map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))?;
    Ok(dom.document.children.borrow().clone())
}

pub fn serialize_document(dom: &RcDom) -> String {
    serialize_handle(dom.document.clone())
}

pub fn serialize_handle(handle: Handle) -> String {
    let mut out = Vec::new();
    let serializable: SerializableHandle = handle.into();
    serialize(&mut out, &serializable, Default::default()).expect("serialization to Vec<u8> never fails");
    String::from_utf8(out).expect("html5ever always emits valid utf8")
}

pub fn qual_html(local: &str) -> QualName {
    QualName::new(None, ns!(html), local.into())
}

fn qual_attr(local: &str) -> QualName {
    QualName::new(None, ns!(), local.into())
}

pub fn new_element(tag: &str, attrs: Vec<(&str, String)>) -> Handle {
    let attrs = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: qual_attr(name),
            value: StrTendril::from(value.as_str()),
        })
        .collect();
    Node::new(NodeData::Element {
        name: qual_html(tag),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

pub fn is_element(node: &Handle, tag: &str) -> bool {
    matches!(&node.data, NodeData::Element { name, .. } if name.local.as_ref() == tag)
}

pub fn get_attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref() == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(a) = attrs.iter_mut().find(|a| a.name.local.as_ref() == name) {
            a.value = StrTendril::from(value);
        } else {
            attrs.push(Attribute {
                name: qual_attr(name),
                value: StrTendril::from(value),
            });
        }
    }
}

pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|a| a.name.local.as_ref() != name);
    }
}

pub fn has_attr(node: &Handle, name: &str) -> bool {
    get_attr(node, name).is_some()
}

pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

pub fn is_comment(node: &Handle) -> bool {
    matches!(node.data, NodeData::Comment { .. })
}

pub fn comment_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Comment { contents } => Some(contents.to_string()),
        _ => None,
    }
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// Concatenated content of `node`'s direct text-node children. Not a
/// recursive innerText, but sufficient for leaf content containers like
/// `<style>`/`<script>`, the only places this pipeline reads text content.
pub fn text_of(node: &Handle) -> String {
    node.children
        .borrow()
        .iter()
        .filter_map(|c| match &c.data {
            NodeData::Text { contents } => Some(contents.borrow().to_string()),
            _ => None,
        })
        .collect()
}

/// Replaces all of `node`'s children with a single text node containing
/// `text`.
pub fn set_text_of(node: &Handle, text: &str) {
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children {
        detach(&child);
    }
    append_child(node, new_text(text));
}

/// A `<template>` element's content lives in a separate fragment
/// (`template_contents`), not in `.children` — the HTML5 template element
/// model keeps inert content out of the main tree. Returns `None` if the
/// fragment hasn't been created yet (a freshly-built `<template>` via
/// [`new_element`] has none).
pub fn template_content(node: &Handle) -> Option<Handle> {
    match &node.data {
        NodeData::Element {
            template_contents, ..
        } => template_contents.borrow().clone(),
        _ => None,
    }
}

/// Returns `node`'s content fragment, creating an empty one first if it
/// doesn't have one yet. Panics if `node` isn't an element.
pub fn ensure_template_content(node: &Handle) -> Handle {
    if let Some(existing) = template_content(node) {
        return existing;
    }
    let fragment = Node::new(NodeData::Document);
    match &node.data {
        NodeData::Element {
            template_contents, ..
        } => *template_contents.borrow_mut() = Some(fragment.clone()),
        _ => panic!("ensure_template_content called on a non-element node"),
    }
    fragment
}

/// Finds the first descendant (pre-order, depth-first, including `node`
/// itself) matching `tag`.
pub fn find_first(node: &Handle, tag: &str) -> Option<Handle> {
    if is_element(node, tag) {
        return Some(node.clone());
    }
    for child in node.children.borrow().iter() {
        if let Some(found) = find_first(child, tag) {
            return Some(found);
        }
    }
    None
}

/// Collects every descendant (pre-order, depth-first, including `node`
/// itself) matching `tag`.
pub fn find_all(node: &Handle, tag: &str) -> Vec<Handle> {
    let mut out = Vec::new();
    find_all_into(node, tag, &mut out);
    out
}

fn find_all_into(node: &Handle, tag: &str, out: &mut Vec<Handle>) {
    if is_element(node, tag) {
        out.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        find_all_into(child, tag, out);
    }
}

/// Collects every descendant element or text node (pre-order, depth-first).
pub fn walk_all(node: &Handle, out: &mut Vec<Handle>) {
    out.push(node.clone());
    for child in node.children.borrow().iter() {
        walk_all(child, out);
    }
}

pub fn parent_of(node: &Handle) -> Option<Handle> {
    node.parent.take().map(|weak| {
        let strong = weak.upgrade();
        node.parent.set(Some(weak));
        strong
    })?
}

pub fn index_in_parent(node: &Handle) -> Option<usize> {
    let parent = parent_of(node)?;
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, node))
}

pub fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, node));
        node.parent.set(None);
    }
}

fn set_parent(child: &Handle, parent: &Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
}

pub fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    set_parent(&child, parent);
    parent.children.borrow_mut().push(child);
}

pub fn insert_before(reference: &Handle, new_node: Handle) {
    let Some(parent) = parent_of(reference) else {
        return;
    };
    detach(&new_node);
    set_parent(&new_node, &parent);
    let mut children = parent.children.borrow_mut();
    let idx = children
        .iter()
        .position(|c| Rc::ptr_eq(c, reference))
        .unwrap_or(children.len());
    children.insert(idx, new_node);
}

pub fn insert_after(reference: &Handle, new_node: Handle) {
    let Some(parent) = parent_of(reference) else {
        return;
    };
    detach(&new_node);
    set_parent(&new_node, &parent);
    let mut children = parent.children.borrow_mut();
    let idx = children
        .iter()
        .position(|c| Rc::ptr_eq(c, reference))
        .map(|i| i + 1)
        .unwrap_or(children.len());
    children.insert(idx, new_node);
}

/// Replaces `node` in its parent's child list with `replacements`, in order.
pub fn replace_with_many(node: &Handle, replacements: Vec<Handle>) {
    let Some(parent) = parent_of(node) else {
        return;
    };
    for r in &replacements {
        set_parent(r, &parent);
    }
    let mut children = parent.children.borrow_mut();
    if let Some(idx) = children.iter().position(|c| Rc::ptr_eq(c, node)) {
        children.splice(idx..=idx, replacements);
    }
    drop(children);
    node.parent.set(None);
}

pub fn prepend_child(parent: &Handle, child: Handle) {
    detach(&child);
    set_parent(&child, parent);
    parent.children.borrow_mut().insert(0, child);
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_serialize_round_trips_structure() {
        let dom = parse_document_str(
            "index.html",
            "<!DOCTYPE html><html><head></head><body><p>hi</p></body></html>",
        )
        .unwrap();
        let html = find_first(&dom.document, "html").unwrap();
        assert!(find_first(&html, "body").is_some());
        assert!(find_first(&html, "p").is_some());
    }

    #[test]
    fn attribute_roundtrip() {
        let link = new_element("link", vec![("rel", "import".to_string())]);
        assert_eq!(get_attr(&link, "rel").as_deref(), Some("import"));
        set_attr(&link, "href", "foo.html");
        assert_eq!(get_attr(&link, "href").as_deref(), Some("foo.html"));
        remove_attr(&link, "href");
        assert_eq!(get_attr(&link, "href"), None);
    }

    #[test]
    fn text_of_round_trips_through_set_text_of() {
        let style = new_element("style", vec![]);
        set_text_of(&style, "body { color: red; }");
        assert_eq!(text_of(&style), "body { color: red; }");
        set_text_of(&style, "p { color: blue; }");
        assert_eq!(text_of(&style), "p { color: blue; }");
    }

    #[test]
    fn template_content_starts_empty_and_is_created_on_demand() {
        let template = new_element("template", vec![]);
        assert!(template_content(&template).is_none());
        let content = ensure_template_content(&template);
        append_child(&content, new_text("hi"));
        assert!(Rc::ptr_eq(&ensure_template_content(&template), &content));
    }

    #[test]
    fn replace_with_many_preserves_siblings() {
        let parent = new_element("div", vec![]);
        let a = new_text("a");
        let mid = new_element("link", vec![]);
        let b = new_text("b");
        append_child(&parent, a);
        append_child(&parent, mid.clone());
        append_child(&parent, b);

        replace_with_many(&mid, vec![new_text("x"), new_text("y")]);
        let kids = parent.children.borrow();
        assert_eq!(kids.len(), 4);
    }
}

//! Owned XML element tree.
//!
//! Built on quick-xml's namespace-aware reader. Every element keeps its
//! resolved namespace URI, so a subtree can be cloned out of one document and
//! written into another: the writer re-declares any prefix that is not in
//! scope at the point of output.
//!
//! quick-xml never expands external entities; DOCTYPE declarations are
//! rejected outright.

use crate::constants::ANY_NAMESPACE;
use crate::error::XRoadError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use std::collections::HashMap;
use tracing::warn;

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

impl Attribute {
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Prefix used when writing (`None` = default namespace or unqualified)
    pub prefix: Option<String>,
    /// Local name
    pub name: String,
    /// Namespace URI (`None` = no namespace)
    pub namespace: Option<String>,
    /// `xmlns` declarations made on this element
    pub namespace_declarations: Vec<(Option<String>, String)>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an unqualified element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element in `namespace`. An empty prefix means the default namespace.
    pub fn qualified(name: impl Into<String>, prefix: Option<&str>, namespace: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            name: name.into(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.add_text(text);
        self
    }

    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// Declare `prefix` → `uri` on this element, replacing an earlier binding of the same prefix.
    pub fn declare_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        let prefix = normalize_prefix(prefix);
        match self
            .namespace_declarations
            .iter_mut()
            .find(|(existing, _)| *existing == prefix)
        {
            Some(binding) => binding.1 = uri.to_string(),
            None => self.namespace_declarations.push((prefix, uri.to_string())),
        }
    }

    /// Set an unqualified attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.put_attribute(Attribute {
            prefix: None,
            name: name.to_string(),
            namespace: None,
            value: value.into(),
        });
    }

    /// Set a namespace-qualified attribute.
    pub fn set_attribute_ns(
        &mut self,
        prefix: &str,
        namespace: &str,
        name: &str,
        value: impl Into<String>,
    ) {
        self.put_attribute(Attribute {
            prefix: normalize_prefix(Some(prefix)),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
    }

    fn put_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name == attribute.name && a.namespace == attribute.namespace)
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Value of an attribute that has no namespace.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Append a child element and return a handle to it.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        let index = self.children.len();
        self.children.push(Node::Element(child));
        match &mut self.children[index] {
            Node::Element(element) => element,
            Node::Text(_) => unreachable!("element was just pushed"),
        }
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name, any namespace.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.name == name)
    }

    /// Does this element have local name `name` in `namespace` (`*` matches any)?
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.name == name
            && (namespace == ANY_NAMESPACE || self.namespace.as_deref() == Some(namespace))
    }

    /// All descendant elements matching `namespace`/`name`, in document order.
    pub fn elements_by_name_ns(&self, namespace: &str, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        collect_descendants(self, namespace, name, &mut found);
        found
    }

    /// Concatenated text of this element and all descendants.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        append_text(self, &mut text);
        text
    }

    /// Move this element and every descendant element into `namespace`.
    ///
    /// The declaration is made once, on this element.
    pub fn apply_namespace(&mut self, prefix: Option<&str>, namespace: &str) {
        self.declare_namespace(prefix, namespace);
        let prefix = normalize_prefix(prefix);
        rename_recursive(self, &prefix, namespace);
    }

    /// Drop `namespace` from this element and its descendants.
    pub fn strip_namespace(&mut self, namespace: &str) {
        self.namespace_declarations.retain(|(_, uri)| uri != namespace);
        if self.namespace.as_deref() == Some(namespace) {
            self.namespace = None;
            self.prefix = None;
        }
        for child in self.child_elements_mut() {
            child.strip_namespace(namespace);
        }
    }
}

fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix.filter(|p| !p.is_empty()).map(String::from)
}

fn collect_descendants<'a>(element: &'a Element, namespace: &str, name: &str, found: &mut Vec<&'a Element>) {
    for child in element.child_elements() {
        if child.matches(namespace, name) {
            found.push(child);
        }
        collect_descendants(child, namespace, name, found);
    }
}

fn append_text(element: &Element, text: &mut String) {
    for node in &element.children {
        match node {
            Node::Element(child) => append_text(child, text),
            Node::Text(value) => text.push_str(value),
        }
    }
}

fn rename_recursive(element: &mut Element, prefix: &Option<String>, namespace: &str) {
    element.prefix = prefix.clone();
    element.namespace = Some(namespace.to_string());
    for child in element.child_elements_mut() {
        child.namespace_declarations.retain(|(bound, _)| bound != prefix);
        rename_recursive(child, prefix, namespace);
    }
}

/// Flatten an element's descendants into a `local name → text` map.
///
/// Leaf elements without text map to an empty string; text is trimmed; a
/// later element with the same name overwrites an earlier one.
pub fn nodes_to_map(element: &Element, upper_case: bool) -> HashMap<String, String> {
    let mut map = HashMap::new();
    collect_map(element, upper_case, &mut map);
    map
}

fn collect_map(parent: &Element, upper_case: bool, map: &mut HashMap<String, String>) {
    let key = |name: &str| {
        if upper_case {
            name.to_uppercase()
        } else {
            name.to_string()
        }
    };
    for node in &parent.children {
        match node {
            Node::Element(child) if child.has_children() => collect_map(child, upper_case, map),
            Node::Element(child) => {
                map.insert(key(&child.name), String::new());
            }
            Node::Text(text) => {
                let value = text.trim();
                if !value.is_empty() {
                    map.insert(key(&parent.name), value.to_string());
                }
            }
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse an XML document and return its root element.
///
/// Text is kept as written; only whitespace-only runs are dropped.
pub fn parse(xml: &str) -> Result<Element, XRoadError> {
    let mut reader = NsReader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            XRoadError::XmlParse(format!("{} at position {}", e, reader.buffer_position()))
        })?;

        match event {
            Event::Start(ref start) => stack.push(element_from_start(&reader, start)?),
            Event::Empty(ref start) => {
                let element = element_from_start(&reader, start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XRoadError::XmlParse("Unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(ref text) => {
                let value = text
                    .unescape()
                    .map_err(|e| XRoadError::XmlParse(e.to_string()))?;
                // whitespace between elements is layout, not content
                if value.trim().is_empty() {
                    continue;
                }
                if let Some(parent) = stack.last_mut() {
                    parent.add_text(value.into_owned());
                }
            }
            Event::CData(ref data) => {
                let value = std::str::from_utf8(data)
                    .map_err(|e| XRoadError::XmlParse(format!("Invalid UTF-8: {}", e)))?;
                if let Some(parent) = stack.last_mut() {
                    parent.add_text(value);
                }
            }
            Event::DocType(_) => {
                return Err(XRoadError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XRoadError::XmlParse("Unclosed element at end of document".to_string()));
    }
    root.ok_or_else(|| XRoadError::XmlParse("Document has no root element".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XRoadError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XRoadError::XmlParse("Multiple root elements".to_string())),
    }
}

fn element_from_start(reader: &NsReader<&[u8]>, start: &BytesStart<'_>) -> Result<Element, XRoadError> {
    let (resolved, local) = reader.resolve_element(start.name());
    let mut element = Element {
        prefix: start.name().prefix().map(|p| utf8(p.as_ref())).transpose()?,
        name: utf8(local.as_ref())?,
        namespace: namespace_of(resolved)?,
        ..Default::default()
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XRoadError::XmlParse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| XRoadError::XmlParse(e.to_string()))?
            .into_owned();
        match attr.key.as_namespace_binding() {
            Some(PrefixDeclaration::Default) => element.namespace_declarations.push((None, value)),
            Some(PrefixDeclaration::Named(prefix)) => {
                element.namespace_declarations.push((Some(utf8(prefix)?), value))
            }
            None => {
                let (resolved, local) = reader.resolve_attribute(attr.key);
                element.attributes.push(Attribute {
                    prefix: attr.key.prefix().map(|p| utf8(p.as_ref())).transpose()?,
                    name: utf8(local.as_ref())?,
                    namespace: namespace_of(resolved)?,
                    value,
                });
            }
        }
    }
    Ok(element)
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>, XRoadError> {
    match resolved {
        ResolveResult::Bound(ns) => utf8(ns.as_ref()).map(Some),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(XRoadError::XmlParse(format!(
            "Undeclared namespace prefix \"{}\"",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, XRoadError> {
    std::str::from_utf8(bytes)
        .map(String::from)
        .map_err(|e| XRoadError::XmlParse(format!("Invalid UTF-8: {}", e)))
}

// ============================================================================
// Writing
// ============================================================================

type Scope = Vec<(Option<String>, String)>;

/// Serialize an element tree, without an XML declaration.
pub fn write(element: &Element) -> Result<String, XRoadError> {
    let mut writer = Writer::new(Vec::new());
    let mut scope = Scope::new();
    write_element(&mut writer, element, &mut scope)?;
    String::from_utf8(writer.into_inner()).map_err(|e| XRoadError::XmlWrite(e.to_string()))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    scope: &mut Scope,
) -> Result<(), XRoadError> {
    let mark = scope.len();
    let name = element.qualified_name();
    let mut start = BytesStart::new(name.as_str());

    for (prefix, uri) in &element.namespace_declarations {
        // the element's own binding wins over a stale declaration of its prefix
        let shadows_element = element.namespace.is_some()
            && *prefix == element.prefix
            && element.namespace.as_deref() != Some(uri.as_str());
        if !shadows_element && lookup(scope, prefix.as_deref()) != Some(uri.as_str()) {
            declare(&mut start, scope, mark, prefix.as_deref(), uri);
        }
    }
    match &element.namespace {
        Some(namespace) => {
            if lookup(scope, element.prefix.as_deref()) != Some(namespace.as_str()) {
                declare(&mut start, scope, mark, element.prefix.as_deref(), namespace);
            }
        }
        // an unqualified element must not inherit a default namespace
        None if element.prefix.is_none() && lookup(scope, None).is_some_and(|uri| !uri.is_empty()) => {
            declare(&mut start, scope, mark, None, "");
        }
        None => {}
    }
    for attr in &element.attributes {
        if let (Some(prefix), Some(namespace)) = (&attr.prefix, &attr.namespace) {
            if prefix != "xml" && lookup(scope, Some(prefix)) != Some(namespace.as_str()) {
                declare(&mut start, scope, mark, Some(prefix), namespace);
            }
        }
        start.push_attribute((attr.qualified_name().as_str(), attr.value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_error)?;
    } else {
        writer.write_event(Event::Start(start)).map_err(write_error)?;
        for child in &element.children {
            match child {
                Node::Element(child) => write_element(writer, child, scope)?,
                Node::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(write_error)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(write_error)?;
    }

    scope.truncate(mark);
    Ok(())
}

/// Declare `prefix` on this tag unless the tag already binds it.
fn declare(start: &mut BytesStart<'_>, scope: &mut Scope, mark: usize, prefix: Option<&str>, uri: &str) {
    if scope[mark..].iter().any(|(bound, _)| bound.as_deref() == prefix) {
        warn!(prefix = ?prefix, uri, "Namespace prefix already bound on this element, skipping declaration");
        return;
    }
    push_declaration(start, scope, prefix, uri);
}

fn push_declaration(start: &mut BytesStart<'_>, scope: &mut Scope, prefix: Option<&str>, uri: &str) {
    let key = match prefix {
        Some(prefix) => format!("xmlns:{}", prefix),
        None => "xmlns".to_string(),
    };
    start.push_attribute((key.as_str(), uri));
    scope.push((prefix.map(String::from), uri.to_string()));
}

fn lookup<'s>(scope: &'s Scope, prefix: Option<&str>) -> Option<&'s str> {
    scope
        .iter()
        .rev()
        .find(|(bound, _)| bound.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn write_error(e: impl std::fmt::Display) -> XRoadError {
    XRoadError::XmlWrite(e.to_string())
}

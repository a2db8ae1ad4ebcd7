//! XML document handling
//!
//! Instance documents and schema documents are both parsed into an owned
//! element tree with resolved namespaces. Every element carries a
//! [`NodeId`] assigned in document order; the type resolver, the model
//! builder and the populator key their per-node state on it.

use std::path::Path;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, QName};

/// Identity of an element within one parsed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Attribute with a resolved name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute qualified name (unprefixed attributes have no namespace)
    pub qname: QName,
    /// Attribute value
    pub value: String,
}

/// XML Element in the document tree
#[derive(Debug, Clone)]
pub struct Element {
    /// Document-order identity
    pub id: NodeId,
    /// Element qualified name
    pub qname: QName,
    /// Element attributes, in document order, without namespace declarations
    pub attributes: Vec<Attribute>,
    /// Text content, trimmed; `None` when blank
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
    /// In-scope namespace bindings
    pub namespaces: Arc<NamespaceContext>,
}

impl Element {
    /// Create a new element
    pub fn new(id: NodeId, qname: QName) -> Self {
        Self {
            id,
            qname,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            namespaces: Arc::new(NamespaceContext::new()),
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace.as_deref()
    }

    /// Get an attribute value by local name, ignoring its namespace
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.qname.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Get an attribute value by qualified name
    pub fn get_attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.qname == qname)
            .map(|a| a.value.as_str())
    }

    /// Text content if it is not blank
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Find child elements by local name
    pub fn find_children<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |e| e.local_name() == local_name)
    }

    /// Find the element with the given id in this subtree
    pub fn find(&self, id: NodeId) -> Option<&Element> {
        if self.id == id {
            return Some(self);
        }
        // ids are assigned in document order, so only one child can contain it
        let idx = self.children.partition_point(|c| c.id <= id);
        idx.checked_sub(1).and_then(|i| self.children[i].find(id))
    }

    /// Iterate over this element and all its descendants in document order
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(elem) = stack.pop() {
            out.push(elem);
            stack.extend(elem.children.iter().rev());
        }
        out
    }
}

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element of the document
    pub root: Element,
    /// Number of elements in the document
    pub node_count: usize,
}

impl Document {
    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes(), &Limits::default())
    }

    /// Read and parse an XML document from a file
    pub fn from_file(path: impl AsRef<Path>, limits: &Limits) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
        })?;
        Self::parse(&bytes, limits)
    }

    /// Parse an XML document from bytes
    pub fn parse(xml: &[u8], limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = NsReader::from_reader(xml);
        let mut element_stack: Vec<(Element, String)> = Vec::new();
        let mut root: Option<Element> = None;
        let mut next_id = 0usize;
        let mut buf = Vec::new();

        loop {
            let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
                Ok(pair) => pair,
                Err(e) => return Err(Error::Xml(format!("Error parsing XML: {}", e))),
            };
            match event {
                Event::Start(e) => {
                    let namespace = namespace_uri(resolved)?;
                    limits.check_xml_depth(element_stack.len() + 1)?;
                    let scope = current_scope(&element_stack);
                    let element = open_element(&reader, &e, namespace, scope, NodeId(next_id), limits)?;
                    next_id += 1;
                    element_stack.push((element, String::new()));
                }
                Event::Empty(e) => {
                    let namespace = namespace_uri(resolved)?;
                    limits.check_xml_depth(element_stack.len() + 1)?;
                    let scope = current_scope(&element_stack);
                    let element = open_element(&reader, &e, namespace, scope, NodeId(next_id), limits)?;
                    next_id += 1;
                    close_element(&mut element_stack, &mut root, element)?;
                }
                Event::End(_) => {
                    if let Some((mut current, text)) = element_stack.pop() {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            current.text = Some(trimmed.to_string());
                        }
                        close_element(&mut element_stack, &mut root, current)?;
                    }
                }
                Event::Text(e) => {
                    if let Some((_, text)) = element_stack.last_mut() {
                        let unescaped = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(e) => {
                    if let Some((_, text)) = element_stack.last_mut() {
                        text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {} // comments, processing instructions, doctype
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| Error::Xml("Document has no root element".to_string()))?;
        Ok(Document {
            root,
            node_count: next_id,
        })
    }

    /// Get the root element
    pub fn root(&self) -> &Element {
        &self.root
    }
}

fn namespace_uri(resolved: ResolveResult) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.as_ref()).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::Xml(format!(
            "Unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn current_scope(stack: &[(Element, String)]) -> Arc<NamespaceContext> {
    stack
        .last()
        .map(|(e, _)| Arc::clone(&e.namespaces))
        .unwrap_or_default()
}

fn close_element(
    stack: &mut [(Element, String)],
    root: &mut Option<Element>,
    element: Element,
) -> Result<()> {
    if let Some((parent, _)) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(Error::Xml("Document has more than one root element".to_string()));
    }
    Ok(())
}

/// Build an element from a start tag
fn open_element(
    reader: &NsReader<&[u8]>,
    start: &BytesStart,
    namespace: Option<String>,
    scope: Arc<NamespaceContext>,
    id: NodeId,
    limits: &Limits,
) -> Result<Element> {
    let local = std::str::from_utf8(start.local_name().as_ref())
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
        .to_string();

    let mut element = Element::new(id, QName::new(namespace, local));
    let mut declared: Option<NamespaceContext> = None;

    for attr_result in start.attributes() {
        let attr = attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
            .to_string();

        let raw_key = attr.key.as_ref();
        if raw_key == b"xmlns" {
            declared
                .get_or_insert_with(|| scope.as_ref().clone())
                .set_default_namespace(value);
            continue;
        }
        if let Some(prefix) = raw_key.strip_prefix(b"xmlns:") {
            declared
                .get_or_insert_with(|| scope.as_ref().clone())
                .add_prefix(String::from_utf8_lossy(prefix).into_owned(), value);
            continue;
        }

        let (resolved, local) = reader.resolve_attribute(attr.key);
        let attr_namespace = namespace_uri(resolved)?;
        let attr_local = std::str::from_utf8(local.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?;
        element.attributes.push(Attribute {
            qname: QName::new(attr_namespace, attr_local),
            value,
        });
    }

    limits.check_attributes(element.attributes.len())?;
    element.namespaces = declared.map(Arc::new).unwrap_or(scope);
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root();
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].local_name(), "child");
        assert_eq!(root.children[0].text(), Some("text"));
        assert_eq!(doc.node_count, 2);
    }

    #[test]
    fn test_parse_with_attributes() {
        let xml = r#"<root attr1="value1" attr2="a &amp; b"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root();
        assert_eq!(root.get_attribute("attr1"), Some("value1"));
        assert_eq!(root.get_attribute("attr2"), Some("a & b"));
    }

    #[test]
    fn test_namespaces_are_resolved() {
        let xml = r#"<app:root xmlns:app="urn:app" xmlns:gml="http://www.opengis.net/gml/3.2"
                          xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                          gml:id="r1" xsi:nil="false">
                        <app:child plain="1"/>
                     </app:root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root();
        assert_eq!(root.qname, QName::namespaced("urn:app", "root"));
        assert_eq!(
            root.get_attribute_qname(&QName::namespaced(crate::namespaces::GML32_NAMESPACE, "id")),
            Some("r1")
        );
        // xmlns declarations are not attributes
        assert_eq!(root.attributes.len(), 2);

        let child = &root.children[0];
        assert_eq!(child.namespace(), Some("urn:app"));
        assert_eq!(child.attributes[0].qname, QName::local("plain"));
        assert_eq!(child.namespaces.get_namespace("app"), Some("urn:app"));
    }

    #[test]
    fn test_blank_text_is_none_and_mixed_text_is_joined() {
        let xml = "<root>\n  <a>  </a><b>x<![CDATA[<y>]]></b></root>";
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.root().children[0].text(), None);
        assert_eq!(doc.root().children[1].text(), Some("x<y>"));
        assert_eq!(doc.root().text(), None);
    }

    #[test]
    fn test_node_ids_and_find() {
        let xml = r#"<r><a><b/><c/></a><d><e/></d></r>"#;
        let doc = Document::from_string(xml).unwrap();
        let names: Vec<_> = doc.root().descendants().iter().map(|e| e.local_name().to_string()).collect();
        assert_eq!(names, vec!["r", "a", "b", "c", "d", "e"]);

        assert_eq!(doc.root().find(NodeId(3)).unwrap().local_name(), "c");
        assert_eq!(doc.root().find(NodeId(5)).unwrap().local_name(), "e");
        assert!(doc.root().find(NodeId(6)).is_none());
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits {
            max_xml_depth: 2,
            ..Limits::default()
        };
        assert!(Document::parse(b"<a><b/></a>", &limits).is_ok());
        assert!(matches!(
            Document::parse(b"<a><b><c/></b></a>", &limits),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_unknown_prefix_fails() {
        assert!(Document::from_string("<x:root/>").is_err());
        assert!(Document::from_string("").is_err());
    }
}

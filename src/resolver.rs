//! Type resolution of instance documents
//!
//! Binds every element of an instance document to its declaration and
//! type in a [`SchemaCatalog`]. The result, a [`NodeTypeMap`], is the
//! type annotation both the model builder and the populator walk.
//!
//! Binding is strict: a child with no matching declaration in its
//! parent's content model, or an attribute the type does not declare, is
//! a schema resolution error. Attributes in the `xsi`, `xlink` and `xml`
//! namespaces never need a declaration. Geometry subtrees are bound at
//! their root only; their content belongs to the geometry codec.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::documents::{Element, NodeId};
use crate::error::{BindingError, Error, Result};
use crate::namespaces::{is_reserved_attribute_namespace, QName, XSI_NAMESPACE};
use crate::schema::{ElementDecl, MaxOccurs, Occurs, SchemaCatalog, SimpleKind, TypeDef};

/// Type annotation of every element of a document, keyed by node id
pub type NodeTypeMap = HashMap<NodeId, TypeInfo>;

/// Resolved attribute of an instance element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Attribute name as found in the document
    pub name: QName,
    /// Value space
    pub kind: SimpleKind,
    /// Whether the type requires the attribute
    pub required: bool,
}

/// Declaration, type and cardinality bound to one element
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Concrete element declaration
    pub element: Arc<ElementDecl>,
    /// Effective type (after `xsi:type`)
    pub type_def: Arc<TypeDef>,
    /// Effective minOccurs of the matching particle
    pub min_occurs: u32,
    /// Effective maxOccurs of the matching particle
    pub max_occurs: MaxOccurs,
    /// Value space of the text content, for simple content only
    pub content: Option<SimpleKind>,
    /// Whether the type is a GML geometry
    pub is_geometry: bool,
    /// Whether the declaration is `nillable`
    pub nillable: bool,
    /// Whether the type declares an attribute named `id`
    pub declares_id: bool,
    /// Attributes present on the element, keyed by local name
    pub attributes: IndexMap<String, AttributeInfo>,
    /// Abstract head the element substitutes for
    pub substitutes_for: Option<Arc<ElementDecl>>,
}

impl TypeInfo {
    /// Whether the element may occur more than once
    pub fn is_repeated(&self) -> bool {
        self.max_occurs.is_many()
    }

    /// Whether the element carries text-only content
    pub fn is_simple(&self) -> bool {
        self.content.is_some()
    }

    /// Local name of the substitution group head, if any
    pub fn substitution_group(&self) -> Option<&str> {
        self.substitutes_for.as_ref().map(|h| h.name.local_name.as_str())
    }
}

/// Bind `root` and all its descendants to their schema declarations
pub fn resolve(root: &Element, catalog: &SchemaCatalog) -> Result<NodeTypeMap> {
    let span = tracing::debug_span!("resolve", root = %root.qname);
    let _enter = span.enter();

    let decl = catalog.lookup_element(&root.qname).ok_or_else(|| {
        Error::resolution(
            BindingError::new("no global declaration for the document root").with_tag(root.qname.to_string()),
        )
    })?;

    let mut resolver = Resolver {
        catalog,
        types: NodeTypeMap::new(),
    };
    resolver.resolve_node(root, decl, Occurs::once(), None)?;
    tracing::debug!(nodes = resolver.types.len(), "document resolved");
    Ok(resolver.types)
}

struct Resolver<'a> {
    catalog: &'a SchemaCatalog,
    types: NodeTypeMap,
}

impl Resolver<'_> {
    fn resolve_node(
        &mut self,
        elem: &Element,
        decl: Arc<ElementDecl>,
        occurs: Occurs,
        substitutes_for: Option<Arc<ElementDecl>>,
    ) -> Result<()> {
        let declared = self.catalog.element_type(&decl)?;
        let type_def = self.instance_type(elem, declared)?;
        let is_geometry = self.catalog.is_geometry_type(&type_def);

        let mut attributes = IndexMap::new();
        let mut declares_id = false;
        if !is_geometry {
            let uses = self.catalog.attribute_uses(&type_def)?;
            declares_id = uses.keys().any(|name| name.local_name == "id");
            let open = self.catalog.has_any_attribute(&type_def);

            for attr in &elem.attributes {
                let namespace = attr.qname.namespace();
                if namespace == Some(XSI_NAMESPACE) {
                    continue;
                }
                let info = if let Some(binding) = uses.get(&attr.qname) {
                    AttributeInfo {
                        name: attr.qname.clone(),
                        kind: self.catalog.attribute_kind(&binding.decl),
                        required: binding.required,
                    }
                } else if open || is_reserved_attribute_namespace(namespace) {
                    AttributeInfo {
                        name: attr.qname.clone(),
                        kind: SimpleKind::string(),
                        required: false,
                    }
                } else {
                    return Err(Error::resolution(
                        BindingError::new(format!("attribute not declared by type {}", type_def.display_name()))
                            .with_tag(elem.qname.to_string())
                            .with_xpath(format!("@{}", attr.qname.local_name)),
                    ));
                };
                attributes.insert(attr.qname.local_name.clone(), info);
            }
        }

        let info = TypeInfo {
            nillable: decl.nillable,
            element: decl,
            content: self.catalog.simple_kind(&type_def),
            type_def: Arc::clone(&type_def),
            min_occurs: occurs.min,
            max_occurs: occurs.max,
            is_geometry,
            declares_id,
            attributes,
            substitutes_for,
        };
        self.types.insert(elem.id, info);

        if is_geometry {
            return Ok(());
        }

        for child in &elem.children {
            let found = self.catalog.find_child(&type_def, &child.qname)?.ok_or_else(|| {
                Error::resolution(
                    BindingError::new(format!(
                        "no declaration in the content model of {} {}",
                        elem.qname,
                        type_def.display_name()
                    ))
                    .with_tag(child.qname.to_string()),
                )
            })?;
            self.resolve_node(child, found.element, found.occurs, found.substitutes_for)?;
        }
        Ok(())
    }

    /// Declared type, or the `xsi:type` named on the element when it derives from it
    fn instance_type(&self, elem: &Element, declared: Arc<TypeDef>) -> Result<Arc<TypeDef>> {
        let value = match elem.get_attribute_qname(&QName::namespaced(XSI_NAMESPACE, "type")) {
            Some(value) => value,
            None => return Ok(declared),
        };
        let name = elem.namespaces.resolve(value)?;
        let actual = self.catalog.lookup_type(&name).ok_or_else(|| {
            Error::resolution(
                BindingError::new(format!("unknown xsi:type {}", name)).with_tag(elem.qname.to_string()),
            )
        })?;
        if !self.catalog.derives_from(&actual, &declared) {
            return Err(Error::resolution(
                BindingError::new(format!(
                    "xsi:type {} does not derive from {}",
                    name,
                    declared.display_name()
                ))
                .with_tag(elem.qname.to_string()),
            ));
        }
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use pretty_assertions::assert_eq;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="a">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="b" type="xs:string"/>
                <xs:element name="c" type="WithId" minOccurs="0"/>
                <xs:element name="n" type="xs:int" minOccurs="0" maxOccurs="unbounded"/>
                <xs:element ref="Item" minOccurs="0" maxOccurs="3"/>
                <xs:element name="open" minOccurs="0"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
    <xs:complexType name="WithId">
        <xs:sequence><xs:element name="d" type="xs:string"/></xs:sequence>
        <xs:attribute name="id" type="xs:ID"/>
    </xs:complexType>
    <xs:complexType name="Special">
        <xs:complexContent>
            <xs:extension base="WithId">
                <xs:sequence><xs:element name="e" type="xs:boolean"/></xs:sequence>
            </xs:extension>
        </xs:complexContent>
    </xs:complexType>
    <xs:element name="Item" type="xs:string" abstract="true"/>
    <xs:element name="Label" type="xs:string" substitutionGroup="Item"/>
    <xs:element name="free" type="xs:string"/>
</xs:schema>"#;

    fn resolve_str(xml: &str) -> Result<(Document, NodeTypeMap)> {
        let catalog = SchemaCatalog::from_string(XSD)?;
        let doc = Document::from_string(xml)?;
        let types = resolve(doc.root(), &catalog)?;
        Ok((doc, types))
    }

    #[test]
    fn test_every_node_is_bound() {
        let (doc, types) = resolve_str(r#"<a><b>txt</b><c id="5"><d>x</d></c><n>1</n><n>2</n></a>"#).unwrap();
        assert_eq!(types.len(), doc.node_count);

        let b = &types[&NodeId(1)];
        assert_eq!(b.content, Some(SimpleKind::string()));
        assert!(!b.is_repeated());

        let c = &types[&NodeId(2)];
        assert!(c.declares_id);
        assert!(!c.is_simple());
        assert_eq!(c.min_occurs, 0);
        assert_eq!(c.attributes["id"].kind, SimpleKind::Atomic("ID".to_string()));

        let n = &types[&NodeId(4)];
        assert_eq!(n.max_occurs, MaxOccurs::Unbounded);
        assert_eq!(n.content, Some(SimpleKind::Atomic("int".to_string())));
    }

    #[test]
    fn test_substitution_member() {
        let (_, types) = resolve_str("<a><b/><Label>x</Label><Label>y</Label></a>").unwrap();
        let label = &types[&NodeId(2)];
        assert_eq!(label.element.name, QName::local("Label"));
        assert_eq!(label.substitution_group(), Some("Item"));
        assert_eq!(label.max_occurs, MaxOccurs::Bounded(3));
    }

    #[test]
    fn test_undeclared_child_is_fatal() {
        let err = resolve_str("<a><b/><zzz/></a>").unwrap_err();
        match err {
            Error::SchemaResolution(binding) => assert_eq!(binding.tag.as_deref(), Some("zzz")),
            other => panic!("unexpected error {:?}", other),
        }
        // the abstract head never appears itself
        assert!(resolve_str("<a><b/><Item>x</Item></a>").is_err());
        assert!(resolve_str("<unknown/>").is_err());
    }

    #[test]
    fn test_attributes() {
        let xml = r##"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                        xmlns:xlink="http://www.w3.org/1999/xlink"
                        xsi:noNamespaceSchemaLocation="x.xsd"><b xlink:href="#x"/></a>"##;
        let (_, types) = resolve_str(xml).unwrap();
        assert!(types[&NodeId(0)].attributes.is_empty());
        let href = &types[&NodeId(1)].attributes["href"];
        assert_eq!(href.kind, SimpleKind::string());
        assert!(!href.required);

        let err = resolve_str(r#"<a><b undeclared="1"/></a>"#).unwrap_err();
        assert!(matches!(err, Error::SchemaResolution(ref b) if b.xpath.as_deref() == Some("@undeclared")));
    }

    #[test]
    fn test_untyped_element_is_open() {
        let (_, types) = resolve_str(r#"<a><b/><open any="1"><free>x</free></open></a>"#).unwrap();
        assert_eq!(types[&NodeId(2)].attributes["any"].kind, SimpleKind::string());
        assert_eq!(types[&NodeId(3)].element.name, QName::local("free"));
    }

    #[test]
    fn test_xsi_type() {
        let xml = r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><b/>
                        <c xsi:type="Special"><d>x</d><e>true</e></c></a>"#;
        let (_, types) = resolve_str(xml).unwrap();
        assert_eq!(types[&NodeId(2)].type_def.name(), Some(&QName::local("Special")));
        assert_eq!(types[&NodeId(4)].content, Some(SimpleKind::Atomic("boolean".to_string())));

        let bad = r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><b/><c xsi:type="xs:string"/></a>"#;
        assert!(resolve_str(bad).is_err());
    }
}

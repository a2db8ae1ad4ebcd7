//! XSD document parsing
//!
//! Turns one `xs:schema` document into schema components. Import and
//! include references are collected, not followed; the catalog loads
//! them with its worklist.

use std::sync::Arc;

use super::components::{
    AttributeDecl, AttributeGroupDef, AttributeRef, AttributeUse, ComplexTypeDef, ContentKind,
    Derivation, ElementDecl, ElementRef, MaxOccurs, Occurs, Particle, SimpleTypeDef, Term, TypeDef,
    TypeRef, Variety,
};
use crate::documents::Element;
use crate::error::{Error, ParseError, Result};
use crate::locations::Location;
use crate::namespaces::{QName, XSD_NAMESPACE};

/// XSD element names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const EXTENSION: &str = "extension";
    pub const RESTRICTION: &str = "restriction";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const GROUP: &str = "group";
    pub const ANY: &str = "any";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
}

/// A parsed schema document, before it is merged into the catalog
#[derive(Debug, Default)]
pub struct ParsedSchema {
    /// Effective target namespace (the includer's for chameleon includes)
    pub target_namespace: Option<String>,
    /// Global element declarations
    pub elements: Vec<Arc<ElementDecl>>,
    /// Global type definitions
    pub types: Vec<Arc<TypeDef>>,
    /// Global attribute declarations
    pub attributes: Vec<Arc<AttributeDecl>>,
    /// Named attribute groups
    pub attribute_groups: Vec<(QName, Arc<AttributeGroupDef>)>,
    /// Named model groups
    pub groups: Vec<(QName, Arc<Particle>)>,
    /// `xs:import` (namespace, schemaLocation)
    pub imports: Vec<(Option<String>, Option<String>)>,
    /// `xs:include` / `xs:redefine` schemaLocations
    pub includes: Vec<String>,
}

/// Parser state for one schema document
struct SchemaParser<'a> {
    target_namespace: Option<String>,
    chameleon: bool,
    element_form_qualified: bool,
    attribute_form_qualified: bool,
    location: &'a Location,
}

/// Parse an `xs:schema` root element
///
/// `includer_namespace` is the target namespace of the including schema
/// when this document is reached through `xs:include`.
pub fn parse_schema(
    root: &Element,
    location: &Location,
    includer_namespace: Option<&str>,
) -> Result<ParsedSchema> {
    if root.local_name() != xsd_elements::SCHEMA || root.namespace() != Some(XSD_NAMESPACE) {
        return Err(Error::Parse(
            ParseError::new(format!("Expected xs:schema root element, got {}", root.qname))
                .with_location(location.to_string()),
        ));
    }

    let declared = root.get_attribute("targetNamespace").map(|s| s.to_string());
    let chameleon = declared.is_none() && includer_namespace.is_some();
    let parser = SchemaParser {
        target_namespace: declared.or_else(|| includer_namespace.map(|s| s.to_string())),
        chameleon,
        element_form_qualified: root.get_attribute("elementFormDefault") == Some("qualified"),
        attribute_form_qualified: root.get_attribute("attributeFormDefault") == Some("qualified"),
        location,
    };

    let mut parsed = ParsedSchema {
        target_namespace: parser.target_namespace.clone(),
        ..ParsedSchema::default()
    };

    for child in &root.children {
        parser.parse_schema_child(&mut parsed, child)?;
    }

    Ok(parsed)
}

impl SchemaParser<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse(ParseError::new(message).with_location(self.location.to_string()))
    }

    fn parse_schema_child(&self, parsed: &mut ParsedSchema, elem: &Element) -> Result<()> {
        match elem.local_name() {
            xsd_elements::ELEMENT => {
                let decl = self.parse_element_decl(elem, true)?;
                parsed.elements.push(Arc::new(decl));
            }
            xsd_elements::COMPLEX_TYPE => {
                let name = self.required_name(elem)?;
                parsed.types.push(Arc::new(self.parse_complex_type(elem, Some(name))?));
            }
            xsd_elements::SIMPLE_TYPE => {
                let name = self.required_name(elem)?;
                parsed.types.push(Arc::new(self.parse_simple_type(elem, Some(name))?));
            }
            xsd_elements::ATTRIBUTE => {
                let name = self.required_name(elem)?;
                parsed.attributes.push(Arc::new(AttributeDecl {
                    name,
                    type_ref: self.attribute_type(elem)?,
                }));
            }
            xsd_elements::ATTRIBUTE_GROUP => {
                let name = self.required_name(elem)?;
                let mut group = AttributeGroupDef::default();
                self.parse_attributes(elem, &mut group.attributes, &mut group.attribute_groups, &mut group.any_attribute)?;
                parsed.attribute_groups.push((name, Arc::new(group)));
            }
            xsd_elements::GROUP => {
                let name = self.required_name(elem)?;
                let particle = self
                    .find_content_model(elem)?
                    .unwrap_or_else(|| Particle::new(Occurs::once(), Term::Sequence(Vec::new())));
                parsed.groups.push((name, Arc::new(particle)));
            }
            xsd_elements::IMPORT => {
                parsed.imports.push((
                    elem.get_attribute("namespace").map(|s| s.to_string()),
                    elem.get_attribute("schemaLocation").map(|s| s.to_string()),
                ));
            }
            xsd_elements::INCLUDE | xsd_elements::REDEFINE => match elem.get_attribute("schemaLocation") {
                Some(loc) => parsed.includes.push(loc.to_string()),
                None => return Err(self.error(format!("xs:{} missing schemaLocation", elem.local_name()))),
            },
            _ => {} // annotations, notations
        }
        Ok(())
    }

    /// Qualified name in the target namespace from the `name` attribute
    fn required_name(&self, elem: &Element) -> Result<QName> {
        let name = elem
            .get_attribute("name")
            .ok_or_else(|| self.error(format!("Global xs:{} missing 'name' attribute", elem.local_name())))?;
        Ok(QName::new(self.target_namespace.clone(), name))
    }

    /// Resolve a QName-valued attribute against the element's namespace scope
    fn resolve_qname(&self, elem: &Element, value: &str) -> Result<QName> {
        let mut qname = elem
            .namespaces
            .resolve(value)
            .map_err(|e| self.error(format!("Cannot resolve '{}': {}", value, e)))?;
        if self.chameleon && qname.namespace.is_none() {
            qname.namespace = self.target_namespace.clone();
        }
        Ok(qname)
    }

    fn qname_attribute(&self, elem: &Element, attr: &str) -> Result<Option<QName>> {
        elem.get_attribute(attr)
            .map(|value| self.resolve_qname(elem, value))
            .transpose()
    }

    fn parse_element_decl(&self, elem: &Element, global: bool) -> Result<ElementDecl> {
        let local = elem
            .get_attribute("name")
            .ok_or_else(|| self.error("Element declaration missing 'name' attribute"))?;

        let qualified = global
            || match elem.get_attribute("form") {
                Some(form) => form == "qualified",
                None => self.element_form_qualified,
            };
        let name = if qualified {
            QName::new(self.target_namespace.clone(), local)
        } else {
            QName::local(local)
        };

        let type_ref = match self.qname_attribute(elem, "type")? {
            Some(type_name) => Some(TypeRef::Named(type_name)),
            None => self.inline_type(elem)?,
        };

        let mut decl = ElementDecl::new(name, type_ref);
        decl.global = global;
        decl.is_abstract = elem.get_attribute("abstract") == Some("true");
        decl.nillable = elem.get_attribute("nillable") == Some("true");
        decl.substitution_group = self.qname_attribute(elem, "substitutionGroup")?;
        Ok(decl)
    }

    /// Anonymous type defined as a child of an element or attribute
    fn inline_type(&self, elem: &Element) -> Result<Option<TypeRef>> {
        for child in &elem.children {
            match child.local_name() {
                xsd_elements::COMPLEX_TYPE => {
                    return Ok(Some(TypeRef::Anonymous(Arc::new(self.parse_complex_type(child, None)?))))
                }
                xsd_elements::SIMPLE_TYPE => {
                    return Ok(Some(TypeRef::Anonymous(Arc::new(self.parse_simple_type(child, None)?))))
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn attribute_type(&self, elem: &Element) -> Result<Option<TypeRef>> {
        match self.qname_attribute(elem, "type")? {
            Some(type_name) => Ok(Some(TypeRef::Named(type_name))),
            None => self.inline_type(elem),
        }
    }

    fn parse_simple_type(&self, elem: &Element, name: Option<QName>) -> Result<TypeDef> {
        let mut def = SimpleTypeDef {
            name,
            base: Some(TypeRef::Named(QName::namespaced(XSD_NAMESPACE, "anySimpleType"))),
            variety: Variety::Atomic,
        };

        for child in &elem.children {
            match child.local_name() {
                xsd_elements::RESTRICTION => {
                    def.base = match self.qname_attribute(child, "base")? {
                        Some(base) => Some(TypeRef::Named(base)),
                        None => self.inline_type(child)?.or(def.base),
                    };
                }
                xsd_elements::LIST => {
                    let item = match self.qname_attribute(child, "itemType")? {
                        Some(item) => TypeRef::Named(item),
                        None => self
                            .inline_type(child)?
                            .unwrap_or_else(|| TypeRef::Named(QName::namespaced(XSD_NAMESPACE, "string"))),
                    };
                    def.variety = Variety::List(item);
                }
                xsd_elements::UNION => def.variety = Variety::Union,
                _ => {}
            }
        }

        Ok(TypeDef::Simple(def))
    }

    fn parse_complex_type(&self, elem: &Element, name: Option<QName>) -> Result<TypeDef> {
        let any_type = TypeRef::Named(QName::namespaced(XSD_NAMESPACE, "anyType"));
        let mut def = ComplexTypeDef::new(name, Some(any_type));
        def.is_abstract = elem.get_attribute("abstract") == Some("true");
        let mixed = elem.get_attribute("mixed") == Some("true");

        let mut content_elem = None;
        for child in &elem.children {
            match child.local_name() {
                xsd_elements::SIMPLE_CONTENT => {
                    def.content = ContentKind::Simple;
                    content_elem = Some(child);
                }
                xsd_elements::COMPLEX_CONTENT => {
                    content_elem = Some(child);
                }
                _ => {}
            }
        }

        // the element that owns the particle and attributes
        let body = match content_elem {
            Some(content) => {
                let derivation = content.children.iter().find(|c| {
                    matches!(c.local_name(), xsd_elements::EXTENSION | xsd_elements::RESTRICTION)
                });
                match derivation {
                    Some(derivation) => {
                        def.derivation = if derivation.local_name() == xsd_elements::EXTENSION {
                            Derivation::Extension
                        } else {
                            Derivation::Restriction
                        };
                        if let Some(base) = self.qname_attribute(derivation, "base")? {
                            def.base = Some(TypeRef::Named(base));
                        }
                        derivation
                    }
                    None => content,
                }
            }
            None => elem,
        };

        if def.content != ContentKind::Simple {
            def.particle = self.find_content_model(body)?;
            let content_mixed = mixed
                || content_elem
                    .and_then(|c| c.get_attribute("mixed"))
                    .map(|m| m == "true")
                    .unwrap_or(false);
            def.content = if content_mixed {
                ContentKind::Mixed
            } else if def.particle.is_some() || def.derivation == Derivation::Extension {
                ContentKind::ElementOnly
            } else {
                ContentKind::Empty
            };
        }

        self.parse_attributes(body, &mut def.attributes, &mut def.attribute_groups, &mut def.any_attribute)?;
        Ok(TypeDef::Complex(def))
    }

    fn parse_attributes(
        &self,
        parent: &Element,
        uses: &mut Vec<AttributeUse>,
        groups: &mut Vec<QName>,
        any_attribute: &mut bool,
    ) -> Result<()> {
        for child in &parent.children {
            match child.local_name() {
                xsd_elements::ATTRIBUTE => {
                    if child.get_attribute("use") == Some("prohibited") {
                        continue;
                    }
                    let required = child.get_attribute("use") == Some("required");
                    let attribute = if let Some(reference) = self.qname_attribute(child, "ref")? {
                        AttributeRef::Global(reference)
                    } else {
                        let local = child
                            .get_attribute("name")
                            .ok_or_else(|| self.error("Attribute declaration missing 'name' attribute"))?;
                        let qualified = match child.get_attribute("form") {
                            Some(form) => form == "qualified",
                            None => self.attribute_form_qualified,
                        };
                        let name = if qualified {
                            QName::new(self.target_namespace.clone(), local)
                        } else {
                            QName::local(local)
                        };
                        AttributeRef::Local(Arc::new(AttributeDecl {
                            name,
                            type_ref: self.attribute_type(child)?,
                        }))
                    };
                    uses.push(AttributeUse { attribute, required });
                }
                xsd_elements::ATTRIBUTE_GROUP => {
                    if let Some(reference) = self.qname_attribute(child, "ref")? {
                        groups.push(reference);
                    }
                }
                xsd_elements::ANY_ATTRIBUTE => *any_attribute = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Find and parse the content model (sequence, choice, all or group ref) of an element
    fn find_content_model(&self, elem: &Element) -> Result<Option<Particle>> {
        for child in &elem.children {
            if let Some(particle) = self.parse_particle(child)? {
                return Ok(Some(particle));
            }
        }
        Ok(None)
    }

    fn parse_particle(&self, elem: &Element) -> Result<Option<Particle>> {
        let occurs = parse_occurs(elem);
        let term = match elem.local_name() {
            xsd_elements::ELEMENT => {
                if let Some(reference) = self.qname_attribute(elem, "ref")? {
                    Term::Element(ElementRef::Global(reference))
                } else {
                    Term::Element(ElementRef::Local(Arc::new(self.parse_element_decl(elem, false)?)))
                }
            }
            xsd_elements::SEQUENCE => Term::Sequence(self.parse_group_body(elem)?),
            xsd_elements::CHOICE => Term::Choice(self.parse_group_body(elem)?),
            xsd_elements::ALL => Term::All(self.parse_group_body(elem)?),
            xsd_elements::GROUP => match self.qname_attribute(elem, "ref")? {
                Some(reference) => Term::GroupRef(reference),
                None => return Ok(None),
            },
            xsd_elements::ANY => Term::Any,
            _ => return Ok(None),
        };
        Ok(Some(Particle::new(occurs, term)))
    }

    fn parse_group_body(&self, elem: &Element) -> Result<Vec<Particle>> {
        let mut particles = Vec::new();
        for child in &elem.children {
            if let Some(particle) = self.parse_particle(child)? {
                particles.push(particle);
            }
        }
        Ok(particles)
    }
}

/// Parse minOccurs and maxOccurs attributes into an Occurs
fn parse_occurs(elem: &Element) -> Occurs {
    let min = elem
        .get_attribute("minOccurs")
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(1);

    let max = match elem.get_attribute("maxOccurs").map(str::trim) {
        Some("unbounded") => MaxOccurs::Unbounded,
        Some(s) => MaxOccurs::Bounded(s.parse::<u32>().unwrap_or(1)),
        None => MaxOccurs::Bounded(1),
    };

    Occurs::new(min, max)
}

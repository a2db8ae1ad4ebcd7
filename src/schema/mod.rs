//! Schema catalog
//!
//! The [`SchemaCatalog`] holds every global declaration reachable from a
//! set of root schema locations, following `xs:import` and `xs:include`
//! transitively through an injected [`SchemaFetcher`]. It answers the
//! questions the type resolver and the model builder ask of the schema:
//! which declaration matches a child tag, which types derive from which,
//! and what simple value space a type has.

pub mod builtins;
pub mod components;
pub mod parsing;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;

pub use components::{
    AttributeDecl, AttributeGroupDef, AttributeRef, AttributeUse, ComplexTypeDef, ContentKind,
    Derivation, ElementDecl, ElementRef, MaxOccurs, Occurs, Particle, SimpleTypeDef, Term, TypeDef,
    TypeRef, Variety,
};

use crate::documents::Document;
use crate::error::{BindingError, Error, Result};
use crate::limits::Limits;
use crate::loaders::{MemoryFetcher, SchemaFetcher};
use crate::locations::Location;
use crate::namespaces::{is_gml_namespace, is_reserved_attribute_namespace, QName, XSD_NAMESPACE};
use parsing::{parse_schema, ParsedSchema};

/// Bound on base-type chains, substitution chains and group nesting
const MAX_DERIVATION_DEPTH: usize = 64;

/// GML type names that mark a geometry, used when the GML schemas
/// themselves are not part of the loaded closure
const GML_GEOMETRY_TYPES: &[&str] = &[
    "AbstractGeometryType",
    "AbstractGeometricPrimitiveType",
    "AbstractGeometricAggregateType",
    "AbstractCurveType",
    "AbstractSurfaceType",
    "AbstractRingType",
    "PointType",
    "LineStringType",
    "LinearRingType",
    "CurveType",
    "PolygonType",
    "SurfaceType",
    "MultiPointType",
    "MultiLineStringType",
    "MultiCurveType",
    "MultiPolygonType",
    "MultiSurfaceType",
    "MultiGeometryType",
];

/// Value space of a simple type, reduced to its builtin ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleKind {
    /// Atomic value of the named builtin type (local name, e.g. `int`)
    Atomic(String),
    /// Whitespace separated list; the builtin item type local name
    List(String),
    /// Union of member types
    Union,
}

impl SimpleKind {
    /// Plain string kind
    pub fn string() -> Self {
        SimpleKind::Atomic("string".to_string())
    }
}

/// Declaration matched for a child tag inside a parent's content model
#[derive(Debug, Clone)]
pub struct ChildMatch {
    /// Concrete declaration bound to the child
    pub element: Arc<ElementDecl>,
    /// Effective occurrence bounds of the matching particle
    pub occurs: Occurs,
    /// Head declaration when the child substitutes for it
    pub substitutes_for: Option<Arc<ElementDecl>>,
}

/// Attribute declaration with its use in a type
#[derive(Debug, Clone)]
pub struct AttributeBinding {
    /// The declaration
    pub decl: Arc<AttributeDecl>,
    /// `use="required"`
    pub required: bool,
}

/// Global components of all loaded schema documents
#[derive(Debug, Default)]
struct SchemaGlobals {
    elements: IndexMap<QName, Arc<ElementDecl>>,
    types: IndexMap<QName, Arc<TypeDef>>,
    attributes: IndexMap<QName, Arc<AttributeDecl>>,
    attribute_groups: IndexMap<QName, Arc<AttributeGroupDef>>,
    groups: IndexMap<QName, Arc<Particle>>,
    /// Direct members of each substitution group, keyed by head name
    substitutions: HashMap<QName, Vec<Arc<ElementDecl>>>,
}

impl SchemaGlobals {
    fn register(&mut self, parsed: ParsedSchema) {
        for element in parsed.elements {
            if let Some(head) = &element.substitution_group {
                self.substitutions
                    .entry(head.clone())
                    .or_default()
                    .push(Arc::clone(&element));
            }
            self.elements.insert(element.name.clone(), element);
        }
        for typ in parsed.types {
            if let Some(name) = typ.name() {
                self.types.insert(name.clone(), Arc::clone(&typ));
            }
        }
        for attribute in parsed.attributes {
            self.attributes.insert(attribute.name.clone(), attribute);
        }
        self.attribute_groups.extend(parsed.attribute_groups);
        self.groups.extend(parsed.groups);
    }
}

/// All schema components reachable from a set of root schema documents
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    globals: SchemaGlobals,
    namespaces: Vec<Option<String>>,
    locations: Vec<Location>,
}

impl SchemaCatalog {
    /// Load the import/include closure of `roots`
    ///
    /// Every document is fetched once per (location, effective namespace).
    /// A location that cannot be fetched is a schema resolution error
    /// naming it; imports without a `schemaLocation` are skipped.
    pub fn load(roots: &[Location], fetcher: &dyn SchemaFetcher, limits: &Limits) -> Result<Self> {
        let span = tracing::info_span!("load_schemas", roots = roots.len());
        let _enter = span.enter();

        let mut catalog = SchemaCatalog::default();
        let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
        let mut queue: VecDeque<(Location, Option<String>)> =
            roots.iter().map(|l| (l.clone(), None)).collect();

        while let Some((location, includer)) = queue.pop_front() {
            if !seen.insert((location.key(), includer.clone())) {
                continue;
            }
            limits.check_schema_documents(seen.len())?;

            let bytes = match fetcher.fetch(&location) {
                Ok(bytes) => bytes,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    return Err(Error::resolution(
                        BindingError::new(format!("cannot load schema document: {}", e))
                            .with_location(location.to_string()),
                    ))
                }
            };
            let document = Document::parse(&bytes, limits)?;
            let parsed = parse_schema(document.root(), &location, includer.as_deref())?;
            tracing::debug!(
                location = %location,
                namespace = ?parsed.target_namespace,
                elements = parsed.elements.len(),
                types = parsed.types.len(),
                "parsed schema document"
            );

            for (namespace, schema_location) in &parsed.imports {
                match schema_location {
                    Some(reference) => queue.push_back((location.resolve(reference)?, None)),
                    None => tracing::debug!(namespace = ?namespace, "import without schemaLocation skipped"),
                }
            }
            for reference in &parsed.includes {
                queue.push_back((location.resolve(reference)?, parsed.target_namespace.clone()));
            }

            if !catalog.namespaces.contains(&parsed.target_namespace) {
                catalog.namespaces.push(parsed.target_namespace.clone());
            }
            if !catalog.locations.contains(&location) {
                catalog.locations.push(location);
            }
            catalog.globals.register(parsed);
        }

        tracing::info!(
            documents = catalog.locations.len(),
            namespaces = catalog.namespaces.len(),
            elements = catalog.globals.elements.len(),
            types = catalog.globals.types.len(),
            "schemas loaded"
        );
        Ok(catalog)
    }

    /// Load a single in-memory schema document
    pub fn from_string(xsd: &str) -> Result<Self> {
        Self::from_documents(&[("memory/schema.xsd", xsd)])
    }

    /// Load in-memory schema documents; the first one is the root and the
    /// others are reachable through relative `schemaLocation`s
    pub fn from_documents(documents: &[(&str, &str)]) -> Result<Self> {
        let mut fetcher = MemoryFetcher::new();
        for (location, content) in documents {
            fetcher.insert(location, content.as_bytes());
        }
        let roots = documents
            .first()
            .map(|(location, _)| Location::parse(location))
            .transpose()?
            .into_iter()
            .collect::<Vec<_>>();
        Self::load(&roots, &fetcher, &Limits::default())
    }

    /// Locations of the loaded schema documents, in load order
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Target namespaces of the loaded documents
    pub fn namespaces(&self) -> &[Option<String>] {
        &self.namespaces
    }

    /// Global element declarations
    pub fn elements(&self) -> impl Iterator<Item = &Arc<ElementDecl>> {
        self.globals.elements.values()
    }

    /// Look up a global element declaration
    pub fn lookup_element(&self, name: &QName) -> Option<Arc<ElementDecl>> {
        self.globals.elements.get(name).cloned()
    }

    /// Look up a named type; the XSD namespace maps to the builtins
    pub fn lookup_type(&self, name: &QName) -> Option<Arc<TypeDef>> {
        if name.namespace() == Some(XSD_NAMESPACE) {
            return builtins::builtin_type(&name.local_name);
        }
        self.globals.types.get(name).cloned()
    }

    /// Look up a global attribute declaration
    pub fn lookup_attribute(&self, name: &QName) -> Option<Arc<AttributeDecl>> {
        self.globals.attributes.get(name).cloned()
    }

    /// Look up a named attribute group
    pub fn lookup_attribute_group(&self, name: &QName) -> Option<Arc<AttributeGroupDef>> {
        self.globals.attribute_groups.get(name).cloned()
    }

    /// Look up a named model group
    pub fn lookup_group(&self, name: &QName) -> Option<Arc<Particle>> {
        self.globals.groups.get(name).cloned()
    }

    /// Resolve a type reference
    pub fn resolve_type(&self, type_ref: &TypeRef) -> Result<Arc<TypeDef>> {
        match type_ref {
            TypeRef::Anonymous(def) => Ok(Arc::clone(def)),
            TypeRef::Named(name) => self.lookup_type(name).ok_or_else(|| {
                Error::resolution(BindingError::new(format!("unknown type {}", name)))
            }),
        }
    }

    /// Type of an element declaration
    ///
    /// An element without a declared type takes the type of its
    /// substitution group head, or `xs:anyType`.
    pub fn element_type(&self, decl: &ElementDecl) -> Result<Arc<TypeDef>> {
        self.element_type_at(decl, 0)
    }

    fn element_type_at(&self, decl: &ElementDecl, depth: usize) -> Result<Arc<TypeDef>> {
        if let Some(type_ref) = &decl.type_ref {
            return self
                .resolve_type(type_ref)
                .map_err(|e| with_tag(e, &decl.name));
        }
        if depth < MAX_DERIVATION_DEPTH {
            if let Some(head) = decl.substitution_group.as_ref().and_then(|h| self.lookup_element(h)) {
                return self.element_type_at(&head, depth + 1);
            }
        }
        Ok(builtins::any_type())
    }

    /// The type and its ancestors, stopping at `xs:anyType` or at the
    /// first base that is not loaded
    fn base_chain(&self, typ: &Arc<TypeDef>) -> (Vec<Arc<TypeDef>>, Option<QName>) {
        let mut chain = vec![Arc::clone(typ)];
        while chain.len() < MAX_DERIVATION_DEPTH {
            let next = match chain.last().and_then(|t| t.base()) {
                None => break,
                Some(TypeRef::Anonymous(def)) => Arc::clone(def),
                Some(TypeRef::Named(name)) => match self.lookup_type(name) {
                    Some(def) => def,
                    None => {
                        let missing = name.clone();
                        return (chain, Some(missing));
                    }
                },
            };
            chain.push(next);
        }
        (chain, None)
    }

    /// Whether `typ` is `ancestor` or derives from it
    pub fn derives_from(&self, typ: &Arc<TypeDef>, ancestor: &Arc<TypeDef>) -> bool {
        let (chain, _) = self.base_chain(typ);
        chain.iter().any(|t| same_type(t, ancestor))
    }

    /// Whether `typ` is named `name` or derives from a type of that name
    pub fn derives_from_name(&self, typ: &Arc<TypeDef>, name: &QName) -> bool {
        let (chain, unresolved) = self.base_chain(typ);
        chain.iter().any(|t| t.name() == Some(name)) || unresolved.as_ref() == Some(name)
    }

    /// Whether `typ` is a GML geometry type
    pub fn is_geometry_type(&self, typ: &Arc<TypeDef>) -> bool {
        let (chain, unresolved) = self.base_chain(typ);
        chain
            .iter()
            .filter_map(|t| t.name())
            .chain(unresolved.as_ref())
            .any(|name| {
                is_gml_namespace(name.namespace()) && GML_GEOMETRY_TYPES.contains(&name.local_name.as_str())
            })
    }

    /// Simple value space of `typ`, or `None` for element-only and empty content
    pub fn simple_kind(&self, typ: &Arc<TypeDef>) -> Option<SimpleKind> {
        if !typ.has_simple_content() {
            return None;
        }
        let (chain, _) = self.base_chain(typ);
        for def in &chain {
            if let TypeDef::Simple(simple) = def.as_ref() {
                match &simple.variety {
                    Variety::List(item) => {
                        let item = self
                            .resolve_type(item)
                            .ok()
                            .and_then(|t| match self.simple_kind(&t) {
                                Some(SimpleKind::Atomic(name)) => Some(name),
                                _ => None,
                            })
                            .unwrap_or_else(|| "string".to_string());
                        return Some(SimpleKind::List(item));
                    }
                    Variety::Union => return Some(SimpleKind::Union),
                    Variety::Atomic => {}
                }
            }
            if let Some(name) = def.name() {
                if name.namespace() == Some(XSD_NAMESPACE) {
                    return Some(SimpleKind::Atomic(name.local_name.clone()));
                }
            }
        }
        Some(SimpleKind::string())
    }

    /// Simple value space of an attribute
    pub fn attribute_kind(&self, decl: &AttributeDecl) -> SimpleKind {
        decl.type_ref
            .as_ref()
            .and_then(|t| self.resolve_type(t).ok())
            .and_then(|t| self.simple_kind(&t))
            .unwrap_or_else(SimpleKind::string)
    }

    /// Members of the substitution group headed by `head`, transitively
    pub fn substitution_group(&self, head: &QName) -> Vec<Arc<ElementDecl>> {
        let mut members = Vec::new();
        let mut visited: HashSet<QName> = HashSet::new();
        let mut queue = VecDeque::from([head.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for member in self.globals.substitutions.get(&current).into_iter().flatten() {
                queue.push_back(member.name.clone());
                members.push(Arc::clone(member));
            }
        }
        members
    }

    /// Particles of a complex type's content model, inherited ones first
    pub fn content_particles(&self, typ: &Arc<TypeDef>) -> Result<Vec<Particle>> {
        let mut particles = Vec::new();
        self.collect_particles(typ, &mut particles, 0)?;
        Ok(particles)
    }

    fn collect_particles(&self, typ: &Arc<TypeDef>, out: &mut Vec<Particle>, depth: usize) -> Result<()> {
        let complex = match typ.as_ref() {
            TypeDef::Complex(c) => c,
            TypeDef::Simple(_) => return Ok(()),
        };
        if complex.derivation == Derivation::Extension && depth < MAX_DERIVATION_DEPTH {
            if let Some(base) = &complex.base {
                let base = self.resolve_type(base)?;
                self.collect_particles(&base, out, depth + 1)?;
            }
        }
        if let Some(particle) = &complex.particle {
            out.push(particle.clone());
        }
        Ok(())
    }

    /// Find the declaration of a child tag in the content model of `parent_type`
    ///
    /// A child named after a member of a substitution group whose head
    /// appears in the content model binds to that member, provided the
    /// member's type derives from the head's type. Wildcards fall back to
    /// a global element lookup.
    pub fn find_child(&self, parent_type: &Arc<TypeDef>, child: &QName) -> Result<Option<ChildMatch>> {
        for particle in &self.content_particles(parent_type)? {
            if let Some(found) = self.match_particle(particle, Occurs::once(), child, 0)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn match_particle(
        &self,
        particle: &Particle,
        outer: Occurs,
        child: &QName,
        depth: usize,
    ) -> Result<Option<ChildMatch>> {
        if depth > MAX_DERIVATION_DEPTH {
            return Ok(None);
        }
        let occurs = particle.occurs.within(outer);
        let members = match &particle.term {
            Term::Element(element) => return self.match_element(element, occurs, child),
            Term::Any => {
                return Ok(self.lookup_element(child).map(|element| ChildMatch {
                    element,
                    occurs,
                    substitutes_for: None,
                }))
            }
            Term::GroupRef(name) => {
                let group = self.lookup_group(name).ok_or_else(|| {
                    Error::resolution(BindingError::new(format!("unknown model group {}", name)))
                })?;
                return self.match_particle(&group, occurs, child, depth + 1);
            }
            Term::Sequence(members) | Term::All(members) => (members, occurs),
            // only one branch of a choice is present in an instance
            Term::Choice(members) if members.len() > 1 => (members, occurs.optionalized()),
            Term::Choice(members) => (members, occurs),
        };

        let (members, occurs) = members;
        for member in members {
            if let Some(found) = self.match_particle(member, occurs, child, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn match_element(&self, element: &ElementRef, occurs: Occurs, child: &QName) -> Result<Option<ChildMatch>> {
        let decl = match element {
            ElementRef::Local(decl) => Arc::clone(decl),
            ElementRef::Global(name) => self.lookup_element(name).ok_or_else(|| {
                Error::resolution(BindingError::new(format!("unknown element reference {}", name)))
            })?,
        };

        if &decl.name == child && !decl.is_abstract {
            return Ok(Some(ChildMatch {
                element: decl,
                occurs,
                substitutes_for: None,
            }));
        }

        let member = match self
            .substitution_group(&decl.name)
            .into_iter()
            .find(|m| &m.name == child && !m.is_abstract)
        {
            Some(member) => member,
            None => return Ok(None),
        };

        let head_type = self.element_type(&decl)?;
        let member_type = self.element_type(&member)?;
        if !self.derives_from(&member_type, &head_type) {
            return Err(Error::resolution(
                BindingError::new(format!(
                    "type {} of substitution member does not derive from {}",
                    member_type.display_name(),
                    head_type.display_name()
                ))
                .with_tag(child.to_string()),
            ));
        }
        Ok(Some(ChildMatch {
            element: member,
            occurs,
            substitutes_for: Some(decl),
        }))
    }

    /// Attribute uses of a type, including inherited ones and attribute groups
    pub fn attribute_uses(&self, typ: &Arc<TypeDef>) -> Result<IndexMap<QName, AttributeBinding>> {
        let mut uses = IndexMap::new();
        let (chain, _) = self.base_chain(typ);
        // base first so that restrictions override inherited uses
        for def in chain.iter().rev() {
            if let TypeDef::Complex(complex) = def.as_ref() {
                self.collect_uses(&complex.attributes, &complex.attribute_groups, &mut uses, 0)?;
            }
        }
        Ok(uses)
    }

    fn collect_uses(
        &self,
        attributes: &[AttributeUse],
        groups: &[QName],
        out: &mut IndexMap<QName, AttributeBinding>,
        depth: usize,
    ) -> Result<()> {
        for attribute_use in attributes {
            let decl = match &attribute_use.attribute {
                AttributeRef::Local(decl) => Arc::clone(decl),
                AttributeRef::Global(name) => match self.lookup_attribute(name) {
                    Some(decl) => decl,
                    None if is_reserved_attribute_namespace(name.namespace()) => Arc::new(AttributeDecl {
                        name: name.clone(),
                        type_ref: None,
                    }),
                    None => {
                        return Err(Error::resolution(BindingError::new(format!(
                            "unknown attribute reference {}",
                            name
                        ))))
                    }
                },
            };
            out.insert(
                decl.name.clone(),
                AttributeBinding {
                    decl,
                    required: attribute_use.required,
                },
            );
        }

        if depth >= MAX_DERIVATION_DEPTH {
            return Ok(());
        }
        for name in groups {
            let group = self.lookup_attribute_group(name).ok_or_else(|| {
                Error::resolution(BindingError::new(format!("unknown attribute group {}", name)))
            })?;
            self.collect_uses(&group.attributes, &group.attribute_groups, out, depth + 1)?;
        }
        Ok(())
    }

    /// Whether `typ` or one of its ancestors or attribute groups allows any attribute
    pub fn has_any_attribute(&self, typ: &Arc<TypeDef>) -> bool {
        let (chain, _) = self.base_chain(typ);
        chain.iter().enumerate().any(|(i, def)| match def.as_ref() {
            // restricting anyType does not inherit its wildcard
            TypeDef::Complex(_) if i > 0 && is_any_type(def) => false,
            TypeDef::Complex(c) => c.any_attribute || self.groups_allow_any(&c.attribute_groups, 0),
            TypeDef::Simple(_) => false,
        })
    }

    fn groups_allow_any(&self, groups: &[QName], depth: usize) -> bool {
        depth < MAX_DERIVATION_DEPTH
            && groups.iter().filter_map(|g| self.lookup_attribute_group(g)).any(|g| {
                g.any_attribute || self.groups_allow_any(&g.attribute_groups, depth + 1)
            })
    }
}

fn same_type(a: &Arc<TypeDef>, b: &Arc<TypeDef>) -> bool {
    Arc::ptr_eq(a, b) || matches!((a.name(), b.name()), (Some(x), Some(y)) if x == y)
}

fn is_any_type(typ: &TypeDef) -> bool {
    typ.name()
        .map(|n| n.is(XSD_NAMESPACE, builtins::ANY_TYPE))
        .unwrap_or(false)
}

fn with_tag(error: Error, tag: &QName) -> Error {
    match error {
        Error::SchemaResolution(binding) if binding.tag.is_none() => {
            Error::SchemaResolution(binding.with_tag(tag.to_string()))
        }
        other => other,
    }
}

//! XSD schema components
//!
//! The subset of the XSD component model the compiler binds documents
//! against: element and attribute declarations, simple and complex type
//! definitions, and particles (sequence / choice / all groups, element
//! particles and wildcards) with their occurrence bounds.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::namespaces::QName;

/// Upper occurrence bound; `unbounded` is an explicit sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaxOccurs {
    /// A finite bound
    Bounded(u32),
    /// `maxOccurs="unbounded"`
    Unbounded,
}

impl MaxOccurs {
    /// Whether more than one occurrence is allowed
    pub fn is_many(&self) -> bool {
        match self {
            MaxOccurs::Bounded(n) => *n > 1,
            MaxOccurs::Unbounded => true,
        }
    }

    /// Whether `count` occurrences fit under this bound
    pub fn allows(&self, count: usize) -> bool {
        match self {
            MaxOccurs::Bounded(n) => count <= *n as usize,
            MaxOccurs::Unbounded => true,
        }
    }

    /// Product of two bounds, unbounded absorbing everything but zero
    pub fn times(self, other: MaxOccurs) -> MaxOccurs {
        match (self, other) {
            (MaxOccurs::Bounded(0), _) | (_, MaxOccurs::Bounded(0)) => MaxOccurs::Bounded(0),
            (MaxOccurs::Bounded(a), MaxOccurs::Bounded(b)) => MaxOccurs::Bounded(a.saturating_mul(b)),
            _ => MaxOccurs::Unbounded,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{}", n),
            MaxOccurs::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (default 1)
    pub max: MaxOccurs,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: MaxOccurs) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self::new(1, MaxOccurs::Bounded(1))
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self::new(0, MaxOccurs::Bounded(1))
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self::new(0, MaxOccurs::Unbounded)
    }

    /// Effective bounds of this particle nested inside `outer`
    pub fn within(self, outer: Occurs) -> Occurs {
        Occurs {
            min: self.min.saturating_mul(outer.min),
            max: self.max.times(outer.max),
        }
    }

    /// Same bounds with minOccurs forced to zero
    pub fn optionalized(self) -> Occurs {
        Occurs { min: 0, ..self }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

/// Reference to a type definition
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// Named (global or builtin) type, resolved through the catalog
    Named(QName),
    /// Anonymous type defined inline
    Anonymous(Arc<TypeDef>),
}

/// Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Element name
    pub name: QName,
    /// Declared type; `None` means the substitution head's type or anyType
    pub type_ref: Option<TypeRef>,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `nillable="true"`
    pub nillable: bool,
    /// Head of the substitution group this element belongs to
    pub substitution_group: Option<QName>,
    /// Whether this is a top-level declaration
    pub global: bool,
}

impl ElementDecl {
    /// Create a declaration with the given name and type
    pub fn new(name: QName, type_ref: Option<TypeRef>) -> Self {
        Self {
            name,
            type_ref,
            is_abstract: false,
            nillable: false,
            substitution_group: None,
            global: false,
        }
    }
}

/// Attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// Attribute name (namespace only when qualified)
    pub name: QName,
    /// Declared simple type; `None` means anySimpleType
    pub type_ref: Option<TypeRef>,
}

/// Attribute declaration or reference to a global one
#[derive(Debug, Clone)]
pub enum AttributeRef {
    /// Local declaration
    Local(Arc<AttributeDecl>),
    /// `ref="..."` to a global attribute
    Global(QName),
}

/// Attribute use inside a type or attribute group
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// The declaration used
    pub attribute: AttributeRef,
    /// `use="required"`
    pub required: bool,
}

/// Named attribute group
#[derive(Debug, Clone, Default)]
pub struct AttributeGroupDef {
    /// Attribute uses
    pub attributes: Vec<AttributeUse>,
    /// Nested attribute group references
    pub attribute_groups: Vec<QName>,
    /// Whether the group carries `anyAttribute`
    pub any_attribute: bool,
}

/// Element particle target
#[derive(Debug, Clone)]
pub enum ElementRef {
    /// Local declaration
    Local(Arc<ElementDecl>),
    /// `ref="..."` to a global element
    Global(QName),
}

/// Particle term
#[derive(Debug, Clone)]
pub enum Term {
    /// Element particle
    Element(ElementRef),
    /// `xs:sequence`
    Sequence(Vec<Particle>),
    /// `xs:choice`
    Choice(Vec<Particle>),
    /// `xs:all`
    All(Vec<Particle>),
    /// Reference to a named model group
    GroupRef(QName),
    /// `xs:any` wildcard
    Any,
}

/// Particle: a term with occurrence bounds
#[derive(Debug, Clone)]
pub struct Particle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// The term
    pub term: Term,
}

impl Particle {
    /// Create a particle
    pub fn new(occurs: Occurs, term: Term) -> Self {
        Self { occurs, term }
    }
}

/// Derivation method of a type from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Derivation {
    /// Extension adds content to the base
    Extension,
    /// Restriction replaces the base content
    #[default]
    Restriction,
}

/// Content kind of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// No element or text content
    Empty,
    /// Simple content (text, possibly with attributes)
    Simple,
    /// Element-only content
    ElementOnly,
    /// Mixed element and text content
    Mixed,
}

/// Variety of a simple type
#[derive(Debug, Clone)]
pub enum Variety {
    /// Atomic values
    Atomic,
    /// Whitespace separated list of the item type
    List(TypeRef),
    /// Union of member types
    Union,
}

/// Simple type definition
#[derive(Debug, Clone)]
pub struct SimpleTypeDef {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Base type
    pub base: Option<TypeRef>,
    /// Variety
    pub variety: Variety,
}

/// Complex type definition
#[derive(Debug, Clone)]
pub struct ComplexTypeDef {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Base type (None only for anyType)
    pub base: Option<TypeRef>,
    /// How the type derives from its base
    pub derivation: Derivation,
    /// Content kind
    pub content: ContentKind,
    /// Own content model (inherited content is resolved through the base)
    pub particle: Option<Particle>,
    /// Own attribute uses
    pub attributes: Vec<AttributeUse>,
    /// Attribute group references
    pub attribute_groups: Vec<QName>,
    /// Whether the type carries `anyAttribute`
    pub any_attribute: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
}

impl ComplexTypeDef {
    /// Create an empty complex type deriving by restriction from `base`
    pub fn new(name: Option<QName>, base: Option<TypeRef>) -> Self {
        Self {
            name,
            base,
            derivation: Derivation::Restriction,
            content: ContentKind::Empty,
            particle: None,
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            any_attribute: false,
            is_abstract: false,
        }
    }
}

/// Type definition
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// Simple type
    Simple(SimpleTypeDef),
    /// Complex type
    Complex(ComplexTypeDef),
}

impl TypeDef {
    /// Type name, if the type is not anonymous
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(s) => s.name.as_ref(),
            TypeDef::Complex(c) => c.name.as_ref(),
        }
    }

    /// Base type reference
    pub fn base(&self) -> Option<&TypeRef> {
        match self {
            TypeDef::Simple(s) => s.base.as_ref(),
            TypeDef::Complex(c) => c.base.as_ref(),
        }
    }

    /// Whether instances carry simple (text) content only
    pub fn has_simple_content(&self) -> bool {
        match self {
            TypeDef::Simple(_) => true,
            TypeDef::Complex(c) => c.content == ContentKind::Simple,
        }
    }

    /// Display name for diagnostics
    pub fn display_name(&self) -> String {
        self.name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "(anonymous)".to_string())
    }
}

//! Builtin XSD types
//!
//! The builtin type hierarchy of the XSD namespace, rooted at `anyType`.
//! Only derivation links and list varieties are modelled; facets are not
//! needed to bind documents.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::components::{
    ComplexTypeDef, ContentKind, MaxOccurs, Occurs, Particle, SimpleTypeDef, Term, TypeDef, TypeRef,
    Variety,
};
use crate::namespaces::{QName, XSD_NAMESPACE};

/// Root of the type hierarchy
pub const ANY_TYPE: &str = "anyType";

/// Root of the simple type hierarchy
pub const ANY_SIMPLE_TYPE: &str = "anySimpleType";

/// (type, base) pairs of the builtin atomic types
const ATOMIC_HIERARCHY: &[(&str, &str)] = &[
    ("string", ANY_SIMPLE_TYPE),
    ("boolean", ANY_SIMPLE_TYPE),
    ("decimal", ANY_SIMPLE_TYPE),
    ("float", ANY_SIMPLE_TYPE),
    ("double", ANY_SIMPLE_TYPE),
    ("duration", ANY_SIMPLE_TYPE),
    ("dateTime", ANY_SIMPLE_TYPE),
    ("time", ANY_SIMPLE_TYPE),
    ("date", ANY_SIMPLE_TYPE),
    ("gYearMonth", ANY_SIMPLE_TYPE),
    ("gYear", ANY_SIMPLE_TYPE),
    ("gMonthDay", ANY_SIMPLE_TYPE),
    ("gDay", ANY_SIMPLE_TYPE),
    ("gMonth", ANY_SIMPLE_TYPE),
    ("hexBinary", ANY_SIMPLE_TYPE),
    ("base64Binary", ANY_SIMPLE_TYPE),
    ("anyURI", ANY_SIMPLE_TYPE),
    ("QName", ANY_SIMPLE_TYPE),
    ("NOTATION", ANY_SIMPLE_TYPE),
    ("normalizedString", "string"),
    ("token", "normalizedString"),
    ("language", "token"),
    ("NMTOKEN", "token"),
    ("Name", "token"),
    ("NCName", "Name"),
    ("ID", "NCName"),
    ("IDREF", "NCName"),
    ("ENTITY", "NCName"),
    ("integer", "decimal"),
    ("nonPositiveInteger", "integer"),
    ("negativeInteger", "nonPositiveInteger"),
    ("long", "integer"),
    ("int", "long"),
    ("short", "int"),
    ("byte", "short"),
    ("nonNegativeInteger", "integer"),
    ("unsignedLong", "nonNegativeInteger"),
    ("unsignedInt", "unsignedLong"),
    ("unsignedShort", "unsignedInt"),
    ("unsignedByte", "unsignedShort"),
    ("positiveInteger", "nonNegativeInteger"),
];

/// (list type, item type) pairs of the builtin list types
const LIST_TYPES: &[(&str, &str)] = &[
    ("NMTOKENS", "NMTOKEN"),
    ("IDREFS", "IDREF"),
    ("ENTITIES", "ENTITY"),
];

fn xsd(local: &str) -> QName {
    QName::namespaced(XSD_NAMESPACE, local)
}

static BUILTINS: Lazy<HashMap<&'static str, Arc<TypeDef>>> = Lazy::new(|| {
    let mut types = HashMap::new();

    let mut any_type = ComplexTypeDef::new(Some(xsd(ANY_TYPE)), None);
    any_type.content = ContentKind::Mixed;
    any_type.any_attribute = true;
    any_type.particle = Some(Particle::new(
        Occurs::once(),
        Term::Sequence(vec![Particle::new(Occurs::new(0, MaxOccurs::Unbounded), Term::Any)]),
    ));
    types.insert(ANY_TYPE, Arc::new(TypeDef::Complex(any_type)));

    types.insert(
        ANY_SIMPLE_TYPE,
        Arc::new(TypeDef::Simple(SimpleTypeDef {
            name: Some(xsd(ANY_SIMPLE_TYPE)),
            base: Some(TypeRef::Named(xsd(ANY_TYPE))),
            variety: Variety::Atomic,
        })),
    );

    for (name, base) in ATOMIC_HIERARCHY {
        types.insert(
            *name,
            Arc::new(TypeDef::Simple(SimpleTypeDef {
                name: Some(xsd(name)),
                base: Some(TypeRef::Named(xsd(base))),
                variety: Variety::Atomic,
            })),
        );
    }

    for (name, item) in LIST_TYPES {
        types.insert(
            *name,
            Arc::new(TypeDef::Simple(SimpleTypeDef {
                name: Some(xsd(name)),
                base: Some(TypeRef::Named(xsd(ANY_SIMPLE_TYPE))),
                variety: Variety::List(TypeRef::Named(xsd(item))),
            })),
        );
    }

    types
});

/// Look up a builtin type by local name
pub fn builtin_type(local_name: &str) -> Option<Arc<TypeDef>> {
    BUILTINS.get(local_name).cloned()
}

/// The `xs:anyType` definition
pub fn any_type() -> Arc<TypeDef> {
    Arc::clone(&BUILTINS[ANY_TYPE])
}

/// Whether a qualified name denotes a builtin XSD type
pub fn is_builtin(qname: &QName) -> bool {
    qname.namespace() == Some(XSD_NAMESPACE) && BUILTINS.contains_key(qname.local_name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let int = builtin_type("int").unwrap();
        assert_eq!(int.name(), Some(&xsd("int")));
        match int.base() {
            Some(TypeRef::Named(base)) => assert_eq!(base, &xsd("long")),
            other => panic!("unexpected base {:?}", other),
        }
        assert!(builtin_type("notAType").is_none());
    }

    #[test]
    fn test_any_type_is_root() {
        let any = any_type();
        assert!(any.base().is_none());
        assert!(!any.has_simple_content());
    }

    #[test]
    fn test_list_builtins() {
        let tokens = builtin_type("NMTOKENS").unwrap();
        assert!(matches!(tokens.as_ref(), TypeDef::Simple(SimpleTypeDef { variety: Variety::List(_), .. })));
        assert!(is_builtin(&xsd("IDREFS")));
        assert!(!is_builtin(&QName::local("string")));
    }
}

//! Relational model
//!
//! The compiler's output: an arena of [`Table`]s keyed by name, the rows
//! populated into them, and the name of the table holding the document
//! root. Links and back-links refer to their target table by name, so the
//! model has no reference cycles and serializes as plain data.
//!
//! Every field is identified by its xpath key relative to the owning
//! table's root node (see [`xpath`]); two fields with the same key are the
//! same field, which is what lets tables built from different instances
//! and documents converge.

pub mod builder;
pub mod populate;
pub mod xpath;

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use builder::{BuildOutcome, ModelBuilder, Placement, PlacementMap};
pub use populate::InstancePopulator;

use crate::schema::{MaxOccurs, SimpleKind};

/// Key of the synthetic auto-increment uid column
pub const SYNTHETIC_UID: &str = "id";

/// Key of the natural uid column, taken from an `id` attribute
pub const NATURAL_UID: &str = "@id";

/// Logical SQL type of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// Text
    Text,
    /// Integer
    Int,
    /// Floating point or decimal
    Real,
    /// Boolean
    Boolean,
    /// Whitespace separated list of the item type, stored as text
    List(Box<SqlType>),
}

impl SqlType {
    /// SQL type of a simple value space
    pub fn from_kind(kind: &SimpleKind) -> Self {
        match kind {
            SimpleKind::Atomic(name) => Self::from_builtin(name),
            SimpleKind::List(item) => SqlType::List(Box::new(Self::from_builtin(item))),
            SimpleKind::Union => SqlType::Text,
        }
    }

    fn from_builtin(name: &str) -> Self {
        match name {
            "integer" | "nonPositiveInteger" | "negativeInteger" | "long" | "int" | "short" | "byte"
            | "nonNegativeInteger" | "unsignedLong" | "unsignedInt" | "unsignedShort" | "unsignedByte"
            | "positiveInteger" => SqlType::Int,
            "decimal" | "float" | "double" => SqlType::Real,
            "boolean" => SqlType::Boolean,
            _ => SqlType::Text,
        }
    }

    /// Column type in generated DDL
    pub fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Text | SqlType::List(_) => "TEXT",
            SqlType::Int => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Boolean => "BOOLEAN",
        }
    }

    /// Common type of two columns merged under one key
    pub fn unify(&self, other: &SqlType) -> SqlType {
        if self == other {
            self.clone()
        } else {
            SqlType::Text
        }
    }

    /// Convert document text to a value of this type, keeping the text
    /// when it does not parse
    pub fn parse_value(&self, text: &str) -> Value {
        let trimmed = text.trim();
        match self {
            SqlType::Int => trimmed.parse().map(Value::Int).unwrap_or_else(|_| Value::Text(text.to_string())),
            SqlType::Real => trimmed.parse().map(Value::Real).unwrap_or_else(|_| Value::Text(text.to_string())),
            SqlType::Boolean => match trimmed {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => Value::Text(text.to_string()),
            },
            SqlType::Text | SqlType::List(_) => Value::Text(text.to_string()),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::List(item) => write!(f, "LIST OF {}", item),
            other => f.write_str(other.sql_name()),
        }
    }
}

/// Scalar column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Xpath key
    pub xpath: String,
    /// Logical type
    pub sql_type: SqlType,
    /// Whether the column may be null
    pub optional: bool,
    /// Whether this is the synthetic auto-increment id
    pub auto_increment: bool,
}

impl Column {
    /// A plain column
    pub fn new(xpath: impl Into<String>, sql_type: SqlType, optional: bool) -> Self {
        Self {
            xpath: xpath.into(),
            sql_type,
            optional,
            auto_increment: false,
        }
    }
}

/// Reference from a table row to rows of another table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Xpath key of the linked child nodes
    pub xpath: String,
    /// Target table name
    pub table: String,
    /// Whether the link column may be null
    pub optional: bool,
    /// Effective minOccurs of the child
    pub min_occurs: u32,
    /// Effective maxOccurs of the child
    pub max_occurs: MaxOccurs,
    /// Type of the target table's uid
    pub sql_type: SqlType,
    /// Local name of the abstract head when the child came from a substitution group
    pub substitution_group: Option<String>,
}

impl Link {
    /// Whether the link is one-to-many (no column on the owning table)
    pub fn is_many(&self) -> bool {
        self.max_occurs.is_many()
    }
}

/// Reverse reference placed on the target of a one-to-many link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackLink {
    /// Table owning the one-to-many link
    pub table: String,
    /// Type of that table's uid
    pub sql_type: SqlType,
}

impl BackLink {
    /// Field key of the back-link to `table`; never a valid xpath key
    pub fn key_for(table: &str) -> String {
        format!("backlink({})", table)
    }
}

/// Geometry column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Xpath key ending in `geometry()`
    pub xpath: String,
    /// WKT geometry type name (`POINT`, `MULTIPOLYGON`, `GEOMETRY`, ...)
    pub geometry_type: String,
    /// Coordinate dimension (2 or 3)
    pub dimension: u8,
    /// EPSG code
    pub srid: i32,
    /// Whether the column may be null
    pub optional: bool,
}

/// A field of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Field {
    /// Scalar column
    Column(Column),
    /// Link to another table
    Link(Link),
    /// Back-link to the table owning a one-to-many link
    BackLink(BackLink),
    /// Geometry column
    Geometry(Geometry),
}

impl Field {
    /// Merge key of the field
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Field::Column(c) => Cow::Borrowed(&c.xpath),
            Field::Link(l) => Cow::Borrowed(&l.xpath),
            Field::BackLink(b) => Cow::Owned(BackLink::key_for(&b.table)),
            Field::Geometry(g) => Cow::Borrowed(&g.xpath),
        }
    }

    /// Column name derived from the key, `None` for one-to-many links
    ///
    /// A table may rename the column to keep names unique, see
    /// [`Table::column_name`].
    pub fn column_name(&self) -> Option<String> {
        match self {
            Field::Column(c) => Some(xpath::column_name(&c.xpath)),
            Field::Link(l) if l.is_many() => None,
            Field::Link(l) => Some(format!("{}_id", xpath::column_name(&l.xpath))),
            Field::BackLink(b) => Some(format!("{}_id", b.table)),
            Field::Geometry(g) => Some(xpath::column_name(&g.xpath)),
        }
    }

    /// Whether the field's column may be null
    pub fn is_optional(&self) -> bool {
        match self {
            Field::Column(c) => c.optional,
            Field::Link(l) => l.optional,
            Field::BackLink(_) => true,
            Field::Geometry(g) => g.optional,
        }
    }

    /// The same field seen from an ancestor, `prefix` steps above
    pub fn with_prefix(self, prefix: &str, optional: bool) -> Field {
        let join = |key: &str| format!("{}/{}", prefix, key);
        match self {
            Field::Column(mut c) => {
                c.xpath = join(&c.xpath);
                c.optional |= optional;
                Field::Column(c)
            }
            Field::Link(mut l) => {
                l.xpath = join(&l.xpath);
                l.optional |= optional;
                Field::Link(l)
            }
            Field::Geometry(mut g) => {
                g.xpath = join(&g.xpath);
                g.optional |= optional;
                Field::Geometry(g)
            }
            back_link @ Field::BackLink(_) => back_link,
        }
    }

    /// Union of two definitions of the same field
    fn merge(&mut self, other: Field) {
        match (self, other) {
            (Field::Column(a), Field::Column(b)) => {
                a.sql_type = a.sql_type.unify(&b.sql_type);
                a.optional |= b.optional;
            }
            (Field::Link(a), Field::Link(b)) => {
                if a.table != b.table {
                    tracing::warn!(xpath = %a.xpath, kept = %a.table, dropped = %b.table, "link target conflict");
                }
                a.optional |= b.optional;
                a.min_occurs = a.min_occurs.min(b.min_occurs);
                a.max_occurs = widest(a.max_occurs, b.max_occurs);
                if a.substitution_group.is_none() {
                    a.substitution_group = b.substitution_group;
                }
            }
            (Field::Geometry(a), Field::Geometry(b)) => {
                if a.geometry_type != b.geometry_type {
                    a.geometry_type = "GEOMETRY".to_string();
                }
                a.dimension = a.dimension.max(b.dimension);
                a.optional |= b.optional;
            }
            (Field::BackLink(_), Field::BackLink(_)) => {}
            (existing, other) => {
                tracing::warn!(key = %existing.key(), dropped = %other.key(), "field kind conflict");
            }
        }
    }
}

fn widest(a: MaxOccurs, b: MaxOccurs) -> MaxOccurs {
    match (a, b) {
        (MaxOccurs::Bounded(x), MaxOccurs::Bounded(y)) => MaxOccurs::Bounded(x.max(y)),
        _ => MaxOccurs::Unbounded,
    }
}

/// A table of the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Fields keyed by xpath key, uid first
    pub fields: IndexMap<String, Field>,
    /// Key of the uid column ([`SYNTHETIC_UID`] or [`NATURAL_UID`])
    pub uid: String,
    /// False once the table has a natural key and may be shared
    pub mergeable: bool,
    /// Last synthetic id minted for this table
    pub last_id: i64,
    /// Column names by field key, where the derived name was taken
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub renamed: IndexMap<String, String>,
}

impl Table {
    /// Create a table with its identity mechanism
    pub fn new(name: impl Into<String>, natural_id: bool) -> Self {
        let uid = if natural_id {
            Column::new(NATURAL_UID, SqlType::Text, false)
        } else {
            Column {
                auto_increment: true,
                ..Column::new(SYNTHETIC_UID, SqlType::Int, false)
            }
        };
        let mut fields = IndexMap::new();
        fields.insert(uid.xpath.clone(), Field::Column(uid.clone()));
        Self {
            name: name.into(),
            fields,
            uid: uid.xpath,
            mergeable: !natural_id,
            last_id: 0,
            renamed: IndexMap::new(),
        }
    }

    /// Whether rows are identified by their `id` attribute
    pub fn has_natural_id(&self) -> bool {
        self.uid == NATURAL_UID
    }

    /// The uid column
    pub fn uid_column(&self) -> Option<&Column> {
        match self.fields.get(&self.uid) {
            Some(Field::Column(c)) => Some(c),
            _ => None,
        }
    }

    /// Name of the uid column
    pub fn uid_name(&self) -> String {
        xpath::column_name(&self.uid)
    }

    /// Type of the uid column
    pub fn uid_type(&self) -> SqlType {
        self.uid_column().map(|c| c.sql_type.clone()).unwrap_or(SqlType::Int)
    }

    /// Field by xpath key
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Column name of the field under `key`, `None` for one-to-many links
    pub fn column_name(&self, key: &str) -> Option<String> {
        match self.renamed.get(key) {
            Some(name) => Some(name.clone()),
            None => self.fields.get(key).and_then(Field::column_name),
        }
    }

    /// Add a field, merging it with an existing field of the same key
    ///
    /// The uid column is fixed at construction and never merged. A new
    /// field whose derived column name is already taken gets the first
    /// free `<name>_<n>` suffix.
    pub fn add_field(&mut self, field: Field) {
        let key = field.key().into_owned();
        if key == self.uid {
            return;
        }
        if let Some(existing) = self.fields.get_mut(&key) {
            existing.merge(field);
            return;
        }
        if let Some(name) = field.column_name() {
            let taken = self.column_names();
            if taken.contains(&name) {
                let free = (2..)
                    .map(|n| format!("{}_{}", name, n))
                    .find(|candidate| !taken.contains(candidate));
                if let Some(unique) = free {
                    tracing::debug!(table = %self.name, key = %key, column = %unique, "column renamed");
                    self.renamed.insert(key.clone(), unique);
                }
            }
        }
        self.fields.insert(key, field);
    }

    /// Union another definition of this table into this one
    pub fn merge(&mut self, other: Table) {
        self.mergeable &= other.mergeable;
        self.last_id = self.last_id.max(other.last_id);
        for (_, field) in other.fields {
            self.add_field(field);
        }
    }

    /// Links of the table
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.fields.values().filter_map(|f| match f {
            Field::Link(l) => Some(l),
            _ => None,
        })
    }

    /// Column names in field order
    pub fn column_names(&self) -> Vec<String> {
        self.fields.keys().filter_map(|key| self.column_name(key)).collect()
    }
}

/// Cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Integer
    Int(i64),
    /// Floating point
    Real(f64),
    /// Boolean
    Bool(bool),
    /// Text
    Text(String),
    /// Geometry literal
    Geometry {
        /// Well-known text
        wkt: String,
        /// EPSG code
        srid: i32,
    },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Geometry { wkt, srid } => write!(f, "SRID={};{}", srid, wkt),
        }
    }
}

/// One table row: ordered (column name, value) pairs, nulls omitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Column values
    pub values: Vec<(String, Value)>,
}

impl Row {
    /// Value of a column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// Append a column value
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.values.push((column.into(), value));
    }
}

/// Tables, rows and the root table of one or more documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Tables by name
    pub tables: IndexMap<String, Table>,
    /// Rows by table name
    pub rows: IndexMap<String, Vec<Row>>,
    /// Table of the document root
    pub root_table: Option<String>,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Copy of the tables and root table, without rows
    pub fn without_rows(&self) -> Model {
        Model {
            tables: self.tables.clone(),
            rows: IndexMap::new(),
            root_table: self.root_table.clone(),
        }
    }

    /// Rows of a table
    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of rows
    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Union a table into the model
    pub fn merge_table(&mut self, table: Table) {
        match self.tables.get_mut(&table.name) {
            Some(existing) => existing.merge(table),
            None => {
                self.tables.insert(table.name.clone(), table);
            }
        }
    }

    /// Fold another model into this one: tables are unioned, rows appended
    pub fn merge(&mut self, other: Model) {
        for (_, table) in other.tables {
            self.merge_table(table);
        }
        for (name, rows) in other.rows {
            self.rows.entry(name).or_default().extend(rows);
        }
        if self.root_table.is_none() {
            self.root_table = other.root_table;
        }
        builder::add_back_links(self);
    }
}

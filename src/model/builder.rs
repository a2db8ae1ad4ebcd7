//! Model building
//!
//! [`ModelBuilder`] derives tables from one resolved document, optionally
//! folding them into an existing model. Every node gets exactly one
//! [`Placement`]: it roots a table row, is inlined into an ancestor's table,
//! is a geometry, or is empty. The populator reads these placements back
//! instead of re-deriving them, so rows always follow the table shapes.
//!
//! Merging policy, per child of a table node:
//!
//! - geometries become geometry columns;
//! - repeated children, children with a natural `id`, and children reached
//!   through a substitution group get their own table and a link;
//! - other simple-content children are inlined;
//! - other complex children are inlined when their merge cost (nesting
//!   depth and added columns) fits the [`BuildOptions`] budget and no
//!   table of their name exists yet, else they get their own table.

use std::collections::HashMap;

use crate::config::BuildOptions;
use crate::documents::{Element, NodeId};
use crate::error::{BindingError, Error, Result};
use crate::geometry;
use crate::namespaces::namespace_label;
use crate::resolver::{NodeTypeMap, TypeInfo};

use super::xpath::{GEOMETRY, TEXT};
use super::{BackLink, Column, Field, Geometry, Link, Model, SqlType, Table};

/// Role of a node in the relational model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Roots a row of the named table
    Table(String),
    /// Inlined into an ancestor's table row
    Inline,
    /// Geometry subtree, decoded into a column
    Geometry,
    /// No attributes, children or text; contributes nothing
    Empty,
}

/// Placement of every node of a document
pub type PlacementMap = HashMap<NodeId, Placement>;

/// Result of building one document
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The model, including tables of earlier documents
    pub model: Model,
    /// Placements of this document's nodes
    pub placements: PlacementMap,
    /// Table of this document's root, `None` for an empty root
    pub root_table: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Cost {
    depth: usize,
    columns: usize,
}

/// Derives tables from a resolved document
pub struct ModelBuilder<'a> {
    types: &'a NodeTypeMap,
    options: &'a BuildOptions,
    model: Model,
    placements: PlacementMap,
}

impl<'a> ModelBuilder<'a> {
    /// Builder over the type annotations of one document
    pub fn new(types: &'a NodeTypeMap, options: &'a BuildOptions) -> Self {
        Self {
            types,
            options,
            model: Model::new(),
            placements: PlacementMap::new(),
        }
    }

    /// Fold the document into an existing model instead of an empty one
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Build tables for the document rooted at `root`
    pub fn build(mut self, root: &Element) -> Result<BuildOutcome> {
        let span = tracing::info_span!("build", root = %root.qname);
        let _enter = span.enter();

        let root_table = self.build_table(root, root.local_name())?;
        if self.model.root_table.is_none() {
            self.model.root_table = root_table.clone();
        }
        add_back_links(&mut self.model);
        tracing::info!(tables = self.model.tables.len(), nodes = self.placements.len(), "model built");

        Ok(BuildOutcome {
            model: self.model,
            placements: self.placements,
            root_table,
        })
    }

    fn info(&self, node: &Element) -> Result<&'a TypeInfo> {
        let types = self.types;
        types.get(&node.id).ok_or_else(|| {
            Error::resolution(BindingError::new("node has no type annotation").with_tag(node.qname.to_string()))
        })
    }

    /// Table rooted at `node`; `None` when the node is empty
    fn build_table(&mut self, node: &Element, name: &str) -> Result<Option<String>> {
        let info = self.info(node)?;
        if is_empty(node, info) {
            self.placements.insert(node.id, Placement::Empty);
            return Ok(None);
        }

        if !self.model.tables.contains_key(name) {
            let natural = has_natural_id(node, info);
            tracing::debug!(table = %name, natural_id = natural, "new table");
            self.model.tables.insert(name.to_string(), Table::new(name, natural));
        }
        self.placements.insert(node.id, Placement::Table(name.to_string()));

        let fields = self.collect(node, name)?;
        if let Some(table) = self.model.tables.get_mut(name) {
            for field in fields {
                add_field(table, field);
            }
        }
        Ok(Some(name.to_string()))
    }

    /// Fields contributed by `node`, keyed relative to it
    ///
    /// `prefix` names child tables: the owning table name followed by the
    /// tags of inlined ancestors.
    fn collect(&mut self, node: &Element, prefix: &str) -> Result<Vec<Field>> {
        let info = self.info(node)?;
        let mut fields = Vec::new();

        for (local, attr) in &info.attributes {
            fields.push(Field::Column(Column::new(
                format!("@{}", local),
                SqlType::from_kind(&attr.kind),
                !attr.required,
            )));
        }
        if let (Some(kind), Some(_)) = (&info.content, node.text()) {
            fields.push(Field::Column(Column::new(TEXT, SqlType::from_kind(kind), false)));
        }

        for child in &node.children {
            let child_info = self.info(child)?;
            let local = child.local_name();
            let step = key_step(node, child);
            let tag = step.replace(':', "_");
            let optional = child_info.min_occurs == 0 || child_info.nillable;

            if child_info.is_geometry {
                self.placements.insert(child.id, Placement::Geometry);
                fields.push(Field::Geometry(Geometry {
                    xpath: GEOMETRY.to_string(),
                    geometry_type: geometry::wkt_type(local).to_string(),
                    dimension: geometry::srs_dimension(child).unwrap_or(self.options.geometry_dimension_default),
                    srid: geometry::srid(child).unwrap_or(self.options.default_srid),
                    optional,
                }));
                continue;
            }
            if is_empty(child, child_info) {
                self.placements.insert(child.id, Placement::Empty);
                continue;
            }

            let child_prefix = format!("{}_{}", prefix, tag);
            let natural = has_natural_id(child, child_info);
            let inline = if child_info.is_repeated() || natural || child_info.substitutes_for.is_some() {
                false
            } else if child_info.is_simple() {
                true
            } else {
                matches!(self.inline_cost(child, &child_prefix)?, Some(cost) if self.fits(cost))
            };

            if inline {
                tracing::debug!(tag = %step, table = %prefix, "inlined");
                self.placements.insert(child.id, Placement::Inline);
                let nested = self.collect(child, &child_prefix)?;
                fields.extend(nested.into_iter().map(|f| f.with_prefix(&step, optional)));
                continue;
            }

            let target = if natural { tag } else { child_prefix };
            if let Some(target) = self.build_table(child, &target)? {
                let sql_type = self.model.table(&target).map(Table::uid_type).unwrap_or(SqlType::Int);
                fields.push(Field::Link(Link {
                    xpath: step,
                    table: target,
                    optional: optional || child_info.substitutes_for.is_some(),
                    min_occurs: child_info.min_occurs,
                    max_occurs: child_info.max_occurs,
                    sql_type,
                    substitution_group: child_info.substitution_group().map(str::to_string),
                }));
            }
        }
        Ok(fields)
    }

    /// Cost of inlining `node`, `None` when it must root its own table
    fn inline_cost(&self, node: &Element, name: &str) -> Result<Option<Cost>> {
        let info = self.info(node)?;
        if info.is_geometry
            || info.substitutes_for.is_some()
            || has_natural_id(node, info)
            || self.model.tables.contains_key(name)
        {
            return Ok(None);
        }

        let mut cost = Cost {
            depth: 1,
            columns: info.attributes.len() + usize::from(info.is_simple() && node.text().is_some()),
        };
        for child in &node.children {
            let child_info = self.info(child)?;
            if child_info.is_geometry {
                cost.columns += 1;
                continue;
            }
            if is_empty(child, child_info) || child_info.is_repeated() {
                continue;
            }
            if has_natural_id(child, child_info) || child_info.substitutes_for.is_some() {
                // link column
                cost.columns += 1;
            } else if child_info.is_simple() {
                cost.columns += child_info.attributes.len() + 1;
            } else {
                let tag = key_step(node, child).replace(':', "_");
                match self.inline_cost(child, &format!("{}_{}", name, tag))? {
                    Some(nested) if self.fits(nested) => {
                        cost.depth = cost.depth.max(nested.depth + 1);
                        cost.columns += nested.columns;
                    }
                    _ => cost.columns += 1,
                }
            }
        }
        Ok(Some(cost))
    }

    fn fits(&self, cost: Cost) -> bool {
        cost.depth <= self.options.merge_max_depth
            && self.options.merge_max_columns.map_or(true, |max| cost.columns <= max)
    }
}

fn is_empty(node: &Element, info: &TypeInfo) -> bool {
    info.attributes.is_empty() && node.children.is_empty() && node.text().is_none()
}

/// Key step of `child`: its local name, qualified as `label:local` when a
/// sibling has the same local name in another namespace
fn key_step(parent: &Element, child: &Element) -> String {
    let local = child.local_name();
    let clash = parent
        .children
        .iter()
        .any(|other| other.local_name() == local && other.qname.namespace != child.qname.namespace);
    match child.qname.namespace.as_deref().and_then(namespace_label) {
        Some(label) if clash => format!("{}:{}", label, local),
        _ => local.to_string(),
    }
}

fn has_natural_id(node: &Element, info: &TypeInfo) -> bool {
    info.declares_id || node.get_attribute("id").is_some()
}

/// Add a field, relaxing both sides when a child is inlined in one
/// instance and a table in another
fn add_field(table: &mut Table, mut field: Field) {
    let key = field.key().to_string();
    let conflicts: Vec<String> = match &field {
        Field::Link(_) => {
            let nested = format!("{}/", key);
            table.fields.keys().filter(|k| k.starts_with(&nested)).cloned().collect()
        }
        _ => key
            .match_indices('/')
            .map(|(i, _)| key[..i].to_string())
            .filter(|ancestor| matches!(table.fields.get(ancestor), Some(Field::Link(_))))
            .collect(),
    };
    if !conflicts.is_empty() {
        tracing::debug!(table = %table.name, key = %key, "child both inlined and linked");
        relax(&mut field);
        for conflict in conflicts {
            if let Some(existing) = table.fields.get_mut(&conflict) {
                relax(existing);
            }
        }
    }
    table.add_field(field);
}

fn relax(field: &mut Field) {
    match field {
        Field::Column(c) => c.optional = true,
        Field::Link(l) => l.optional = true,
        Field::Geometry(g) => g.optional = true,
        Field::BackLink(_) => {}
    }
}

/// Give the target of every one-to-many link a back-link to its source
///
/// Idempotent: a target already holding a back-link to the source is left
/// alone. Back-links have their own keys, so a table linking to itself
/// still gets one.
pub fn add_back_links(model: &mut Model) {
    let pending: Vec<(String, String, SqlType)> = model
        .tables
        .values()
        .flat_map(|table| {
            table
                .links()
                .filter(|link| link.is_many())
                .map(move |link| (link.table.clone(), table.name.clone(), table.uid_type()))
        })
        .collect();

    for (target, source, sql_type) in pending {
        if let Some(table) = model.tables.get_mut(&target) {
            let present = table
                .fields
                .values()
                .any(|f| matches!(f, Field::BackLink(b) if b.table == source));
            if !present {
                tracing::debug!(table = %target, source = %source, "back-link");
                table.add_field(Field::BackLink(BackLink {
                    table: source,
                    sql_type,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Document;
    use crate::resolver::resolve;
    use crate::schema::{MaxOccurs, SchemaCatalog};
    use pretty_assertions::assert_eq;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="a">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="b" type="xs:string"/>
                <xs:element name="c" type="WithId" minOccurs="0"/>
                <xs:element name="p" type="P" minOccurs="0"/>
                <xs:element name="tag" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
                <xs:element name="e" type="P" minOccurs="0"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
    <xs:complexType name="WithId">
        <xs:sequence><xs:element name="d" type="xs:string"/></xs:sequence>
        <xs:attribute name="id" type="xs:ID"/>
    </xs:complexType>
    <xs:complexType name="P">
        <xs:sequence><xs:element name="q" type="Q" minOccurs="0"/></xs:sequence>
        <xs:attribute name="lang" type="xs:string"/>
    </xs:complexType>
    <xs:complexType name="Q">
        <xs:sequence><xs:element name="r" type="xs:double"/></xs:sequence>
    </xs:complexType>
</xs:schema>"#;

    fn build(xml: &str, options: &BuildOptions) -> BuildOutcome {
        build_into(Model::new(), xml, options)
    }

    fn build_into(model: Model, xml: &str, options: &BuildOptions) -> BuildOutcome {
        build_with(XSD, model, xml, options)
    }

    fn build_with(xsd: &str, model: Model, xml: &str, options: &BuildOptions) -> BuildOutcome {
        let catalog = SchemaCatalog::from_string(xsd).unwrap();
        let doc = Document::from_string(xml).unwrap();
        let types = resolve(doc.root(), &catalog).unwrap();
        ModelBuilder::new(&types, options).with_model(model).build(doc.root()).unwrap()
    }

    fn columns(model: &Model, table: &str) -> Vec<String> {
        model.table(table).unwrap().column_names()
    }

    #[test]
    fn test_natural_id_child_gets_shared_table() {
        let outcome = build(r#"<a><b>txt</b><c id="5"><d>x</d></c></a>"#, &BuildOptions::default());
        let model = &outcome.model;

        assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(columns(model, "a"), vec!["id", "b", "c_id"]);
        assert_eq!(columns(model, "c"), vec!["@id", "d"]);
        assert_eq!(outcome.root_table.as_deref(), Some("a"));
        assert_eq!(model.root_table.as_deref(), Some("a"));

        match model.table("a").unwrap().field("c") {
            Some(Field::Link(link)) => {
                assert_eq!(link.table, "c");
                assert_eq!(link.sql_type, SqlType::Text);
                assert!(!link.is_many());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(outcome.placements[&NodeId(0)], Placement::Table("a".into()));
        assert_eq!(outcome.placements[&NodeId(1)], Placement::Inline);
        assert_eq!(outcome.placements[&NodeId(2)], Placement::Table("c".into()));
    }

    #[test]
    fn test_merge_depth_budget() {
        let xml = r#"<a><b>t</b><p lang="en"><q><r>1.5</r></q></p></a>"#;

        let deep = build(xml, &BuildOptions::default());
        assert_eq!(deep.model.tables.len(), 1);
        assert_eq!(columns(&deep.model, "a"), vec!["id", "b", "p_@lang", "p_q_r"]);
        match deep.model.table("a").unwrap().field("p/q/r/text()") {
            Some(Field::Column(c)) => {
                assert_eq!(c.sql_type, SqlType::Real);
                // p and q are optional particles
                assert!(c.optional);
            }
            other => panic!("unexpected {:?}", other),
        }

        let shallow = build(xml, &BuildOptions::new().with_merge_max_depth(1));
        assert_eq!(shallow.model.tables.keys().collect::<Vec<_>>(), vec!["a", "a_p"]);
        assert_eq!(columns(&shallow.model, "a"), vec!["id", "b", "p_id"]);
        assert_eq!(columns(&shallow.model, "a_p"), vec!["id", "@lang", "q_r"]);

        let none = build(xml, &BuildOptions::new().with_merge_max_depth(0));
        assert_eq!(none.model.tables.keys().collect::<Vec<_>>(), vec!["a", "a_p", "a_p_q"]);
        assert_eq!(columns(&none.model, "a_p_q"), vec!["id", "r"]);
        // simple children stay inlined at any depth
        assert_eq!(columns(&none.model, "a"), vec!["id", "b", "p_id"]);
    }

    #[test]
    fn test_merge_column_budget() {
        let xml = r#"<a><b>t</b><p lang="en"><q><r>1.5</r></q></p></a>"#;
        let outcome = build(xml, &BuildOptions::new().with_merge_max_columns(Some(1)));
        assert_eq!(outcome.model.tables.keys().collect::<Vec<_>>(), vec!["a", "a_p"]);
        assert_eq!(columns(&outcome.model, "a_p"), vec!["id", "@lang", "q_r"]);
    }

    #[test]
    fn test_repeated_simple_child_gets_table_and_back_link() {
        let outcome = build(r#"<a><b>t</b><tag>x</tag><tag>y</tag></a>"#, &BuildOptions::default());
        let model = &outcome.model;

        assert_eq!(columns(model, "a"), vec!["id", "b"]);
        assert_eq!(columns(model, "a_tag"), vec!["id", "v", "a_id"]);
        match model.table("a").unwrap().field("tag") {
            Some(Field::Link(link)) => {
                assert!(link.is_many());
                assert_eq!(link.max_occurs, MaxOccurs::Unbounded);
                assert_eq!(link.table, "a_tag");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            model.table("a_tag").unwrap().field(&BackLink::key_for("a")),
            Some(&Field::BackLink(BackLink {
                table: "a".into(),
                sql_type: SqlType::Int,
            }))
        );
    }

    #[test]
    fn test_empty_nodes_contribute_nothing() {
        let outcome = build(r#"<a><b>t</b><p/></a>"#, &BuildOptions::default());
        assert_eq!(columns(&outcome.model, "a"), vec!["id", "b"]);
        assert_eq!(outcome.placements[&NodeId(2)], Placement::Empty);
    }

    #[test]
    fn test_shape_is_deterministic() {
        let xml = r#"<a><b>t</b><c id="1"><d>x</d></c><p><q><r>2</r></q></p><tag>x</tag><e lang="de"/></a>"#;
        let first = build(xml, &BuildOptions::default());
        let second = build(xml, &BuildOptions::default());
        assert_eq!(first.model, second.model);
        assert_eq!(first.placements, second.placements);
    }

    #[test]
    fn test_existing_tables_are_extended() {
        let first = build(r#"<a><b>t</b></a>"#, &BuildOptions::default());
        let second = build_into(first.model, r#"<a><b>u</b><p lang="fr"/></a>"#, &BuildOptions::default());
        assert_eq!(columns(&second.model, "a"), vec!["id", "b", "p_@lang"]);
    }

    #[test]
    fn test_existing_child_table_is_reused() {
        let options = BuildOptions::new().with_merge_max_depth(1);
        let first = build(r#"<a><b>t</b><p><q><r>1</r></q></p></a>"#, &options);
        assert!(first.model.table("a_p").is_some());

        // a shallow p would fit the budget but the table already exists
        let second = build_into(first.model, r#"<a><b>t</b><p lang="x"/></a>"#, &options);
        assert_eq!(second.placements[&NodeId(2)], Placement::Table("a_p".into()));
        assert_eq!(columns(&second.model, "a"), vec!["id", "b", "p_id"]);
    }

    #[test]
    fn test_inlined_then_linked_child_relaxes_both() {
        // first e fits, second does not; both land in the same table
        let options = BuildOptions::new().with_merge_max_depth(1);
        let outcome = build(r#"<a><b>t</b><e lang="x"/></a>"#, &options);
        let outcome = build_into(outcome.model, r#"<a><b>t</b><e><q><r>1</r></q></e></a>"#, &options);
        let a = outcome.model.table("a").unwrap();
        assert!(a.field("e/@lang").unwrap().is_optional());
        assert!(a.field("e").unwrap().is_optional());
    }

    #[test]
    fn test_back_links_are_idempotent() {
        let mut model = build(r#"<a><b>t</b><tag>x</tag></a>"#, &BuildOptions::default()).model;
        let before = model.clone();
        add_back_links(&mut model);
        assert_eq!(model, before);
    }

    const TREE_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="node" type="NodeType"/>
    <xs:complexType name="NodeType">
        <xs:sequence>
            <xs:element name="name" type="xs:string"/>
            <xs:element name="node" type="NodeType" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
        <xs:attribute name="id" type="xs:ID"/>
    </xs:complexType>
</xs:schema>"#;

    #[test]
    fn test_table_linking_to_itself_gets_back_link() {
        let xml = r#"<node id="r"><name>root</name><node id="c1"><name>kid</name></node></node>"#;
        let mut model = build_with(TREE_XSD, Model::new(), xml, &BuildOptions::default()).model;

        assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["node"]);
        let node = model.table("node").unwrap();
        assert!(matches!(node.field("node"), Some(Field::Link(l)) if l.is_many() && l.table == "node"));
        assert_eq!(
            node.field(&BackLink::key_for("node")),
            Some(&Field::BackLink(BackLink {
                table: "node".into(),
                sql_type: SqlType::Text,
            }))
        );
        assert_eq!(columns(&model, "node"), vec!["@id", "name", "node_id"]);

        let before = model.clone();
        add_back_links(&mut model);
        assert_eq!(model, before);
    }

    #[test]
    fn test_same_local_name_in_two_namespaces() {
        let app = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:meta="urn:example:meta"
           targetNamespace="urn:example:app" elementFormDefault="qualified">
    <xs:import namespace="urn:example:meta" schemaLocation="meta.xsd"/>
    <xs:element name="a">
        <xs:complexType>
            <xs:sequence>
                <xs:element ref="meta:name"/>
                <xs:element name="name" type="xs:string"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;
        let meta = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:example:meta">
    <xs:element name="name" type="xs:string"/>
</xs:schema>"#;
        let catalog =
            SchemaCatalog::from_documents(&[("memory/app.xsd", app), ("memory/meta.xsd", meta)]).unwrap();
        let doc = Document::from_string(
            r#"<app:a xmlns:app="urn:example:app" xmlns:m="urn:example:meta"><m:name>g</m:name><app:name>x</app:name></app:a>"#,
        )
        .unwrap();
        let types = resolve(doc.root(), &catalog).unwrap();
        let model = ModelBuilder::new(&types, &BuildOptions::default()).build(doc.root()).unwrap().model;

        let a = model.table("a").unwrap();
        assert!(a.field("meta:name/text()").is_some());
        assert!(a.field("app:name/text()").is_some());
        assert_eq!(columns(&model, "a"), vec!["id", "meta_name", "app_name"]);
    }

    #[test]
    fn test_column_names_stay_unique() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="a">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="id" type="xs:int"/>
                <xs:element name="p">
                    <xs:complexType>
                        <xs:sequence><xs:element name="q" type="xs:string"/></xs:sequence>
                    </xs:complexType>
                </xs:element>
                <xs:element name="p_q" type="xs:string"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;
        let xml = "<a><id>77</id><p><q>x</q></p><p_q>y</p_q></a>";
        let model = build_with(xsd, Model::new(), xml, &BuildOptions::default()).model;

        let a = model.table("a").unwrap();
        assert_eq!(columns(&model, "a"), vec!["id", "id_2", "p_q", "p_q_2"]);
        assert_eq!(a.uid_name(), "id");
        assert_eq!(a.column_name("id/text()").as_deref(), Some("id_2"));
        assert_eq!(a.column_name("p_q/text()").as_deref(), Some("p_q_2"));

        // a second build keeps the same names
        let again = build_with(xsd, model.clone(), xml, &BuildOptions::default()).model;
        assert_eq!(columns(&again, "a"), vec!["id", "id_2", "p_q", "p_q_2"]);
    }

    const GML_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:gml="http://www.opengis.net/gml/3.2"
           targetNamespace="http://www.opengis.net/gml/3.2" elementFormDefault="qualified">
    <xs:complexType name="AbstractGeometryType" abstract="true">
        <xs:attribute name="srsName" type="xs:anyURI"/>
    </xs:complexType>
    <xs:complexType name="PointType">
        <xs:complexContent><xs:extension base="gml:AbstractGeometryType"/></xs:complexContent>
    </xs:complexType>
    <xs:element name="Point" type="gml:PointType"/>
    <xs:complexType name="PointPropertyType">
        <xs:sequence><xs:element ref="gml:Point"/></xs:sequence>
    </xs:complexType>
</xs:schema>"#;

    const FEATURE_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:gml="http://www.opengis.net/gml/3.2">
    <xs:import namespace="http://www.opengis.net/gml/3.2" schemaLocation="gml.xsd"/>
    <xs:element name="site">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="where" type="gml:PointPropertyType"/>
                <xs:element ref="Marker" minOccurs="0"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
    <xs:element name="Marker" abstract="true" type="MarkerType"/>
    <xs:complexType name="MarkerType"><xs:sequence><xs:element name="label" type="xs:string"/></xs:sequence></xs:complexType>
    <xs:element name="Pin" type="MarkerType" substitutionGroup="Marker"/>
</xs:schema>"#;

    fn build_feature(xml: &str) -> BuildOutcome {
        let catalog =
            SchemaCatalog::from_documents(&[("memory/site.xsd", FEATURE_XSD), ("memory/gml.xsd", GML_XSD)]).unwrap();
        let doc = Document::from_string(xml).unwrap();
        let types = resolve(doc.root(), &catalog).unwrap();
        ModelBuilder::new(&types, &BuildOptions::default()).build(doc.root()).unwrap()
    }

    #[test]
    fn test_geometry_and_substitution_fields() {
        let outcome = build_feature(
            r#"<site xmlns:gml="http://www.opengis.net/gml/3.2">
                <where><gml:Point srsName="urn:ogc:def:crs:EPSG::25832"><gml:pos>1 2</gml:pos></gml:Point></where>
                <Pin><label>here</label></Pin>
            </site>"#,
        );
        let site = outcome.model.table("site").unwrap();
        assert_eq!(site.column_names(), vec!["id", "where", "Pin_id"]);

        match site.field("where/geometry()") {
            Some(Field::Geometry(g)) => {
                assert_eq!(g.geometry_type, "POINT");
                assert_eq!(g.srid, 25832);
                assert_eq!(g.dimension, 2);
                assert!(!g.optional);
            }
            other => panic!("unexpected {:?}", other),
        }
        match site.field("Pin") {
            Some(Field::Link(link)) => {
                assert_eq!(link.substitution_group.as_deref(), Some("Marker"));
                assert!(link.optional);
                assert_eq!(link.table, "site_Pin");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(outcome.placements[&NodeId(2)], Placement::Geometry);
    }
}

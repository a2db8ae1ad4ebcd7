//! Row population
//!
//! [`InstancePopulator`] walks a document along the placements recorded
//! by the builder and emits one row per table-rooting node. Rows of
//! natural-id tables are identified by their `id` attribute and emitted
//! once per distinct id; all other rows get the next value of their
//! table's counter.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::documents::Element;
use crate::error::{BindingError, Error, Result};
use crate::geometry::GeometryCodec;

use super::builder::{Placement, PlacementMap};
use super::xpath;
use super::{Field, Link, Model, Row, Table, Value};

/// Row that is populating a child through a link
#[derive(Debug, Clone, Copy)]
pub struct Parent<'p> {
    /// Table of the parent row
    pub table: &'p str,
    /// Id of the parent row
    pub id: &'p Value,
}

/// Rows emitted for one document, not yet part of the model
#[derive(Debug, Clone, Default)]
pub struct Population {
    /// New rows by table name
    pub rows: IndexMap<String, Vec<Row>>,
    /// Last synthetic id minted per table
    pub last_ids: HashMap<String, i64>,
}

impl Population {
    /// Number of new rows
    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Append the rows to `model` and advance its counters
    pub fn commit(self, model: &mut Model) {
        for (name, last_id) in self.last_ids {
            if let Some(table) = model.tables.get_mut(&name) {
                table.last_id = table.last_id.max(last_id);
            }
        }
        for (name, rows) in self.rows {
            model.rows.entry(name).or_default().extend(rows);
        }
    }
}

/// Emits rows for a document whose tables were built by [`ModelBuilder`](super::ModelBuilder)
pub struct InstancePopulator<'a> {
    model: &'a Model,
    placements: &'a PlacementMap,
    codec: &'a dyn GeometryCodec,
    rows: IndexMap<String, Vec<Row>>,
    counters: HashMap<String, i64>,
    emitted: HashMap<String, HashSet<String>>,
}

impl<'a> InstancePopulator<'a> {
    /// Populator over a built model and the document's placements
    pub fn new(model: &'a Model, placements: &'a PlacementMap, codec: &'a dyn GeometryCodec) -> Self {
        let counters = model.tables.values().map(|t| (t.name.clone(), t.last_id)).collect();
        let emitted = model
            .tables
            .values()
            .filter(|t| t.has_natural_id())
            .map(|t| {
                let uid = t.uid_name();
                let ids = model
                    .rows(&t.name)
                    .iter()
                    .filter_map(|row| row.get(&uid))
                    .map(Value::to_string)
                    .collect();
                (t.name.clone(), ids)
            })
            .collect();
        Self {
            model,
            placements,
            codec,
            rows: IndexMap::new(),
            counters,
            emitted,
        }
    }

    /// Populate the document rooted at `root` into `root_table`
    pub fn populate_document(mut self, root: &Element, root_table: &str) -> Result<Population> {
        let span = tracing::info_span!("populate", root = %root.qname, table = %root_table);
        let _enter = span.enter();

        self.populate(root, root_table, None)?;
        let population = Population {
            rows: self.rows,
            last_ids: self.counters,
        };
        tracing::info!(rows = population.row_count(), "document populated");
        Ok(population)
    }

    /// Emit the row rooted at `node` into `table_name` and return its id
    pub fn populate(&mut self, node: &Element, table_name: &str, parent: Option<Parent<'_>>) -> Result<Value> {
        let model = self.model;
        let table = model.table(table_name).ok_or_else(|| {
            Error::resolution(
                BindingError::new("no table for node")
                    .with_tag(node.qname.to_string())
                    .with_table(table_name),
            )
        })?;

        let id = if table.has_natural_id() {
            let value = match node.get_attribute("id") {
                Some(value) => value.to_string(),
                None => format!("{}_{}", table.name, self.next_id(table)),
            };
            if !self.emitted.entry(table.name.clone()).or_default().insert(value.clone()) {
                tracing::debug!(table = %table.name, id = %value, "row already emitted");
                return Ok(Value::Text(value));
            }
            Value::Text(value)
        } else {
            Value::Int(self.next_id(table))
        };

        // parents precede their children so links resolve in emission order
        let slot = self.reserve(&table.name);
        let mut row = Row::default();
        row.push(table.uid_name(), id.clone());

        for (key, field) in &table.fields {
            if *key == table.uid {
                continue;
            }
            let column_name = table.column_name(key);
            match field {
                Field::Column(column) => match xpath::select_text(node, &column.xpath, self.placements) {
                    Some(text) => {
                        if let Some(name) = column_name {
                            row.push(name, column.sql_type.parse_value(&text));
                        }
                    }
                    None if column.optional => {}
                    None => return Err(violation(node, table, &column.xpath, "required value is missing")),
                },
                Field::Link(link) => {
                    let children = xpath::select_nodes(node, &link.xpath, self.placements);
                    if children.is_empty() && !link.optional {
                        return Err(violation(node, table, &link.xpath, "required child is missing"));
                    }
                    if !link.max_occurs.allows(children.len()) {
                        return Err(violation(
                            node,
                            table,
                            &link.xpath,
                            &format!("{} occurrences exceed maxOccurs {}", children.len(), link.max_occurs),
                        ));
                    }
                    let me = Parent {
                        table: &table.name,
                        id: &id,
                    };
                    let mut last = None;
                    for child in children {
                        let target = self.target(child, link);
                        last = Some(self.populate(child, target, Some(me))?);
                    }
                    if let (false, Some(child_id), Some(column)) = (link.is_many(), last, column_name) {
                        row.push(column, child_id);
                    }
                }
                Field::BackLink(back_link) => {
                    if let (Some(parent), Some(column)) = (parent, column_name) {
                        if parent.table == back_link.table {
                            row.push(column, parent.id.clone());
                        }
                    }
                }
                Field::Geometry(geometry) => match xpath::select_geometry(node, &geometry.xpath, self.placements) {
                    Some(subtree) => match self.codec.decode(subtree) {
                        Some((wkt, srid)) => {
                            if let Some(name) = column_name {
                                row.push(name, Value::Geometry { wkt, srid });
                            }
                        }
                        None => {
                            tracing::warn!(table = %table.name, xpath = %geometry.xpath, tag = %subtree.qname, "geometry decode failed, column left null");
                        }
                    },
                    None if geometry.optional => {}
                    None => return Err(violation(node, table, &geometry.xpath, "required geometry is missing")),
                },
            }
        }

        if let Some(reserved) = self.rows.get_mut(&table.name).and_then(|rows| rows.get_mut(slot)) {
            *reserved = row;
        }
        Ok(id)
    }

    fn reserve(&mut self, table: &str) -> usize {
        let rows = self.rows.entry(table.to_string()).or_default();
        rows.push(Row::default());
        rows.len() - 1
    }

    fn target(&self, child: &Element, link: &'a Link) -> &'a str {
        let placements = self.placements;
        match placements.get(&child.id) {
            Some(Placement::Table(name)) => name,
            _ => &link.table,
        }
    }

    fn next_id(&mut self, table: &Table) -> i64 {
        let counter = self.counters.entry(table.name.clone()).or_insert(table.last_id);
        *counter += 1;
        *counter
    }
}

fn violation(node: &Element, table: &Table, xpath: &str, message: &str) -> Error {
    Error::cardinality(
        BindingError::new(message)
            .with_tag(node.qname.to_string())
            .with_table(&table.name)
            .with_xpath(xpath),
    )
}

//! SQL output
//!
//! Renders a [`Model`] as SQL text: one `CREATE TABLE` per table in model
//! order, then one `INSERT` per row listing only its non-null columns.
//! The script runs in a single transaction and foreign keys are checked
//! at commit, so rows may reference rows inserted after them. The dialect is SQLite/SpatiaLite flavoured: geometry values are written
//! as `GeomFromText('<wkt>', <srid>)`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{Field, Model, Row, Table, Value};

/// Quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL literal of a cell value
pub fn literal(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Real(v) if v.is_finite() => v.to_string(),
        Value::Real(v) => quote_literal(&v.to_string()),
        Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        Value::Text(v) => quote_literal(v),
        Value::Geometry { wkt, srid } => format!("GeomFromText({}, {})", quote_literal(wkt), srid),
    }
}

/// `CREATE TABLE` statement for `table`
pub fn create_table(model: &Model, table: &Table) -> String {
    let mut lines = Vec::new();
    let mut constraints = Vec::new();
    let mut groups: BTreeMap<&str, (Vec<String>, bool)> = BTreeMap::new();

    for (key, field) in &table.fields {
        let column = match table.column_name(key) {
            Some(column) => column,
            None => continue,
        };
        let mut line = format!("    {}", quote_ident(&column));

        if *key == table.uid {
            if table.has_natural_id() {
                line.push_str(" TEXT PRIMARY KEY NOT NULL");
            } else {
                line.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
            }
            lines.push(line);
            continue;
        }

        let sql_type = match field {
            Field::Column(c) => c.sql_type.sql_name().to_string(),
            Field::Link(l) => l.sql_type.sql_name().to_string(),
            Field::BackLink(b) => b.sql_type.sql_name().to_string(),
            Field::Geometry(g) => g.geometry_type.clone(),
        };
        let _ = write!(line, " {}", sql_type);
        if !field.is_optional() {
            line.push_str(" NOT NULL");
        }
        lines.push(line);

        let target = match field {
            Field::Link(l) => {
                if let Some(group) = &l.substitution_group {
                    let entry = groups.entry(group.as_str()).or_default();
                    entry.0.push(column.clone());
                    entry.1 |= l.min_occurs > 0;
                }
                Some(l.table.as_str())
            }
            Field::BackLink(b) => Some(b.table.as_str()),
            _ => None,
        };
        if let Some(target) = target {
            let uid = model.table(target).map(Table::uid_name).unwrap_or_else(|| "id".to_string());
            constraints.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {} ({}) DEFERRABLE INITIALLY DEFERRED",
                quote_ident(&column),
                quote_ident(target),
                quote_ident(&uid)
            ));
        }
    }

    for (group, (columns, required)) in groups {
        let set = columns
            .iter()
            .map(|c| format!("({} IS NOT NULL)", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" + ");
        let op = if required { "=" } else { "<=" };
        constraints.push(format!(
            "    CONSTRAINT {} CHECK ({} {} 1)",
            quote_ident(&format!("{}_{}_xor", table.name, group)),
            set,
            op
        ));
    }

    lines.extend(constraints);
    format!("CREATE TABLE {} (\n{}\n);", quote_ident(&table.name), lines.join(",\n"))
}

/// `INSERT` statement for one row of `table`
pub fn insert(table: &str, row: &Row) -> String {
    let columns = row.values.iter().map(|(c, _)| quote_ident(c)).collect::<Vec<_>>();
    let values = row.values.iter().map(|(_, v)| literal(v)).collect::<Vec<_>>();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        columns.join(", "),
        values.join(", ")
    )
}

/// Full script: schema, then data
pub fn to_sql(model: &Model) -> String {
    let mut out = String::from("BEGIN;\n\n");
    for table in model.tables.values() {
        out.push_str(&create_table(model, table));
        out.push_str("\n\n");
    }
    for (name, rows) in &model.rows {
        for row in rows {
            out.push_str(&insert(name, row));
            out.push('\n');
        }
    }
    out.push_str("COMMIT;\n");
    tracing::debug!(tables = model.tables.len(), rows = model.row_count(), bytes = out.len(), "sql rendered");
    out
}

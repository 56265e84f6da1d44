//! Evaluates a projection query against the simulated catalog.

use serde_json::{Map, Value};

use crate::ast::{Field, Nested, ProjectionQuery, QualifiedName};
use crate::driver::DriverResult;

use super::catalog::{rejected, Catalog, Cell, Row, Table};

fn relation<'a>(catalog: &'a Catalog, name: &QualifiedName) -> DriverResult<&'a Table> {
    catalog
        .table(name)
        .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", name)))
}

fn is_live(row: &Row, soft_delete: Option<&str>) -> bool {
    match soft_delete {
        Some(column) => row.get(column).map(Cell::is_null).unwrap_or(true),
        None => true,
    }
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Cell {
    const NULL: &Cell = &Cell::Null;
    row.get(column).unwrap_or(NULL)
}

fn object(catalog: &Catalog, row: &Row, fields: &[Field]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|f| (f.output_name().to_string(), catalog.to_json(cell(row, &f.column))))
        .collect();
    Value::Object(map)
}

/// Rows of the projection, in root-table order.
pub(crate) fn evaluate(catalog: &Catalog, query: &ProjectionQuery) -> DriverResult<Vec<Map<String, Value>>> {
    for (table, column) in query.column_refs() {
        if relation(catalog, &table)?.column(&column).is_none() {
            return Err(rejected(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, table
            )));
        }
    }

    let root = relation(catalog, &query.root.table)?;
    let mut out = Vec::new();

    for row in root.rows.iter().filter(|r| is_live(r, query.root.soft_delete.as_deref())) {
        let mut doc = Map::new();
        for field in &query.root.fields {
            doc.insert(
                field.output_name().to_string(),
                catalog.to_json(cell(row, &field.column)),
            );
        }
        let key = catalog.to_json(cell(row, &query.root.key));

        for nested in &query.nested {
            let value = match nested {
                Nested::Expand(expand) => {
                    let lookup = relation(catalog, &expand.lookup)?;
                    let elements: Vec<String> = match catalog.to_json(cell(row, &expand.array_column)) {
                        Value::Array(items) => items
                            .into_iter()
                            .map(|item| match item {
                                Value::String(s) => s,
                                other => other.to_string(),
                            })
                            .collect(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(rejected(format!("cannot extract elements from a scalar: {}", other)));
                        }
                    };
                    let mut items = Vec::new();
                    for element in &elements {
                        for target in lookup.rows.iter().filter(|r| {
                            is_live(r, expand.soft_delete.as_deref())
                                && catalog.to_text(cell(r, &expand.lookup_key)).as_deref() == Some(element.as_str())
                        }) {
                            items.push(object(catalog, target, &expand.fields));
                        }
                    }
                    Value::Array(items)
                }
                Nested::Children(children) => {
                    let table = relation(catalog, &children.table)?;
                    let mut matched: Vec<&Row> = table
                        .rows
                        .iter()
                        .filter(|r| {
                            is_live(r, children.soft_delete.as_deref())
                                && !key.is_null()
                                && catalog.to_json(cell(r, &children.foreign_key)) == key
                        })
                        .collect();
                    if let Some(order) = &children.order_by {
                        matched.sort_by(|a, b| catalog.compare(cell(a, order), cell(b, order)));
                    }
                    Value::Array(matched.into_iter().map(|r| object(catalog, r, &children.fields)).collect())
                }
                Nested::Parent(parent) => {
                    let table = relation(catalog, &parent.table)?;
                    let reference = catalog.to_json(cell(row, &parent.column));
                    table
                        .rows
                        .iter()
                        .find(|r| {
                            is_live(r, parent.soft_delete.as_deref())
                                && !reference.is_null()
                                && catalog.to_json(cell(r, &parent.key)) == reference
                        })
                        .map(|r| object(catalog, r, &parent.fields))
                        .unwrap_or(Value::Null)
                }
            };
            doc.insert(nested.name().to_string(), value);
        }
        out.push(doc);
    }
    Ok(out)
}

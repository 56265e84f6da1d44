//! Simulated PostgreSQL catalog.
//!
//! Enum values are stored the way PostgreSQL stores them: as the oid of a
//! `pg_enum` member. Renaming a label keeps its oid, so a row's stored value
//! only changes when something writes the row.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::ast::{
    ColumnDef, DataType, DefaultValue, EnumPosition, IndexDef, IndexMethod, ProjectionQuery,
    QualifiedName, SchemaOp, TableDef,
};
use crate::driver::{DriverError, DriverResult};

use super::projection;

pub(crate) fn rejected(message: impl Into<String>) -> DriverError {
    DriverError::Rejected(message.into())
}

/// One stored value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    Value(Value),
    /// Oid of an enum member.
    Enum(u32),
}

impl Cell {
    pub(crate) fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

pub(crate) type Row = BTreeMap<String, Cell>;

#[derive(Debug, Clone)]
pub(crate) struct EnumType {
    /// `(oid, label)` in declared order.
    pub members: Vec<(u32, String)>,
}

impl EnumType {
    pub fn labels(&self) -> Vec<String> {
        self.members.iter().map(|(_, label)| label.clone()).collect()
    }

    fn oid_of(&self, label: &str) -> Option<u32> {
        self.members.iter().find(|(_, l)| l == label).map(|(oid, _)| *oid)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct View {
    pub query: ProjectionQuery,
    pub rows: Vec<Map<String, Value>>,
}

/// Names of every object in the catalog, for before/after comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogObjects {
    pub schemas: BTreeSet<String>,
    pub extensions: BTreeSet<String>,
    pub tables: BTreeSet<String>,
    pub enums: BTreeSet<String>,
    pub views: BTreeSet<String>,
    pub indexes: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Catalog {
    schemas: BTreeSet<String>,
    extensions: BTreeSet<String>,
    enums: BTreeMap<QualifiedName, EnumType>,
    tables: BTreeMap<QualifiedName, Table>,
    views: BTreeMap<QualifiedName, View>,
    indexes: BTreeMap<QualifiedName, IndexDef>,
    next_oid: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            schemas: BTreeSet::from(["public".to_string()]),
            extensions: BTreeSet::new(),
            enums: BTreeMap::new(),
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_oid: 16384,
        }
    }
}

impl Catalog {
    pub fn table(&self, name: &QualifiedName) -> Option<&Table> {
        self.tables.get(&name.resolved())
    }

    fn table_mut(&mut self, name: &QualifiedName) -> DriverResult<&mut Table> {
        self.tables
            .get_mut(&name.resolved())
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", name)))
    }

    pub fn view(&self, name: &QualifiedName) -> Option<&View> {
        self.views.get(&name.resolved())
    }

    pub fn enum_type(&self, name: &QualifiedName) -> Option<&EnumType> {
        self.enums.get(&name.resolved())
    }

    pub fn index(&self, name: &QualifiedName) -> Option<&IndexDef> {
        self.indexes.get(&name.resolved())
    }

    pub fn objects(&self) -> CatalogObjects {
        CatalogObjects {
            schemas: self.schemas.clone(),
            extensions: self.extensions.clone(),
            tables: self.tables.keys().map(|n| n.to_string()).collect(),
            enums: self.enums.keys().map(|n| n.to_string()).collect(),
            views: self.views.keys().map(|n| n.to_string()).collect(),
            indexes: self.indexes.keys().map(|n| n.to_string()).collect(),
        }
    }

    /// Label of an enum member oid.
    pub fn label(&self, oid: u32) -> Option<&str> {
        self.enums
            .values()
            .flat_map(|e| e.members.iter())
            .find(|(o, _)| *o == oid)
            .map(|(_, l)| l.as_str())
    }

    /// Position of an enum member in its type's declared order.
    pub fn sort_position(&self, oid: u32) -> Option<usize> {
        self.enums
            .values()
            .find_map(|e| e.members.iter().position(|(o, _)| *o == oid))
    }

    /// JSON rendering of a cell, as `to_json` would produce it.
    pub fn to_json(&self, cell: &Cell) -> Value {
        match cell {
            Cell::Null => Value::Null,
            Cell::Value(v) => v.clone(),
            Cell::Enum(oid) => self
                .label(*oid)
                .map(|l| Value::String(l.to_string()))
                .unwrap_or(Value::Null),
        }
    }

    /// Text rendering of a cell, as a `::text` cast would produce it.
    pub fn to_text(&self, cell: &Cell) -> Option<String> {
        match self.to_json(cell) {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Ordering used by `ORDER BY`: enums by declared position, nulls last.
    pub fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        match (a, b) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Null, _) => Ordering::Greater,
            (_, Cell::Null) => Ordering::Less,
            (Cell::Enum(x), Cell::Enum(y)) => self.sort_position(*x).cmp(&self.sort_position(*y)),
            (Cell::Value(Value::Number(x)), Cell::Value(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Cell::Value(Value::Bool(x)), Cell::Value(Value::Bool(y))) => x.cmp(y),
            _ => self.to_text(a).cmp(&self.to_text(b)),
        }
    }

    pub fn rows_json(&self, table: &QualifiedName) -> Option<Vec<Map<String, Value>>> {
        let table = self.table(table)?;
        Some(
            table
                .rows
                .iter()
                .map(|row| row.iter().map(|(k, c)| (k.clone(), self.to_json(c))).collect())
                .collect(),
        )
    }

    fn relation_exists(&self, name: &QualifiedName) -> bool {
        let name = name.resolved();
        self.tables.contains_key(&name) || self.views.contains_key(&name) || self.indexes.contains_key(&name)
    }

    fn require_schema(&self, name: &QualifiedName) -> DriverResult<()> {
        if !self.schemas.contains(name.schema()) {
            return Err(rejected(format!("schema \"{}\" does not exist", name.schema())));
        }
        Ok(())
    }

    fn views_reading(&self, table: &QualifiedName) -> Option<&QualifiedName> {
        let table = table.resolved();
        self.views
            .iter()
            .find(|(_, v)| v.query.relations().contains(&table))
            .map(|(name, _)| name)
    }

    fn check_type(&self, data_type: &DataType) -> DriverResult<()> {
        if let Some(name) = data_type.enum_type() {
            if self.enum_type(name).is_none() {
                return Err(rejected(format!("type \"{}\" does not exist", name)));
            }
        }
        if let Some(extension) = data_type.required_extension() {
            if !self.extensions.contains(extension) {
                return Err(rejected(format!(
                    "type \"geometry\" does not exist (extension \"{}\" is not installed)",
                    extension
                )));
            }
        }
        Ok(())
    }

    fn check_column(&self, column: &ColumnDef) -> DriverResult<()> {
        self.check_type(&column.data_type)?;
        if let Some(default) = &column.default {
            self.eval_default(&column.data_type, default)?;
        }
        if let Some(references) = &column.references {
            let target = self
                .table(&references.table)
                .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", references.table)))?;
            if target.column(&references.column).is_none() {
                return Err(rejected(format!(
                    "column \"{}\" referenced in foreign key constraint does not exist",
                    references.column
                )));
            }
        }
        Ok(())
    }

    /// Coerce a JSON value into a cell of the given type.
    fn coerce(&self, data_type: &DataType, value: &Value) -> DriverResult<Cell> {
        if value.is_null() {
            return Ok(Cell::Null);
        }
        match data_type {
            DataType::Enum(name) => {
                let label = value
                    .as_str()
                    .ok_or_else(|| rejected(format!("invalid input value for enum {}: {}", name, value)))?;
                self.enum_cell(name, label)
            }
            _ => Ok(Cell::Value(value.clone())),
        }
    }

    fn enum_cell(&self, type_name: &QualifiedName, label: &str) -> DriverResult<Cell> {
        let enum_type = self
            .enum_type(type_name)
            .ok_or_else(|| rejected(format!("type \"{}\" does not exist", type_name)))?;
        enum_type
            .oid_of(label)
            .map(Cell::Enum)
            .ok_or_else(|| rejected(format!("invalid input value for enum {}: \"{}\"", type_name, label)))
    }

    fn eval_default(&self, data_type: &DataType, default: &DefaultValue) -> DriverResult<Cell> {
        Ok(match default {
            DefaultValue::Now => Cell::Value(Value::String(Utc::now().to_rfc3339())),
            DefaultValue::RandomUuid => Cell::Value(Value::String(uuid::Uuid::new_v4().to_string())),
            DefaultValue::Bool(b) => Cell::Value(Value::Bool(*b)),
            DefaultValue::Int(n) => Cell::Value(Value::from(*n)),
            DefaultValue::EmptyJsonArray => Cell::Value(Value::Array(Vec::new())),
            DefaultValue::Text(s) | DefaultValue::EnumLabel(s) => {
                self.coerce(data_type, &Value::String(s.clone()))?
            }
        })
    }

    /// Value of `cell::data_type`.
    fn cast(&self, cell: &Cell, data_type: &DataType) -> DriverResult<Cell> {
        match (cell, data_type) {
            (Cell::Null, _) => Ok(Cell::Null),
            (Cell::Enum(oid), DataType::Enum(name)) => {
                let enum_type = self
                    .enum_type(name)
                    .ok_or_else(|| rejected(format!("type \"{}\" does not exist", name)))?;
                if enum_type.members.iter().any(|(o, _)| o == oid) {
                    Ok(cell.clone())
                } else {
                    Err(rejected(format!("cannot cast value to type {}", name)))
                }
            }
            (_, DataType::Enum(name)) => {
                let text = self.to_text(cell).unwrap_or_default();
                self.enum_cell(name, &text)
            }
            (_, DataType::Text) | (_, DataType::Varchar(_)) => {
                Ok(self.to_text(cell).map(|t| Cell::Value(Value::String(t))).unwrap_or(Cell::Null))
            }
            (Cell::Enum(_), other) => Err(rejected(format!(
                "cannot cast enum value to {:?}",
                other
            ))),
            (Cell::Value(_), _) => Ok(cell.clone()),
        }
    }

    /// Build a full row from a JSON object, applying defaults and NOT NULL.
    pub fn make_row(&self, table: &QualifiedName, values: &Map<String, Value>) -> DriverResult<Row> {
        let def = self
            .table(table)
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", table)))?;
        if let Some(unknown) = values.keys().find(|k| def.column(k).is_none()) {
            return Err(rejected(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }
        let mut row = Row::new();
        for column in &def.columns {
            let cell = match values.get(&column.name) {
                Some(value) => self.coerce(&column.data_type, value)?,
                None => match &column.default {
                    Some(default) => self.eval_default(&column.data_type, default)?,
                    None => Cell::Null,
                },
            };
            if cell.is_null() && !column.nullable {
                return Err(rejected(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, table
                )));
            }
            row.insert(column.name.clone(), cell);
        }
        self.check_unique(table, def, Some(&row))?;
        Ok(row)
    }

    pub fn insert_row(&mut self, table: &QualifiedName, values: &Map<String, Value>) -> DriverResult<()> {
        let row = self.make_row(table, values)?;
        self.table_mut(table)?.rows.push(row);
        Ok(())
    }

    /// Overwrite columns of every row whose `key_column` equals `key`.
    pub fn update_rows(
        &mut self,
        table: &QualifiedName,
        key_column: &str,
        key: &Value,
        changes: &Map<String, Value>,
    ) -> DriverResult<usize> {
        let def = self
            .table(table)
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", table)))?;
        let mut coerced = Vec::new();
        for (name, value) in changes {
            let column = def.column(name).ok_or_else(|| {
                rejected(format!("column \"{}\" of relation \"{}\" does not exist", name, table))
            })?;
            let cell = self.coerce(&column.data_type, value)?;
            if cell.is_null() && !column.nullable {
                return Err(rejected(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    name
                )));
            }
            coerced.push((name.clone(), cell));
        }
        let matches: Vec<usize> = def
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(key_column).map(|c| self.to_json(c)) == Some(key.clone()))
            .map(|(i, _)| i)
            .collect();
        let rows = &mut self.table_mut(table)?.rows;
        for &i in &matches {
            for (name, cell) in &coerced {
                rows[i].insert(name.clone(), cell.clone());
            }
        }
        Ok(matches.len())
    }

    pub fn delete_rows(&mut self, table: &QualifiedName, key_column: &str, key: &Value) -> DriverResult<usize> {
        let snapshot = self.clone();
        let rows = &mut self.table_mut(table)?.rows;
        let before = rows.len();
        rows.retain(|row| row.get(key_column).map(|c| snapshot.to_json(c)) != Some(key.clone()));
        Ok(before - rows.len())
    }

    /// Enforce primary key and unique columns, optionally with one extra row.
    fn check_unique(&self, name: &QualifiedName, table: &Table, extra: Option<&Row>) -> DriverResult<()> {
        for column in table.columns.iter().filter(|c| c.primary_key || c.unique) {
            let mut seen = BTreeSet::new();
            for row in table.rows.iter().chain(extra) {
                if let Some(text) = row.get(&column.name).and_then(|c| self.to_text(c)) {
                    if !seen.insert(text.clone()) {
                        return Err(rejected(format!(
                            "duplicate key value violates unique constraint on {}.{}: {}",
                            name, column.name, text
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply one statement. The catalog is unchanged when this fails.
    pub fn apply(&mut self, op: &SchemaOp) -> DriverResult<()> {
        match op {
            SchemaOp::CreateSchema { name, if_not_exists } => {
                if self.schemas.contains(name) {
                    if *if_not_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("schema \"{}\" already exists", name)));
                }
                self.schemas.insert(name.clone());
            }
            SchemaOp::DropSchema { name, if_exists } => {
                if !self.schemas.contains(name) {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("schema \"{}\" does not exist", name)));
                }
                let objects = self.objects();
                let prefix = format!("{}.", name);
                let in_use = objects
                    .tables
                    .iter()
                    .chain(&objects.enums)
                    .chain(&objects.views)
                    .any(|n| n.starts_with(&prefix));
                if in_use {
                    return Err(rejected(format!(
                        "cannot drop schema {} because other objects depend on it",
                        name
                    )));
                }
                self.schemas.remove(name);
            }
            SchemaOp::CreateExtension { name, if_not_exists } => {
                if self.extensions.contains(name) {
                    if *if_not_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("extension \"{}\" already exists", name)));
                }
                self.extensions.insert(name.clone());
            }
            SchemaOp::DropExtension { name, if_exists } => {
                if !self.extensions.contains(name) {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("extension \"{}\" does not exist", name)));
                }
                let in_use = self.tables.values().flat_map(|t| &t.columns).any(|c| {
                    c.data_type.required_extension() == Some(name.as_str())
                });
                if in_use {
                    return Err(rejected(format!(
                        "cannot drop extension {} because other objects depend on it",
                        name
                    )));
                }
                self.extensions.remove(name);
            }
            SchemaOp::CreateTable(table) => self.create_table(table)?,
            SchemaOp::DropTable { table, if_exists } => {
                let key = table.resolved();
                if !self.tables.contains_key(&key) {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("table \"{}\" does not exist", table)));
                }
                if let Some(view) = self.views_reading(&key) {
                    return Err(rejected(format!(
                        "cannot drop table {} because materialized view {} depends on it",
                        table, view
                    )));
                }
                let referencing = self.tables.iter().find(|(name, t)| {
                    **name != key
                        && t.columns.iter().any(|c| {
                            c.references.as_ref().map(|r| r.table.resolved()) == Some(key.clone())
                        })
                });
                if let Some((name, _)) = referencing {
                    return Err(rejected(format!(
                        "cannot drop table {} because table {} references it",
                        table, name
                    )));
                }
                self.tables.remove(&key);
                self.indexes.retain(|_, index| index.table.resolved() != key);
            }
            SchemaOp::AddColumn { table, column } => {
                let def = self
                    .table(table)
                    .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", table)))?;
                if def.column(&column.name).is_some() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" already exists",
                        column.name, table
                    )));
                }
                self.check_column(column)?;
                let mut cells = Vec::with_capacity(def.rows.len());
                for _ in &def.rows {
                    let cell = match &column.default {
                        Some(default) => self.eval_default(&column.data_type, default)?,
                        None => Cell::Null,
                    };
                    if cell.is_null() && !column.nullable {
                        return Err(rejected(format!(
                            "column \"{}\" of relation \"{}\" contains null values",
                            column.name, table
                        )));
                    }
                    cells.push(cell);
                }
                let def = self.table_mut(table)?;
                def.columns.push(column.clone());
                for (row, cell) in def.rows.iter_mut().zip(cells) {
                    row.insert(column.name.clone(), cell);
                }
            }
            SchemaOp::DropColumn { table, column } => {
                self.require_column(table, column)?;
                self.reject_view_dependency(table, column)?;
                let def = self.table_mut(table)?;
                def.columns.retain(|c| &c.name != column);
                for row in &mut def.rows {
                    row.remove(column);
                }
                let key = table.resolved();
                self.indexes
                    .retain(|_, index| !(index.table.resolved() == key && index.columns.contains(column)));
            }
            SchemaOp::RenameColumn { table, from, to } => {
                self.require_column(table, from)?;
                if self.table(table).and_then(|t| t.column(to)).is_some() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" already exists",
                        to, table
                    )));
                }
                self.reject_view_dependency(table, from)?;
                let def = self.table_mut(table)?;
                for c in &mut def.columns {
                    if &c.name == from {
                        c.name = to.clone();
                    }
                }
                for row in &mut def.rows {
                    if let Some(cell) = row.remove(from) {
                        row.insert(to.clone(), cell);
                    }
                }
                let key = table.resolved();
                for index in self.indexes.values_mut().filter(|i| i.table.resolved() == key) {
                    for c in &mut index.columns {
                        if c == from {
                            *c = to.clone();
                        }
                    }
                }
            }
            SchemaOp::SetDefault { table, column, default } => {
                let data_type = self.require_column(table, column)?.data_type.clone();
                if let Some(default) = default {
                    self.eval_default(&data_type, default)?;
                }
                let def = self.table_mut(table)?;
                for c in &mut def.columns {
                    if &c.name == column {
                        c.default = default.clone();
                    }
                }
            }
            SchemaOp::Backfill { table, target, source, cast } => {
                self.check_type(cast)?;
                let target_type = self.require_column(table, target)?.data_type.clone();
                self.require_column(table, source)?;
                let def = self.table(table).ok_or_else(|| rejected("relation vanished"))?;
                let mut values = Vec::with_capacity(def.rows.len());
                for row in &def.rows {
                    let cell = row.get(source).cloned().unwrap_or(Cell::Null);
                    let cell = self.cast(&cell, cast)?;
                    values.push(self.cast(&cell, &target_type)?);
                }
                let def = self.table_mut(table)?;
                for (row, cell) in def.rows.iter_mut().zip(values) {
                    row.insert(target.clone(), cell);
                }
            }
            SchemaOp::CreateEnum { name, labels } => {
                self.require_schema(name)?;
                if self.enums.contains_key(&name.resolved()) {
                    return Err(rejected(format!("type \"{}\" already exists", name)));
                }
                let mut seen = BTreeSet::new();
                let mut members = Vec::with_capacity(labels.len());
                for label in labels {
                    if !seen.insert(label.as_str()) {
                        return Err(rejected(format!("enum label \"{}\" used more than once", label)));
                    }
                    members.push((self.next_oid, label.clone()));
                    self.next_oid += 1;
                }
                self.enums.insert(name.resolved(), EnumType { members });
            }
            SchemaOp::DropEnum { name, if_exists } => {
                let key = name.resolved();
                if !self.enums.contains_key(&key) {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("type \"{}\" does not exist", name)));
                }
                let used_by = self.tables.iter().find(|(_, t)| {
                    t.columns
                        .iter()
                        .any(|c| c.data_type.enum_type().map(QualifiedName::resolved) == Some(key.clone()))
                });
                if let Some((table, _)) = used_by {
                    return Err(rejected(format!(
                        "cannot drop type {} because column of table {} depends on it",
                        name, table
                    )));
                }
                self.enums.remove(&key);
            }
            SchemaOp::RenameEnumValue { type_name, from, to } => {
                let enum_type = self
                    .enums
                    .get_mut(&type_name.resolved())
                    .ok_or_else(|| rejected(format!("type \"{}\" does not exist", type_name)))?;
                if enum_type.oid_of(to).is_some() {
                    return Err(rejected(format!("enum label \"{}\" already exists", to)));
                }
                let member = enum_type
                    .members
                    .iter_mut()
                    .find(|(_, l)| l == from)
                    .ok_or_else(|| rejected(format!("\"{}\" is not an existing enum label", from)))?;
                member.1 = to.clone();
            }
            SchemaOp::AddEnumValue { type_name, label, position } => {
                let oid = self.next_oid;
                let enum_type = self
                    .enums
                    .get_mut(&type_name.resolved())
                    .ok_or_else(|| rejected(format!("type \"{}\" does not exist", type_name)))?;
                if enum_type.oid_of(label).is_some() {
                    return Err(rejected(format!("enum label \"{}\" already exists", label)));
                }
                let at = match position {
                    None => enum_type.members.len(),
                    Some(EnumPosition::Before(other)) | Some(EnumPosition::After(other)) => {
                        let i = enum_type
                            .members
                            .iter()
                            .position(|(_, l)| l == other)
                            .ok_or_else(|| rejected(format!("\"{}\" is not an existing enum label", other)))?;
                        if matches!(position, Some(EnumPosition::After(_))) { i + 1 } else { i }
                    }
                };
                enum_type.members.insert(at, (oid, label.clone()));
                self.next_oid += 1;
            }
            SchemaOp::CreateIndex(index) => self.create_index(index)?,
            SchemaOp::DropIndex { name, if_exists } => {
                if self.indexes.remove(&name.resolved()).is_none() && !*if_exists {
                    return Err(rejected(format!("index \"{}\" does not exist", name)));
                }
            }
            SchemaOp::CreateMaterializedView { name, query } => {
                self.require_schema(name)?;
                if self.relation_exists(name) {
                    return Err(rejected(format!("relation \"{}\" already exists", name)));
                }
                let rows = projection::evaluate(self, query)?;
                self.views.insert(
                    name.resolved(),
                    View {
                        query: query.clone(),
                        rows,
                    },
                );
            }
            SchemaOp::DropMaterializedView { name, if_exists } => {
                let key = name.resolved();
                if self.views.remove(&key).is_none() {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(rejected(format!("materialized view \"{}\" does not exist", name)));
                }
                self.indexes.retain(|_, index| index.table.resolved() != key);
            }
        }
        Ok(())
    }

    fn require_column(&self, table: &QualifiedName, column: &str) -> DriverResult<&ColumnDef> {
        self.table(table)
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", table)))?
            .column(column)
            .ok_or_else(|| {
                rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
            })
    }

    fn reject_view_dependency(&self, table: &QualifiedName, column: &str) -> DriverResult<()> {
        let key = (table.resolved(), column.to_string());
        if let Some((view, _)) = self.views.iter().find(|(_, v)| v.query.column_refs().contains(&key)) {
            return Err(rejected(format!(
                "cannot alter column {} of table {} because materialized view {} depends on it",
                column, table, view
            )));
        }
        Ok(())
    }

    fn create_table(&mut self, table: &TableDef) -> DriverResult<()> {
        self.require_schema(&table.name)?;
        if self.relation_exists(&table.name) {
            if table.if_not_exists && self.tables.contains_key(&table.name.resolved()) {
                return Ok(());
            }
            return Err(rejected(format!("relation \"{}\" already exists", table.name)));
        }
        let mut seen = BTreeSet::new();
        for column in &table.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(rejected(format!(
                    "column \"{}\" specified more than once",
                    column.name
                )));
            }
            self.check_column(column)?;
        }
        self.tables.insert(
            table.name.resolved(),
            Table {
                columns: table.columns.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn create_index(&mut self, index: &IndexDef) -> DriverResult<()> {
        let qualified = index.qualified_name().resolved();
        if self.relation_exists(&qualified) {
            return Err(rejected(format!("relation \"{}\" already exists", qualified)));
        }

        // (column values per row, column types where known)
        let (rows, types): (Vec<Vec<Option<String>>>, Vec<Option<DataType>>) =
            if let Some(table) = self.table(&index.table) {
                let mut types = Vec::new();
                for c in &index.columns {
                    let def = table.column(c).ok_or_else(|| {
                        rejected(format!("column \"{}\" does not exist", c))
                    })?;
                    types.push(Some(def.data_type.clone()));
                }
                let rows = table
                    .rows
                    .iter()
                    .map(|row| {
                        index
                            .columns
                            .iter()
                            .map(|c| row.get(c).and_then(|cell| self.to_text(cell)))
                            .collect()
                    })
                    .collect();
                (rows, types)
            } else if let Some(view) = self.view(&index.table) {
                let outputs = view.query.output_columns();
                let mut types = Vec::new();
                for c in &index.columns {
                    if !outputs.contains(c) {
                        return Err(rejected(format!("column \"{}\" does not exist", c)));
                    }
                    let root_type = view
                        .query
                        .root
                        .fields
                        .iter()
                        .find(|f| f.output_name() == c)
                        .and_then(|f| {
                            self.table(&view.query.root.table)
                                .and_then(|t| t.column(&f.column))
                                .map(|def| def.data_type.clone())
                        });
                    types.push(root_type);
                }
                let rows = view
                    .rows
                    .iter()
                    .map(|row| {
                        index
                            .columns
                            .iter()
                            .map(|c| match row.get(c) {
                                None | Some(Value::Null) => None,
                                Some(Value::String(s)) => Some(s.clone()),
                                Some(other) => Some(other.to_string()),
                            })
                            .collect()
                    })
                    .collect();
                (rows, types)
            } else {
                return Err(rejected(format!("relation \"{}\" does not exist", index.table)));
            };

        if index.method == IndexMethod::Gist {
            let spatial = types
                .iter()
                .all(|t| matches!(t, Some(DataType::Geometry { .. })));
            if !spatial {
                return Err(rejected(format!(
                    "data type of {:?} has no default operator class for access method \"gist\"",
                    index.columns
                )));
            }
        }

        if index.unique {
            let mut seen = BTreeSet::new();
            for key in rows {
                if key.iter().any(Option::is_none) {
                    continue;
                }
                if !seen.insert(key.clone()) {
                    return Err(rejected(format!(
                        "could not create unique index \"{}\": key {:?} is duplicated",
                        index.name, key
                    )));
                }
            }
        }

        self.indexes.insert(qualified, index.clone());
        Ok(())
    }
}

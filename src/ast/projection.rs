//! Projection queries: denormalized JSON documents over normalized tables.
//!
//! A projection has one root table and any number of nested collections.
//! Each collection is compiled into its own common table expression keyed by
//! the root's key, then left-joined back onto the root so a parent without
//! children still produces a row.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::{IndexDef, IndexMethod, QualifiedName};
use crate::error::{Error, Result};
use crate::ident::validate_identifier;

/// A projected column, optionally renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub column: String,
    pub alias: Option<String>,
}

impl Field {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: None,
        }
    }

    pub fn aliased(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: Some(alias.into()),
        }
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.column)?;
        if let Some(alias) = &self.alias {
            validate_identifier(alias)?;
        }
        Ok(())
    }
}

impl From<&str> for Field {
    fn from(column: &str) -> Self {
        Field::new(column)
    }
}

fn collect_fields<I, F>(fields: I) -> Vec<Field>
where
    I: IntoIterator<Item = F>,
    F: Into<Field>,
{
    fields.into_iter().map(Into::into).collect()
}

/// The parent entity: one output row per live root row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub table: QualifiedName,
    pub key: String,
    pub fields: Vec<Field>,
    pub soft_delete: Option<String>,
}

impl Root {
    pub fn new(table: impl Into<QualifiedName>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(collect_fields(fields));
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }
}

/// A JSON array of ids on the root, expanded one row per element and
/// resolved through a lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expand {
    pub name: String,
    pub array_column: String,
    pub lookup: QualifiedName,
    pub lookup_key: String,
    pub fields: Vec<Field>,
    pub soft_delete: Option<String>,
}

impl Expand {
    pub fn new(
        name: impl Into<String>,
        array_column: impl Into<String>,
        lookup: impl Into<QualifiedName>,
        lookup_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            array_column: array_column.into(),
            lookup: lookup.into(),
            lookup_key: lookup_key.into(),
            fields: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(collect_fields(fields));
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }
}

/// Rows of a child table whose foreign key points at the root key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Children {
    pub name: String,
    pub table: QualifiedName,
    pub foreign_key: String,
    pub fields: Vec<Field>,
    pub soft_delete: Option<String>,
    pub order_by: Option<String>,
}

impl Children {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<QualifiedName>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            foreign_key: foreign_key.into(),
            fields: Vec::new(),
            soft_delete: None,
            order_by: None,
        }
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(collect_fields(fields));
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }
}

/// One row referenced by a root column, nested as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub name: String,
    pub column: String,
    pub table: QualifiedName,
    pub key: String,
    pub fields: Vec<Field>,
    pub soft_delete: Option<String>,
}

impl Parent {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        table: impl Into<QualifiedName>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            table: table.into(),
            key: key.into(),
            fields: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(collect_fields(fields));
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }
}

/// A nested collection of a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Nested {
    Expand(Expand),
    Children(Children),
    Parent(Parent),
}

impl Nested {
    pub fn name(&self) -> &str {
        match self {
            Nested::Expand(e) => &e.name,
            Nested::Children(c) => &c.name,
            Nested::Parent(p) => &p.name,
        }
    }

    /// The table the collection reads from.
    pub fn relation(&self) -> &QualifiedName {
        match self {
            Nested::Expand(e) => &e.lookup,
            Nested::Children(c) => &c.table,
            Nested::Parent(p) => &p.table,
        }
    }

    pub fn fields(&self) -> &[Field] {
        match self {
            Nested::Expand(e) => &e.fields,
            Nested::Children(c) => &c.fields,
            Nested::Parent(p) => &p.fields,
        }
    }

    pub fn soft_delete(&self) -> Option<&str> {
        match self {
            Nested::Expand(e) => e.soft_delete.as_deref(),
            Nested::Children(c) => c.soft_delete.as_deref(),
            Nested::Parent(p) => p.soft_delete.as_deref(),
        }
    }

    /// Is this an array (as opposed to a single object)?
    pub fn is_collection(&self) -> bool {
        !matches!(self, Nested::Parent(_))
    }
}

/// The defining query of a materialized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionQuery {
    pub root: Root,
    pub nested: Vec<Nested>,
}

impl ProjectionQuery {
    pub fn new(root: Root) -> Self {
        Self {
            root,
            nested: Vec::new(),
        }
    }

    pub fn expand(mut self, expand: Expand) -> Self {
        self.nested.push(Nested::Expand(expand));
        self
    }

    pub fn children(mut self, children: Children) -> Self {
        self.nested.push(Nested::Children(children));
        self
    }

    pub fn parent(mut self, parent: Parent) -> Self {
        self.nested.push(Nested::Parent(parent));
        self
    }

    /// Column names of the resulting relation, in order.
    pub fn output_columns(&self) -> Vec<String> {
        self.root
            .fields
            .iter()
            .map(|f| f.output_name().to_string())
            .chain(self.nested.iter().map(|n| n.name().to_string()))
            .collect()
    }

    /// Every base table the query reads.
    pub fn relations(&self) -> Vec<QualifiedName> {
        let mut relations = vec![self.root.table.resolved()];
        for nested in &self.nested {
            let relation = nested.relation().resolved();
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }
        relations
    }

    /// Every `(table, column)` pair the query reads.
    pub fn column_refs(&self) -> BTreeSet<(QualifiedName, String)> {
        let mut refs = BTreeSet::new();
        let root = self.root.table.resolved();
        refs.insert((root.clone(), self.root.key.clone()));
        for f in &self.root.fields {
            refs.insert((root.clone(), f.column.clone()));
        }
        if let Some(col) = &self.root.soft_delete {
            refs.insert((root.clone(), col.clone()));
        }
        for nested in &self.nested {
            let table = nested.relation().resolved();
            for f in nested.fields() {
                refs.insert((table.clone(), f.column.clone()));
            }
            if let Some(col) = nested.soft_delete() {
                refs.insert((table.clone(), col.to_string()));
            }
            match nested {
                Nested::Expand(e) => {
                    refs.insert((root.clone(), e.array_column.clone()));
                    refs.insert((table, e.lookup_key.clone()));
                }
                Nested::Children(c) => {
                    refs.insert((table.clone(), c.foreign_key.clone()));
                    if let Some(order) = &c.order_by {
                        refs.insert((table, order.clone()));
                    }
                }
                Nested::Parent(p) => {
                    refs.insert((root.clone(), p.column.clone()));
                    refs.insert((table, p.key.clone()));
                }
            }
        }
        refs
    }

    pub fn validate(&self) -> Result<()> {
        self.root.table.validate()?;
        validate_identifier(&self.root.key)?;
        if self.root.fields.is_empty() {
            return Err(Error::InvalidIdentifier(format!(
                "{} (projection has no root fields)",
                self.root.table
            )));
        }
        for (_, column) in self.column_refs() {
            validate_identifier(&column)?;
        }
        for field in &self.root.fields {
            field.validate()?;
        }
        for nested in &self.nested {
            validate_identifier(nested.name())?;
            nested.relation().validate()?;
            for field in nested.fields() {
                field.validate()?;
            }
        }
        let mut seen = BTreeSet::new();
        for column in self.output_columns() {
            if !seen.insert(column.clone()) {
                return Err(Error::InvalidIdentifier(format!(
                    "{} (projected twice)",
                    column
                )));
            }
        }
        Ok(())
    }
}

/// A stored projection plus the indexes built on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedView {
    pub name: QualifiedName,
    pub query: ProjectionQuery,
    pub indexes: Vec<IndexDef>,
}

impl MaterializedView {
    pub fn new(name: impl Into<QualifiedName>, query: ProjectionQuery) -> Self {
        Self {
            name: name.into(),
            query,
            indexes: Vec::new(),
        }
    }

    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDef::new(name, self.name.clone(), columns));
        self
    }

    pub fn unique_index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .push(IndexDef::new(name, self.name.clone(), columns).unique());
        self
    }

    /// GiST index over a geometry column.
    pub fn spatial_index(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.indexes.push(
            IndexDef::new(name, self.name.clone(), [column.into()]).using(IndexMethod::Gist),
        );
        self
    }

    /// GIN index over a `jsonb` column copied from the root table.
    pub fn gin_index(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.indexes.push(
            IndexDef::new(name, self.name.clone(), [column.into()]).using(IndexMethod::Gin),
        );
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.name.validate()?;
        self.query.validate()?;
        let outputs = self.query.output_columns();
        for index in &self.indexes {
            index.validate()?;
            if let Some(missing) = index.columns.iter().find(|c| !outputs.contains(c)) {
                return Err(Error::InvalidIdentifier(format!(
                    "{} (index {} column not projected by {})",
                    missing, index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ProjectionQuery {
        ProjectionQuery::new(
            Root::new("public.property", "id")
                .fields(["id", "name"])
                .soft_delete("deleted_at"),
        )
        .expand(
            Expand::new("facilities", "facility_ids", "public.facility", "id").fields(["id", "name"]),
        )
        .children(
            Children::new("spaces", "public.space", "property_id")
                .fields(["id", "name"])
                .soft_delete("deleted_at"),
        )
    }

    #[test]
    fn test_output_columns() {
        assert_eq!(
            listing().output_columns(),
            vec!["id", "name", "facilities", "spaces"]
        );
    }

    #[test]
    fn test_relations_and_refs() {
        let query = listing();
        assert_eq!(query.relations().len(), 3);
        let refs = query.column_refs();
        assert!(refs.contains(&(QualifiedName::from("public.property"), "facility_ids".to_string())));
        assert!(refs.contains(&(QualifiedName::from("public.space"), "property_id".to_string())));
        assert!(refs.contains(&(QualifiedName::from("public.space"), "deleted_at".to_string())));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let query = ProjectionQuery::new(Root::new("public.property", "id").fields(["id", "name"]))
            .children(Children::new("name", "public.space", "property_id").fields(["id"]));
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_view_index_must_be_projected() {
        let view = MaterializedView::new("public_api.property_listing", listing())
            .unique_index("property_listing_id", ["id"]);
        assert!(view.validate().is_ok());

        let bad = view.spatial_index("property_listing_location", "location");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_gin_index() {
        let query = ProjectionQuery::new(Root::new("public.property", "id").fields(["id", "facility_ids"]));
        let view = MaterializedView::new("public_api.property_facets", query)
            .gin_index("property_facets_facility_ids", "facility_ids");
        assert!(view.validate().is_ok());
        assert_eq!(view.indexes[0].method, IndexMethod::Gin);
    }
}

//! Data-definition statements.

use crate::ast::{
    ColumnDef, DataType, DefaultValue, EnumPosition, GeometryKind, IndexDef, IndexMethod, OnDelete,
    SchemaOp, Step, TableDef, Transformation,
};
use crate::ident::{quote_identifier, quote_literal};
use crate::transpiler::ToSql;

impl ToSql for DataType {
    fn to_sql(&self) -> String {
        match self {
            DataType::Uuid => "UUID".to_string(),
            DataType::Text => "TEXT".to_string(),
            DataType::Varchar(len) => format!("VARCHAR({})", len),
            DataType::Integer => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Timestamptz => "TIMESTAMPTZ".to_string(),
            DataType::Numeric { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            DataType::Jsonb => "JSONB".to_string(),
            DataType::Geometry { kind, srid } => {
                let kind = match kind {
                    GeometryKind::Point => "Point",
                    GeometryKind::Polygon => "Polygon",
                    GeometryKind::MultiPolygon => "MultiPolygon",
                };
                format!("geometry({}, {})", kind, srid)
            }
            DataType::Enum(name) => name.quoted(),
        }
    }
}

impl ToSql for DefaultValue {
    fn to_sql(&self) -> String {
        match self {
            DefaultValue::Now => "now()".to_string(),
            DefaultValue::RandomUuid => "gen_random_uuid()".to_string(),
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            DefaultValue::Int(n) => n.to_string(),
            DefaultValue::Text(s) | DefaultValue::EnumLabel(s) => quote_literal(s),
            DefaultValue::EmptyJsonArray => "'[]'::jsonb".to_string(),
        }
    }
}

impl ToSql for ColumnDef {
    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.data_type.to_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique && !self.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }
        if let Some(references) = &self.references {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                references.table.quoted(),
                quote_identifier(&references.column)
            ));
            match references.on_delete {
                OnDelete::NoAction => {}
                OnDelete::Cascade => sql.push_str(" ON DELETE CASCADE"),
                OnDelete::SetNull => sql.push_str(" ON DELETE SET NULL"),
            }
        }
        sql
    }
}

impl ToSql for TableDef {
    fn to_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.to_sql()))
            .collect();
        format!(
            "CREATE TABLE {}{} (\n{}\n)",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.name.quoted(),
            columns.join(",\n")
        )
    }
}

impl ToSql for IndexDef {
    fn to_sql(&self) -> String {
        let method = match self.method {
            IndexMethod::BTree => "",
            IndexMethod::Gist => " USING gist",
            IndexMethod::Gin => " USING gin",
        };
        let columns: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {}{} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_identifier(&self.name),
            self.table.quoted(),
            method,
            columns.join(", ")
        )
    }
}

fn if_exists(flag: bool) -> &'static str {
    if flag { "IF EXISTS " } else { "" }
}

fn if_not_exists(flag: bool) -> &'static str {
    if flag { "IF NOT EXISTS " } else { "" }
}

impl ToSql for SchemaOp {
    fn to_sql(&self) -> String {
        match self {
            SchemaOp::CreateSchema { name, if_not_exists: flag } => {
                format!("CREATE SCHEMA {}{}", if_not_exists(*flag), quote_identifier(name))
            }
            SchemaOp::DropSchema { name, if_exists: flag } => {
                format!("DROP SCHEMA {}{}", if_exists(*flag), quote_identifier(name))
            }
            SchemaOp::CreateExtension { name, if_not_exists: flag } => {
                format!("CREATE EXTENSION {}{}", if_not_exists(*flag), quote_identifier(name))
            }
            SchemaOp::DropExtension { name, if_exists: flag } => {
                format!("DROP EXTENSION {}{}", if_exists(*flag), quote_identifier(name))
            }
            SchemaOp::CreateTable(table) => table.to_sql(),
            SchemaOp::DropTable { table, if_exists: flag } => {
                format!("DROP TABLE {}{}", if_exists(*flag), table.quoted())
            }
            SchemaOp::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", table.quoted(), column.to_sql())
            }
            SchemaOp::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table.quoted(),
                quote_identifier(column)
            ),
            SchemaOp::RenameColumn { table, from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table.quoted(),
                quote_identifier(from),
                quote_identifier(to)
            ),
            SchemaOp::SetDefault { table, column, default } => match default {
                Some(default) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table.quoted(),
                    quote_identifier(column),
                    default.to_sql()
                ),
                None => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    table.quoted(),
                    quote_identifier(column)
                ),
            },
            SchemaOp::Backfill { table, target, source, cast } => format!(
                "UPDATE {} SET {} = {}::{}",
                table.quoted(),
                quote_identifier(target),
                quote_identifier(source),
                cast.to_sql()
            ),
            SchemaOp::CreateEnum { name, labels } => {
                let labels: Vec<String> = labels.iter().map(|l| quote_literal(l)).collect();
                format!("CREATE TYPE {} AS ENUM ({})", name.quoted(), labels.join(", "))
            }
            SchemaOp::DropEnum { name, if_exists: flag } => {
                format!("DROP TYPE {}{}", if_exists(*flag), name.quoted())
            }
            SchemaOp::RenameEnumValue { type_name, from, to } => format!(
                "ALTER TYPE {} RENAME VALUE {} TO {}",
                type_name.quoted(),
                quote_literal(from),
                quote_literal(to)
            ),
            SchemaOp::AddEnumValue { type_name, label, position } => {
                let mut sql = format!(
                    "ALTER TYPE {} ADD VALUE {}",
                    type_name.quoted(),
                    quote_literal(label)
                );
                match position {
                    Some(EnumPosition::Before(other)) => {
                        sql.push_str(&format!(" BEFORE {}", quote_literal(other)))
                    }
                    Some(EnumPosition::After(other)) => {
                        sql.push_str(&format!(" AFTER {}", quote_literal(other)))
                    }
                    None => {}
                }
                sql
            }
            SchemaOp::CreateIndex(index) => index.to_sql(),
            SchemaOp::DropIndex { name, if_exists: flag } => {
                format!("DROP INDEX {}{}", if_exists(*flag), name.quoted())
            }
            SchemaOp::CreateMaterializedView { name, query } => format!(
                "CREATE MATERIALIZED VIEW {} AS\n{}\nWITH DATA",
                name.quoted(),
                query.to_sql()
            ),
            SchemaOp::DropMaterializedView { name, if_exists: flag } => {
                format!("DROP MATERIALIZED VIEW {}{}", if_exists(*flag), name.quoted())
            }
        }
    }
}

impl ToSql for Step {
    /// Guards run against the catalog, so they render as comments.
    fn to_sql(&self) -> String {
        match self {
            Step::Op(op) => op.to_sql(),
            Step::ExpectEnumOrder { type_name, labels } => {
                let labels: Vec<String> = labels.iter().map(|l| quote_literal(l)).collect();
                format!("-- expect {} order: {}", type_name.quoted(), labels.join(", "))
            }
        }
    }
}

impl Transformation {
    /// One statement per step.
    pub fn to_sql(&self) -> Vec<String> {
        self.steps().iter().map(ToSql::to_sql).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::QualifiedName;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_table() {
        let table = TableDef::new("public.space")
            .column(ColumnDef::id())
            .column(ColumnDef::new("name", DataType::Text).not_null())
            .column(
                ColumnDef::new("property_id", DataType::Uuid)
                    .not_null()
                    .references("public.property", "id")
                    .on_delete(OnDelete::Cascade),
            )
            .column(ColumnDef::deleted_at());

        assert_eq!(
            table.to_sql(),
            "CREATE TABLE \"public\".\"space\" (\n    \"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid(),\n    \"name\" TEXT NOT NULL,\n    \"property_id\" UUID NOT NULL REFERENCES \"public\".\"property\" (\"id\") ON DELETE CASCADE,\n    \"deleted_at\" TIMESTAMPTZ\n)"
        );
    }

    #[test]
    fn test_enum_statements() {
        let status = QualifiedName::from("public.application_status");
        assert_eq!(
            SchemaOp::create_enum(status.clone(), ["DRAFT", "SUBMITTED"]).to_sql(),
            "CREATE TYPE \"public\".\"application_status\" AS ENUM ('DRAFT', 'SUBMITTED')"
        );
        assert_eq!(
            SchemaOp::rename_enum_value(status, "DRAFT", "DRAFT__reorder_0").to_sql(),
            "ALTER TYPE \"public\".\"application_status\" RENAME VALUE 'DRAFT' TO 'DRAFT__reorder_0'"
        );
    }

    #[test]
    fn test_backfill_and_defaults() {
        let op = SchemaOp::Backfill {
            table: "public.application".into(),
            target: "status".into(),
            source: "status_reorder_shadow".into(),
            cast: DataType::Enum("public.application_status".into()),
        };
        assert_eq!(
            op.to_sql(),
            "UPDATE \"public\".\"application\" SET \"status\" = \"status_reorder_shadow\"::\"public\".\"application_status\""
        );

        let op = SchemaOp::SetDefault {
            table: "public.application".into(),
            column: "status".into(),
            default: None,
        };
        assert_eq!(
            op.to_sql(),
            "ALTER TABLE \"public\".\"application\" ALTER COLUMN \"status\" DROP DEFAULT"
        );
    }

    #[test]
    fn test_spatial_index() {
        let index = IndexDef::new("property_listing_location", "public_api.property_listing", ["location"])
            .using(IndexMethod::Gist);
        assert_eq!(
            index.to_sql(),
            "CREATE INDEX \"property_listing_location\" ON \"public_api\".\"property_listing\" USING gist (\"location\")"
        );
        assert_eq!(
            SchemaOp::drop_index(index.qualified_name()).to_sql(),
            "DROP INDEX IF EXISTS \"public_api\".\"property_listing_location\""
        );
    }

    #[test]
    fn test_geometry_and_json_defaults() {
        let col = ColumnDef::new(
            "location",
            DataType::Geometry { kind: GeometryKind::Point, srid: 4326 },
        );
        assert_eq!(col.to_sql(), "\"location\" geometry(Point, 4326)");

        let col = ColumnDef::new("facility_ids", DataType::Jsonb)
            .not_null()
            .default(DefaultValue::EmptyJsonArray);
        assert_eq!(col.to_sql(), "\"facility_ids\" JSONB NOT NULL DEFAULT '[]'::jsonb");
    }

    #[test]
    fn test_transformation_renders_guards_as_comments() {
        let t = Transformation::new()
            .step(Step::ExpectEnumOrder {
                type_name: "public.status".into(),
                labels: vec!["A".into(), "B".into()],
            })
            .op(SchemaOp::create_schema("public_api"));
        assert_eq!(
            t.to_sql(),
            vec![
                "-- expect \"public\".\"status\" order: 'A', 'B'".to_string(),
                "CREATE SCHEMA IF NOT EXISTS \"public_api\"".to_string(),
            ]
        );
    }
}

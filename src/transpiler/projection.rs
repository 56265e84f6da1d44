//! Projection queries: one CTE per nested collection, left-joined onto the root.

use crate::ast::{Children, Expand, Field, Nested, Parent, ProjectionQuery};
use crate::ident::{quote_identifier, quote_literal};
use crate::transpiler::ToSql;

const ROOT: &str = "r";
const PARENT_ID: &str = "parent_id";

fn col(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(alias), quote_identifier(column))
}

fn json_object(alias: &str, fields: &[Field]) -> String {
    let pairs: Vec<String> = fields
        .iter()
        .map(|f| format!("{}, {}", quote_literal(f.output_name()), col(alias, &f.column)))
        .collect();
    format!("json_build_object({})", pairs.join(", "))
}

fn live(alias: &str, soft_delete: Option<&str>) -> Option<String> {
    soft_delete.map(|c| format!("{} IS NULL", col(alias, c)))
}

/// CTE name for a nested collection.
pub fn cte_name(nested: &Nested) -> String {
    match nested {
        Nested::Parent(p) => format!("{}_obj", p.name),
        other => format!("{}_agg", other.name()),
    }
}

fn expand_cte(query: &ProjectionQuery, expand: &Expand) -> String {
    let mut sql = format!(
        "    SELECT {} AS {},\n           json_agg({} ORDER BY \"e\".\"position\") AS {}\n",
        col(ROOT, &query.root.key),
        quote_identifier(PARENT_ID),
        json_object("l", &expand.fields),
        quote_identifier(&expand.name)
    );
    sql.push_str(&format!(
        "    FROM {} AS \"r\"\n    CROSS JOIN LATERAL jsonb_array_elements_text({}) WITH ORDINALITY AS \"e\"(\"value\", \"position\")\n",
        query.root.table.resolved().quoted(),
        col(ROOT, &expand.array_column)
    ));
    sql.push_str(&format!(
        "    JOIN {} AS \"l\" ON {}::text = \"e\".\"value\"\n",
        expand.lookup.resolved().quoted(),
        col("l", &expand.lookup_key)
    ));
    if let Some(filter) = live("l", expand.soft_delete.as_deref()) {
        sql.push_str(&format!("    WHERE {}\n", filter));
    }
    sql.push_str(&format!("    GROUP BY {}", col(ROOT, &query.root.key)));
    sql
}

fn children_cte(children: &Children) -> String {
    let order = match &children.order_by {
        Some(column) => format!(" ORDER BY {}", col("c", column)),
        None => String::new(),
    };
    let mut sql = format!(
        "    SELECT {} AS {},\n           json_agg({}{}) AS {}\n",
        col("c", &children.foreign_key),
        quote_identifier(PARENT_ID),
        json_object("c", &children.fields),
        order,
        quote_identifier(&children.name)
    );
    sql.push_str(&format!("    FROM {} AS \"c\"\n", children.table.resolved().quoted()));
    if let Some(filter) = live("c", children.soft_delete.as_deref()) {
        sql.push_str(&format!("    WHERE {}\n", filter));
    }
    sql.push_str(&format!("    GROUP BY {}", col("c", &children.foreign_key)));
    sql
}

fn parent_cte(query: &ProjectionQuery, parent: &Parent) -> String {
    let mut sql = format!(
        "    SELECT {} AS {},\n           {} AS {}\n",
        col(ROOT, &query.root.key),
        quote_identifier(PARENT_ID),
        json_object("p", &parent.fields),
        quote_identifier(&parent.name)
    );
    sql.push_str(&format!(
        "    FROM {} AS \"r\"\n    JOIN {} AS \"p\" ON {} = {}",
        query.root.table.resolved().quoted(),
        parent.table.resolved().quoted(),
        col("p", &parent.key),
        col(ROOT, &parent.column)
    ));
    if let Some(filter) = live("p", parent.soft_delete.as_deref()) {
        sql.push_str(&format!("\n    WHERE {}", filter));
    }
    sql
}

impl ToSql for ProjectionQuery {
    fn to_sql(&self) -> String {
        let mut sql = String::new();

        if !self.nested.is_empty() {
            let ctes: Vec<String> = self
                .nested
                .iter()
                .map(|nested| {
                    let body = match nested {
                        Nested::Expand(e) => expand_cte(self, e),
                        Nested::Children(c) => children_cte(c),
                        Nested::Parent(p) => parent_cte(self, p),
                    };
                    format!("{} AS (\n{}\n)", quote_identifier(&cte_name(nested)), body)
                })
                .collect();
            sql.push_str("WITH ");
            sql.push_str(&ctes.join(",\n"));
            sql.push('\n');
        }

        let mut select: Vec<String> = self
            .root
            .fields
            .iter()
            .map(|f| match &f.alias {
                Some(alias) => format!("{} AS {}", col(ROOT, &f.column), quote_identifier(alias)),
                None => col(ROOT, &f.column),
            })
            .collect();
        for nested in &self.nested {
            let value = col(&cte_name(nested), nested.name());
            let expr = if nested.is_collection() {
                format!("COALESCE({}, '[]'::json)", value)
            } else {
                value
            };
            select.push(format!("{} AS {}", expr, quote_identifier(nested.name())));
        }

        sql.push_str(&format!(
            "SELECT {}\nFROM {} AS \"r\"",
            select.join(",\n       "),
            self.root.table.resolved().quoted()
        ));
        for nested in &self.nested {
            let cte = cte_name(nested);
            sql.push_str(&format!(
                "\nLEFT JOIN {} ON {} = {}",
                quote_identifier(&cte),
                col(&cte, PARENT_ID),
                col(ROOT, &self.root.key)
            ));
        }
        if let Some(filter) = live(ROOT, self.root.soft_delete.as_deref()) {
            sql.push_str(&format!("\nWHERE {}", filter));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Root;

    fn property_listing() -> ProjectionQuery {
        ProjectionQuery::new(
            Root::new("public.property", "id")
                .fields([Field::new("id"), Field::aliased("name", "title")])
                .soft_delete("deleted_at"),
        )
        .expand(
            Expand::new("facilities", "facility_ids", "public.facility", "id")
                .fields(["id", "name"])
                .soft_delete("deleted_at"),
        )
        .children(
            Children::new("spaces", "public.space", "property_id")
                .fields(["id", "name"])
                .soft_delete("deleted_at")
                .order_by("name"),
        )
        .parent(
            Parent::new("organisation", "organisation_id", "public.organisation", "id")
                .fields(["id", "name"]),
        )
    }

    #[test]
    fn test_lateral_expansion() {
        let sql = property_listing().to_sql();
        assert!(sql.starts_with("WITH \"facilities_agg\" AS ("));
        assert!(sql.contains(
            "CROSS JOIN LATERAL jsonb_array_elements_text(\"r\".\"facility_ids\") WITH ORDINALITY AS \"e\"(\"value\", \"position\")"
        ));
        assert!(sql.contains("JOIN \"public\".\"facility\" AS \"l\" ON \"l\".\"id\"::text = \"e\".\"value\""));
        assert!(sql.contains(
            "json_agg(json_build_object('id', \"l\".\"id\", 'name', \"l\".\"name\") ORDER BY \"e\".\"position\")"
        ));
    }

    #[test]
    fn test_children_and_parent() {
        let sql = property_listing().to_sql();
        assert!(sql.contains("json_agg(json_build_object('id', \"c\".\"id\", 'name', \"c\".\"name\") ORDER BY \"c\".\"name\") AS \"spaces\""));
        assert!(sql.contains("WHERE \"c\".\"deleted_at\" IS NULL\n    GROUP BY \"c\".\"property_id\""));
        assert!(sql.contains("JOIN \"public\".\"organisation\" AS \"p\" ON \"p\".\"id\" = \"r\".\"organisation_id\""));
    }

    #[test]
    fn test_final_select() {
        let sql = property_listing().to_sql();
        assert!(sql.contains("SELECT \"r\".\"id\",\n       \"r\".\"name\" AS \"title\",\n       COALESCE(\"facilities_agg\".\"facilities\", '[]'::json) AS \"facilities\""));
        assert!(sql.contains("\"organisation_obj\".\"organisation\" AS \"organisation\""));
        assert!(sql.contains("LEFT JOIN \"spaces_agg\" ON \"spaces_agg\".\"parent_id\" = \"r\".\"id\""));
        assert!(sql.ends_with("WHERE \"r\".\"deleted_at\" IS NULL"));
    }

    #[test]
    fn test_flat_projection() {
        let query = ProjectionQuery::new(Root::new("organisation", "id").fields(["id", "name"]));
        assert_eq!(
            query.to_sql(),
            "SELECT \"r\".\"id\",\n       \"r\".\"name\"\nFROM \"public\".\"organisation\" AS \"r\""
        );
    }
}

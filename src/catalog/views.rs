//! Projection views of the public API schema.

use crate::ast::{Children, Expand, Field, MaterializedView, Parent, ProjectionQuery, Root};

pub const PROPERTY_LISTING: &str = "public_api.property_listing";
pub const ORGANISATION_LISTING: &str = "public_api.organisation_listing";

fn property_root() -> Root {
    Root::new("public.property", "id")
        .fields(["id", "name", "location"])
        .soft_delete("deleted_at")
}

fn facilities() -> Expand {
    Expand::new("facilities", "facility_ids", "public.facility", "id")
        .fields(["id", "name"])
        .soft_delete("deleted_at")
}

fn tenancies(foreign_key: &str, counterpart: &str) -> Children {
    Children::new("tenancies", "public.tenancy", foreign_key)
        .fields([Field::new("id"), Field::new(counterpart), Field::new("starts_on"), Field::new("ends_on")])
        .soft_delete("deleted_at")
        .order_by("starts_on")
}

fn owner() -> Parent {
    Parent::new("organisation", "organisation_id", "public.organisation", "id")
        .fields(["id", "name"])
        .soft_delete("deleted_at")
}

fn with_indexes(view: MaterializedView) -> MaterializedView {
    view.unique_index("property_listing_id", ["id"])
        .spatial_index("property_listing_location", "location")
}

/// Properties with their facilities, spaces, tenancies and owner.
pub fn property_listing_v1() -> MaterializedView {
    let query = ProjectionQuery::new(property_root())
        .expand(facilities())
        .children(
            Children::new("spaces", "public.space", "property_id")
                .fields(["id", "name", "floor_area"])
                .soft_delete("deleted_at")
                .order_by("name"),
        )
        .children(tenancies("property_id", "organisation_id"))
        .parent(owner());
    with_indexes(MaterializedView::new(PROPERTY_LISTING, query))
}

/// As v1, with each space's `accessible` flag.
pub fn property_listing_v2() -> MaterializedView {
    let query = ProjectionQuery::new(property_root())
        .expand(facilities())
        .children(
            Children::new("spaces", "public.space", "property_id")
                .fields(["id", "name", "floor_area", "accessible"])
                .soft_delete("deleted_at")
                .order_by("name"),
        )
        .children(tenancies("property_id", "organisation_id"))
        .parent(owner());
    with_indexes(MaterializedView::new(PROPERTY_LISTING, query))
}

/// Organisations with their type and tenancies.
pub fn organisation_listing() -> MaterializedView {
    let query = ProjectionQuery::new(
        Root::new("public.organisation", "id")
            .fields(["id", "name"])
            .soft_delete("deleted_at"),
    )
    .parent(
        Parent::new("organisation_type", "organisation_type_id", "public.organisation_type", "id")
            .fields([Field::new("id"), Field::aliased("name", "label")])
            .soft_delete("deleted_at"),
    )
    .children(tenancies("organisation_id", "property_id"));
    MaterializedView::new(ORGANISATION_LISTING, query).unique_index("organisation_listing_id", ["id"])
}

/// Current definition of every view, as left by the newest migration.
pub fn current() -> Vec<MaterializedView> {
    vec![property_listing_v2(), organisation_listing()]
}

/// Look a current view up by `schema.name` or bare name.
pub fn find(name: &str) -> Option<MaterializedView> {
    current()
        .into_iter()
        .find(|v| v.name.to_string() == name || v.name.name == name)
}

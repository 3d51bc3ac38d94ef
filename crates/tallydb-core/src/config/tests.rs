use super::*;
use crate::error::ErrorOrigin;
use rust_decimal::Decimal;

const INVOICES: &str = r#"
[[entity]]
name = "Invoice"
primary_key = "id"
fields = { id = "uint", currency = "text", total = "decimal", lines = "uint", local = "decimal" }

[[entity.aggregates]]
field = "total"
function = "sum"
member = "LineItem"
via = "invoice_id"
of = "amount"
priority = 10
default = 0
filters = [
    { op = "eq", field = "status", value = "active" },
    { op = "or", criteria = [{ op = "between", field = "amount", low = 1, high = "99.5" }, { op = "in", field = "kind", values = ["refund", "credit"] }] },
]

[[entity.aggregates]]
field = "lines"
function = "count"
member = "LineItem"
via = "invoice_id"

[[entity.aggregates]]
field = "local"
function = "sum"
member = "LineItem"
via = "invoice_id"
of = "amount"
filters = [{ op = "eq", field = "currency", owner = "currency" }]

[[entity]]
name = "LineItem"
primary_key = "id"
fields = { id = "uint", invoice_id = "uint", amount = "decimal", status = "text", currency = "text", kind = "text" }
associations = [{ field = "invoice_id", target = "Invoice", inverse = "lines" }]

[[entity]]
name = "CreditLine"
primary_key = "id"
extends = "LineItem"
fields = { reason = "text" }
"#;

fn models(source: &str) -> Vec<EntityModel> {
    SchemaConfig::from_toml_str(source)
        .and_then(|config| config.to_models())
        .expect("schema converts")
}

#[test]
fn entities_fields_and_associations_are_loaded() {
    let models = models(INVOICES);

    assert_eq!(models.len(), 3);
    let line = &models[1];
    assert_eq!(line.tag, EntityTag::from("LineItem"));
    assert_eq!(line.associations[0].target, EntityTag::from("Invoice"));
    assert_eq!(line.associations[0].inverse.as_deref(), Some("lines"));
    assert_eq!(models[2].parent, Some(EntityTag::from("LineItem")));
}

#[test]
fn literals_follow_field_kinds() {
    let models = models(INVOICES);
    let total = &models[0].aggregates[0];

    assert_eq!(total.default, Value::Decimal(Decimal::ZERO));
    assert_eq!(total.priority, 10);
    assert_eq!(total.filters[0], Criteria::eq("status", "active"));
    assert_eq!(
        total.filters[1],
        Criteria::or(vec![
            Criteria::between(
                "amount",
                Operand::value(Decimal::ONE),
                Operand::value(Decimal::new(995, 1)),
            ),
            Criteria::in_("kind", vec!["refund", "credit"]),
        ])
    );
}

#[test]
fn count_defaults_to_zero_and_owner_operands_resolve() {
    let models = models(INVOICES);

    assert_eq!(models[0].aggregates[1].default, Value::Uint(0));
    assert_eq!(
        models[0].aggregates[2].filters[0],
        Criteria::eq_owner("currency", "currency")
    );
}

#[test]
fn schema_builds_a_registry() {
    let registry = SchemaConfig::from_toml_str(INVOICES)
        .unwrap()
        .build_registry()
        .unwrap();

    assert_eq!(registry.aggregates_for(&EntityTag::from("Invoice")).len(), 3);
    assert_eq!(
        registry
            .member_dependencies(&EntityTag::from("CreditLine"))
            .len(),
        3
    );
}

#[test]
fn exclusive_rules_default_to_boolean_flags() {
    let models = models(
        r#"
        [[entity]]
        name = "Address"
        primary_key = "id"
        fields = { id = "uint", user_id = "uint", active = "bool", is_default = "bool" }

        [[entity.exclusives]]
        field = "is_default"
        group_by = ["user_id"]
        filters = { active = true }
        ensure_holder = true
        "#,
    );
    let rule = &models[0].exclusives[0];

    assert_eq!(rule.exclusive, Value::Bool(true));
    assert_eq!(rule.fallback, Value::Bool(false));
    assert_eq!(rule.group_by, vec!["user_id".to_string()]);
    assert_eq!(rule.filters.get("active"), Some(&Value::Bool(true)));
    assert!(rule.cancel_on_set);
    assert!(rule.ensure_holder);
}

#[test]
fn mistyped_literal_is_rejected() {
    let err = SchemaConfig::from_toml_str(
        r#"
        [[entity]]
        name = "Ticket"
        primary_key = "id"
        fields = { id = "uint", seats = "uint" }

        [[entity.exclusives]]
        field = "seats"
        exclusive = -1
        fallback = 0
        "#,
    )
    .unwrap()
    .to_models()
    .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::InvalidLiteral { ref field, kind: FieldKind::Uint, .. } if field == "seats"
    ));
}

#[test]
fn incomplete_criteria_names_the_missing_key() {
    let err = SchemaConfig::from_toml_str(
        r#"
        [[entity]]
        name = "Invoice"
        primary_key = "id"
        fields = { id = "uint", total = "decimal" }

        [[entity.aggregates]]
        field = "total"
        function = "sum"
        member = "LineItem"
        via = "invoice_id"
        of = "amount"
        filters = [{ op = "like", field = "status" }]
        "#,
    )
    .unwrap()
    .to_models()
    .unwrap_err();

    assert_eq!(
        err,
        ConfigError::IncompleteCriteria {
            entity: EntityTag::from("Invoice"),
            rule: "total".to_string(),
            op: CriteriaOp::Like,
            key: "pattern",
        }
    );
}

#[test]
fn unknown_keys_and_functions_fail_to_parse() {
    let typo = SchemaConfig::from_toml_str(
        r#"
        [[entity]]
        name = "Invoice"
        primary_key = "id"
        feilds = { id = "uint" }
        "#,
    );
    let function = SchemaConfig::from_toml_str(
        r#"
        [[entity]]
        name = "Invoice"
        primary_key = "id"
        aggregates = [{ field = "x", function = "median", member = "M", via = "m" }]
        "#,
    );

    assert!(matches!(typo, Err(ConfigError::Parse { .. })));
    assert!(matches!(function, Err(ConfigError::Parse { .. })));
}

#[test]
fn registry_errors_surface_with_registry_origin() {
    let err = SchemaConfig::from_toml_str(
        r#"
        [[entity]]
        name = "Invoice"
        primary_key = "id"
        fields = { id = "uint" }
        extends = "Missing"
        "#,
    )
    .unwrap()
    .build_registry()
    .unwrap_err();

    assert_eq!(err.origin, ErrorOrigin::Registry);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = SchemaConfig::from_path("/nonexistent/tallydb/schema.toml").unwrap_err();

    assert!(matches!(err, ConfigError::Io { .. }));
}

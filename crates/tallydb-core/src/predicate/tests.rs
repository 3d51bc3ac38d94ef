use crate::{
    predicate::{Criteria, Operand, Predicate, like_matches},
    record::Record,
    value::{Value, ValueError},
};
use rust_decimal::Decimal;

fn line(amount: i64, status: &str) -> Record {
    Record::new("LineItem", 1u64)
        .with("amount", Decimal::from(amount))
        .with("status", status)
}

#[test]
fn conjoin_drops_true_and_unwraps_single_clause() {
    assert_eq!(Predicate::conjoin(vec![]), Predicate::True);
    assert_eq!(
        Predicate::conjoin(vec![Predicate::True, Predicate::eq("a", 1i64)]),
        Predicate::eq("a", 1i64)
    );
    assert_eq!(
        Predicate::eq("a", 1i64) & Predicate::eq("b", 2i64),
        Predicate::And(vec![Predicate::eq("a", 1i64), Predicate::eq("b", 2i64)])
    );
}

#[test]
fn compare_is_numeric_across_representations() {
    let record = line(10, "active");

    assert!(Predicate::eq("amount", 10i64).matches(&record));
    assert!(Predicate::eq("amount", 10u64).matches(&record));
    assert!(Predicate::gt("amount", 9.5f64).matches(&record));
    assert!(Predicate::lte("amount", Decimal::from(10)).matches(&record));
    assert!(!Predicate::lt("amount", 10i64).matches(&record));
}

#[test]
fn missing_fields_compare_as_null() {
    let record = line(10, "active");

    assert!(Predicate::eq("note", Value::Null).matches(&record));
    assert!(!Predicate::gt("note", 0i64).matches(&record));
    assert!(!Predicate::lt("note", 0i64).matches(&record));
    assert!(Predicate::ne("note", 0i64).matches(&record));
}

#[test]
fn membership_and_negation() {
    let record = line(10, "void");

    let statuses = vec![Value::from("active"), Value::from("void")];
    assert!(Predicate::in_("status", statuses.clone()).matches(&record));
    assert!(!Predicate::not_in("status", statuses).matches(&record));
    assert!(Predicate::not(Predicate::eq("status", "active")).matches(&record));
    assert!(
        (Predicate::eq("status", "active") | Predicate::eq("amount", 10i64)).matches(&record)
    );
}

#[test]
fn like_supports_wildcards_and_escapes() {
    assert!(like_matches("invoice-2024", "invoice-%"));
    assert!(like_matches("abc", "a_c"));
    assert!(like_matches("", "%"));
    assert!(!like_matches("abc", "a_"));
    assert!(like_matches("100%", "100\\%"));
    assert!(!like_matches("1000", "100\\%"));
    assert!(!like_matches("Invoice", "invoice%"));
}

#[test]
fn like_on_non_text_is_false() {
    let record = line(10, "active");

    assert!(!Predicate::like("amount", "1%").matches(&record));
    assert!(Predicate::like("status", "act%").matches(&record));
}

#[test]
fn criteria_resolve_owner_operands() {
    let owner = Record::new("Invoice", 3u64)
        .with("currency", "NZD")
        .with("floor", 5i64)
        .with("ceiling", 20i64);

    let criteria = Criteria::and(vec![
        Criteria::eq_owner("currency", "currency"),
        Criteria::between("amount", Operand::owner("floor"), Operand::owner("ceiling")),
    ]);
    let predicate = criteria.resolve(&owner).expect("resolves");

    let member = line(10, "active").with("currency", "NZD");
    assert!(predicate.matches(&member));
    assert!(!predicate.matches(&member.clone().with("currency", "AUD")));
    assert!(!predicate.matches(&member.with("amount", 21i64)));
}

#[test]
fn between_is_inclusive() {
    let owner = Record::new("Invoice", 3u64);
    let predicate = Criteria::between("amount", Operand::value(10i64), Operand::value(20i64))
        .resolve(&owner)
        .expect("resolves");

    assert!(predicate.matches(&line(10, "active")));
    assert!(predicate.matches(&line(20, "active")));
    assert!(!predicate.matches(&line(21, "active")));
}

#[test]
fn like_pattern_from_owner_must_be_text() {
    let owner = Record::new("Invoice", 3u64).with("prefix", 7i64);
    let criteria = Criteria::Like {
        field: "status".to_string(),
        pattern: Operand::owner("prefix"),
    };

    assert!(matches!(
        criteria.resolve(&owner),
        Err(ValueError::LikePatternNotText { .. })
    ));
}

#[test]
fn static_equality_is_recognised() {
    assert!(Criteria::eq("status", "active").as_static_eq().is_some());
    assert!(Criteria::eq_owner("currency", "currency").as_static_eq().is_none());
    assert!(Criteria::ne("status", "void").as_static_eq().is_none());
    assert!(
        Criteria::or(vec![Criteria::eq("status", "active")])
            .as_static_eq()
            .is_none()
    );
}

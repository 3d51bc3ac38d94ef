use crate::{
    model::{AggregateRule, EntityModel, ExclusiveRule, FieldKind},
    predicate::{Criteria, Operand},
    record::Record,
    registry::RuleRegistry,
};
use rust_decimal::Decimal;

///
/// Invoice fixture
///
/// `Invoice` owns derived totals over `LineItem` members. `CreditLine` is a
/// member subtype and `ProformaInvoice` an owner subtype, both inheriting.
///

pub(crate) const INVOICE: &str = "Invoice";
pub(crate) const PROFORMA: &str = "ProformaInvoice";
pub(crate) const LINE_ITEM: &str = "LineItem";
pub(crate) const CREDIT_LINE: &str = "CreditLine";

pub(crate) fn invoice_models() -> Vec<EntityModel> {
    vec![
        EntityModel::new(INVOICE, "id")
            .field("id", FieldKind::Uint)
            .field("currency", FieldKind::Text)
            .field("total", FieldKind::Decimal)
            .field("line_count", FieldKind::Uint)
            .field("largest", FieldKind::Decimal)
            .field("average", FieldKind::Decimal)
            .field("local_total", FieldKind::Decimal)
            .field("above_average", FieldKind::Uint)
            .aggregate(
                AggregateRule::sum("total", LINE_ITEM, "invoice_id", "amount")
                    .filter(Criteria::eq("status", "active"))
                    .default_value(Decimal::ZERO)
                    .priority(10),
            )
            .aggregate(AggregateRule::count("line_count", LINE_ITEM, "invoice_id"))
            .aggregate(
                AggregateRule::max("largest", LINE_ITEM, "invoice_id", "amount").priority(5),
            )
            .aggregate(
                AggregateRule::avg("average", LINE_ITEM, "invoice_id", "amount")
                    .filter(Criteria::eq("status", "active"))
                    .priority(5),
            )
            .aggregate(
                AggregateRule::sum("local_total", LINE_ITEM, "invoice_id", "amount")
                    .filter(Criteria::eq_owner("currency", "currency"))
                    .default_value(Decimal::ZERO),
            )
            .aggregate(
                AggregateRule::count("above_average", LINE_ITEM, "invoice_id")
                    .filter(Criteria::eq("status", "active"))
                    .filter(Criteria::between(
                        "amount",
                        Operand::owner("average"),
                        Operand::owner("largest"),
                    )),
            ),
        EntityModel::new(PROFORMA, "id")
            .extends(INVOICE)
            .field("expires", FieldKind::Text),
        EntityModel::new(LINE_ITEM, "id")
            .field("id", FieldKind::Uint)
            .belongs_to("invoice_id", FieldKind::Uint, INVOICE)
            .field("amount", FieldKind::Decimal)
            .field("status", FieldKind::Text)
            .field("currency", FieldKind::Text),
        EntityModel::new(CREDIT_LINE, "id")
            .extends(LINE_ITEM)
            .field("reason", FieldKind::Text),
    ]
}

pub(crate) fn invoice_registry() -> RuleRegistry {
    RuleRegistry::build(invoice_models()).expect("invoice fixture must resolve")
}

pub(crate) fn invoice(id: u64) -> Record {
    Record::new(INVOICE, id)
        .with("id", id)
        .with("currency", "EUR")
}

pub(crate) fn line_item(id: u64, invoice_id: u64, amount: i64, status: &str) -> Record {
    Record::new(LINE_ITEM, id)
        .with("id", id)
        .with("invoice_id", invoice_id)
        .with("amount", Decimal::from(amount))
        .with("status", status)
        .with("currency", "EUR")
}

///
/// Address fixture
///
/// `Address.is_default` is exclusive per `user_id` and always held.
///

pub(crate) const USER: &str = "User";
pub(crate) const ADDRESS: &str = "Address";

pub(crate) fn address_models() -> Vec<EntityModel> {
    vec![
        EntityModel::new(USER, "id")
            .field("id", FieldKind::Uint)
            .field("name", FieldKind::Text)
            .field("address_count", FieldKind::Uint)
            .aggregate(AggregateRule::count("address_count", ADDRESS, "user_id")),
        address_model(
            ExclusiveRule::flag("is_default")
                .group_by("user_id")
                .ensure_holder(),
        ),
    ]
}

pub(crate) fn address_model(rule: ExclusiveRule) -> EntityModel {
    EntityModel::new(ADDRESS, "id")
        .field("id", FieldKind::Uint)
        .belongs_to("user_id", FieldKind::Uint, USER)
        .field("country", FieldKind::Text)
        .field("active", FieldKind::Bool)
        .field("is_default", FieldKind::Bool)
        .exclusive(rule)
}

pub(crate) fn address_registry() -> RuleRegistry {
    RuleRegistry::build(address_models()).expect("address fixture must resolve")
}

pub(crate) fn user(id: u64) -> Record {
    Record::new(USER, id).with("id", id).with("name", "ada")
}

pub(crate) fn address(id: u64, user_id: u64, is_default: bool) -> Record {
    Record::new(ADDRESS, id)
        .with("id", id)
        .with("user_id", user_id)
        .with("country", "NZ")
        .with("active", true)
        .with("is_default", is_default)
}

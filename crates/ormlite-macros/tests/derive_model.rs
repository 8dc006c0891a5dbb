use ormlite_core::{Model, ModelingErrorKind, ReferentialAction};
use ormlite_macros::Model;

#[derive(Model, Debug, Default)]
#[ormlite(alias = "customers", unique_constraint("Email"))]
struct Customer {
    #[ormlite(auto_increment)]
    id: i64,
    #[ormlite(length = 120)]
    email: String,
    nickname: Option<String>,
    #[ormlite(reference)]
    orders: Vec<Order>,
}

#[derive(Model, Debug, Default)]
#[ormlite(schema = "sales", index("CustomerId", "Number"), post_create_table = "SELECT 1")]
struct Order {
    #[ormlite(auto_increment)]
    id: i64,
    #[ormlite(references = Customer, on_delete = "cascade", fk_name = "FK_order_owner")]
    customer_id: i64,
    #[ormlite(alias = "order_no", unique)]
    number: String,
    #[ormlite(compute = "Quantity * 2")]
    doubled: i32,
    row_version: u64,
    #[ormlite(reference)]
    customer: Option<Customer>,
    #[ormlite(ignore)]
    scratch: String,
}

#[test]
fn test_derived_customer_definition() {
    let def = Customer::definition().expect("definition");
    assert_eq!(def.name, "Customer");
    assert_eq!(def.model_name(), "customers");
    assert_eq!(def.primary_key().name, "Id");
    assert!(def.primary_key().auto_increment);
    assert_eq!(def.field("Email").and_then(|f| f.field_length), Some(120));
    assert!(def.field("Nickname").expect("nickname").nullable);
    assert_eq!(def.reference_fields.len(), 1);
    assert!(def.reference_fields[0].reference.as_ref().expect("target").many);
    assert_eq!(def.unique_constraints[0].field_names, vec!["Email"]);
}

#[test]
fn test_derived_order_definition() {
    let def = Order::definition().expect("definition");
    assert_eq!(def.schema.as_deref(), Some("sales"));
    assert_eq!(
        def.field_names().collect::<Vec<_>>(),
        vec!["Id", "CustomerId", "Number", "Doubled", "RowVersion"]
    );
    assert_eq!(def.ignored_fields.len(), 1);
    assert_eq!(def.ignored_fields[0].name, "Scratch");

    let fk = def
        .field("CustomerId")
        .and_then(|f| f.foreign_key.clone())
        .expect("foreign key");
    assert_eq!(fk.target, ormlite_core::ModelRef::of::<Customer>());
    assert_eq!(fk.on_delete, Some(ReferentialAction::Cascade));
    assert_eq!(fk.foreign_key_name.as_deref(), Some("FK_order_owner"));

    let number = def.field("Number").expect("number");
    assert_eq!(number.column_name(), "order_no");
    assert!(number.is_unique_index);
    assert!(def.field("Doubled").expect("doubled").is_computed());
    assert!(def.row_version().is_some());
    assert_eq!(def.composite_indexes.len(), 1);
    assert_eq!(def.post_create_table_sql.as_deref(), Some("SELECT 1"));
    assert!(!def.reference_fields[0].reference.as_ref().expect("target").many);
}

#[test]
fn test_derived_accessors_round_trip() {
    let def = Order::definition().expect("definition");
    let mut order = Order {
        number: "A-1".into(),
        ..Order::default()
    };
    let number = def.field("Number").expect("number");
    assert_eq!(
        number.get_value(&order).and_then(|v| v.downcast_ref::<String>()),
        Some(&"A-1".to_string())
    );
    assert!(number.set_value(&mut order, Some(Box::new("B-2".to_string()))));
    assert_eq!(order.number, "B-2");
    assert!(order.customer.is_none());
    assert!(order.scratch.is_empty());
}

#[test]
fn test_unknown_field_lookup() {
    let def = Order::definition().expect("definition");
    let err = def.require_field("Scratch").expect_err("ignored");
    assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::UnknownField));
}

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{ScriptedConnection, unwrap_outcome};
use ormlite::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Customer {
    id: i64,
}

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Order {
    id: i64,
    customer_id: i64,
}

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Person {
    id: i64,
    name: String,
}

fn capture(answers: CannedResults) -> Arc<CaptureSqlFilter> {
    Arc::new(CaptureSqlFilter::answering(answers))
}

#[test]
fn join_renders_two_column_groups_and_one_inner_join() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let filter = capture(CannedResults::new().with_rows(vec![Row::from_pairs(vec![
            ("Id", Value::BigInt(10)),
            ("CustomerId", Value::BigInt(3)),
            ("Id", Value::BigInt(3)),
        ])]));
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(filter.clone());

        let plan = JoinPlan::new::<Order>()
            .join::<Order, Customer>("CustomerId", "Id")
            .and_then(JoinPlan::select_all::<Order>)
            .and_then(|p| p.select(Expr::col::<Customer>("Id")))
            .expect("plan");
        let orders: Vec<Order> = unwrap_outcome(db.select_query(&cx, &conn, &plan).await);
        assert_eq!(
            orders,
            vec![Order {
                id: 10,
                customer_id: 3
            }]
        );

        let sql = filter.sql();
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "SELECT \"Order\".\"Id\", \"Order\".\"CustomerId\", \"Customer\".\"Id\" \nFROM \"Order\" \nINNER JOIN \"Customer\" ON \"Order\".\"CustomerId\" = \"Customer\".\"Id\""
        );
        assert_eq!(sql[0].matches("JOIN").count(), 1);
        assert!(conn.sql().is_empty());
    });
}

#[test]
fn schema_filter_is_honored_or_ignored_per_dialect() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let answers = CannedResults::new().with_rows(vec![Row::from_pairs(vec![(
            "table_name",
            Value::from("invoices"),
        )])]);
        let mut filters = HashMap::new();
        filters.insert("schema".to_string(), "public".to_string());

        let postgres = capture(answers.clone());
        let db = Db::with_dialect(PostgresDialect::new()).with_results_filter(postgres.clone());
        let names = unwrap_outcome(db.get_table_names(&cx, &conn, &filters).await);
        assert_eq!(names, vec!["invoices"]);
        let statement = &postgres.statements()[0];
        assert!(statement.sql.contains("AND table_schema = :schema"));
        assert_eq!(statement.param("schema"), Some(&Value::from("public")));

        let sqlite = capture(answers);
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(sqlite.clone());
        let names = unwrap_outcome(db.get_table_names(&cx, &conn, &filters).await);
        assert_eq!(names, vec!["invoices"]);
        assert!(sqlite.sql()[0].starts_with("SELECT name FROM sqlite_master"));
    });
}

#[test]
fn unmatched_columns_fall_back_to_guessing() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let rows = vec![
            Row::from_pairs(vec![
                ("person_id", Value::BigInt(1)),
                ("person_name", Value::from("Ada")),
            ]),
            Row::from_pairs(vec![
                ("person_id", Value::BigInt(2)),
                ("person_name", Value::from("Grace")),
            ]),
        ];
        let db = Db::with_dialect(SqliteDialect::new())
            .with_results_filter(Arc::new(CannedResults::new().with_rows(rows)));

        let people: Vec<Person> = unwrap_outcome(db.select_all(&cx, &conn).await);
        assert_eq!(
            people,
            vec![
                Person {
                    id: 1,
                    name: "Ada".into()
                },
                Person {
                    id: 2,
                    name: "Grace".into()
                },
            ]
        );
    });
}

#[test]
fn count_and_exists_read_the_scalar() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let filter = capture(CannedResults::new().with_scalar(Value::BigInt(3)));
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(filter.clone());

        let options = SelectOptions::filter("\"Name\" = @name").bind("name", "Ada");
        assert_eq!(unwrap_outcome(db.count::<Person, _>(&cx, &conn, &options).await), 3);
        assert!(unwrap_outcome(db.exists::<Person, _>(&cx, &conn, &options).await));
        assert_eq!(
            filter.sql()[0],
            "SELECT COUNT(*) FROM \"Person\" WHERE \"Name\" = @name"
        );
    });
}

#[test]
fn typed_predicates_follow_the_case_folding_setting() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let predicate = Expr::col::<Person>("Name").contains("ad");

        let folded = capture(CannedResults::new());
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(folded.clone());
        let _: Vec<Person> = unwrap_outcome(db.select_expr(&cx, &conn, &predicate).await);
        let statement = &folded.statements()[0];
        assert!(statement.sql.ends_with("WHERE upper(\"Name\") like @0"));
        assert_eq!(statement.params[0].value, Value::from("%AD%"));

        let plain = capture(CannedResults::new());
        let db = Db::with_dialect(SqliteDialect::new())
            .with_config(OrmConfig::new().strip_upper_in_like(true))
            .with_results_filter(plain.clone());
        let _: Vec<Person> = unwrap_outcome(db.select_expr(&cx, &conn, &predicate).await);
        let statement = &plain.statements()[0];
        assert!(statement.sql.ends_with("WHERE \"Name\" like @0"));
        assert_eq!(statement.params[0].value, Value::from("%ad%"));
    });
}

#[test]
fn single_adds_a_limit() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let filter = capture(CannedResults::new());
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(filter.clone());

        let found: Option<Person> =
            unwrap_outcome(db.single(&cx, &conn, &SelectOptions::default()).await);
        assert!(found.is_none());
        assert_eq!(
            filter.sql()[0],
            "SELECT \"Id\", \"Name\" FROM \"Person\" LIMIT 1"
        );
    });
}

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{Reply, ScriptedConnection, expect_err, unwrap_outcome};
use ormlite::prelude::*;
use ormlite::ModelingErrorKind;
use std::sync::Arc;

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Author {
    id: i64,
    name: String,
    #[ormlite(reference)]
    books: Vec<Book>,
}

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Book {
    id: i64,
    author_id: i64,
    title: String,
    #[ormlite(reference)]
    author: Option<Author>,
}

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Stray {
    id: i64,
    #[ormlite(reference)]
    books: Vec<Book>,
}

fn author_row(id: i64, name: &str) -> Row {
    Row::from_pairs(vec![("Id", Value::BigInt(id)), ("Name", Value::from(name))])
}

fn book_row(id: i64, author_id: i64, title: &str) -> Row {
    Row::from_pairs(vec![
        ("Id", Value::BigInt(id)),
        ("AuthorId", Value::BigInt(author_id)),
        ("Title", Value::from(title)),
    ])
}

fn count_row(count: i64) -> Reply {
    Reply::Rows(vec![Row::from_pairs(vec![("COUNT(*)", Value::BigInt(count))])])
}

#[test]
fn load_select_fills_child_lists_with_one_query() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let answers = CannedResults::new()
            .with_rows_for(
                "FROM \"Book\"",
                vec![
                    book_row(1, 1, "Notes on the Analytical Engine"),
                    book_row(2, 2, "Compiling Routines"),
                    book_row(3, 1, "Sketch of the Engine"),
                ],
            )
            .with_rows(vec![author_row(1, "Ada"), author_row(2, "Grace"), author_row(3, "Edsger")]);
        let filter = Arc::new(CaptureSqlFilter::answering(answers));
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(filter.clone());

        let authors: Vec<Author> =
            unwrap_outcome(db.load_select(&cx, &conn, &SelectOptions::default()).await);
        assert_eq!(authors.len(), 3);
        let titles: Vec<Vec<&str>> = authors
            .iter()
            .map(|a| a.books.iter().map(|b| b.title.as_str()).collect())
            .collect();
        assert_eq!(
            titles,
            vec![
                vec!["Notes on the Analytical Engine", "Sketch of the Engine"],
                vec!["Compiling Routines"],
                vec![],
            ]
        );

        let statements = filter.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].sql.ends_with("WHERE \"AuthorId\" IN (@0,@1,@2)"));
        assert_eq!(statements[1].params.len(), 3);
    });
}

#[test]
fn single_reference_follows_parent_foreign_key() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let answers = CannedResults::new().with_rows_for("FROM \"Author\"", vec![author_row(2, "Grace")]);
        let filter = Arc::new(CaptureSqlFilter::answering(answers));
        let db = Db::with_dialect(SqliteDialect::new()).with_results_filter(filter.clone());

        let mut books = vec![
            Book {
                id: 5,
                author_id: 2,
                title: "A".into(),
                author: None,
            },
            Book {
                id: 6,
                author_id: 2,
                title: "B".into(),
                author: None,
            },
        ];
        unwrap_outcome(db.load_references_all(&cx, &conn, &mut books).await);
        assert!(books.iter().all(|b| b.author.as_ref().map(|a| a.name.as_str()) == Some("Grace")));

        let statements = filter.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.ends_with("WHERE \"Id\" IN (@0)"));
    });
}

#[test]
fn reference_without_foreign_key_is_a_modeling_error() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let db = Db::with_dialect(SqliteDialect::new());
        let mut stray = Stray {
            id: 1,
            books: Vec::new(),
        };
        let err = expect_err(db.load_references(&cx, &conn, &mut stray).await);
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::MissingReference));
        assert!(conn.sql().is_empty());
    });
}

#[test]
fn create_table_if_not_exists_checks_first() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        conn.once("sqlite_master", count_row(0))
            .on("sqlite_master", count_row(1));
        let db = Db::with_dialect(SqliteDialect::new());

        assert!(unwrap_outcome(db.create_table_if_not_exists::<Author, _>(&cx, &conn).await));
        assert!(!unwrap_outcome(db.create_table_if_not_exists::<Author, _>(&cx, &conn).await));

        let statements = conn.statements();
        assert_eq!(statements[0].param("tableName"), Some(&Value::from("Author")));
        assert!(statements[1].sql.starts_with("CREATE TABLE \"Author\" \n(\n"));
        assert_eq!(statements.len(), 3);
    });
}

#[test]
fn drop_table_skips_missing_tables() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        conn.once("sqlite_master", count_row(0))
            .once("sqlite_master", count_row(1))
            .once("sqlite_master", count_row(1));
        let db = Db::with_dialect(SqliteDialect::new());

        unwrap_outcome(db.drop_table::<Book, _>(&cx, &conn).await);
        assert_eq!(conn.sql().len(), 1);

        unwrap_outcome(db.drop_and_create_table::<Book, _>(&cx, &conn).await);
        let sql = conn.sql();
        assert_eq!(sql[2], "DROP TABLE \"Book\";");
        assert!(sql[3].starts_with("CREATE TABLE \"Book\""));
        assert!(unwrap_outcome(db.table_exists::<Book, _>(&cx, &conn).await));
    });
}

#[test]
fn unsupported_alteration_reports_not_implemented() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let db = Db::with_dialect(SqliteDialect::new());
        let err = expect_err(db.alter_column::<Book, _>(&cx, &conn, "Title").await);
        assert!(matches!(err, Error::NotImplemented(_)));
        assert!(conn.sql().is_empty());

        let err = expect_err(db.add_column::<Book, _>(&cx, &conn, "Missing").await);
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::UnknownField));

        unwrap_outcome(db.create_index::<Book, _>(&cx, &conn, "Title", None, true).await);
        assert_eq!(conn.sql().len(), 1);
        assert!(conn.sql()[0].starts_with("CREATE UNIQUE INDEX"));
    });
}

//! The process-wide filter slot is global, so this binary holds one test.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{ScriptedConnection, unwrap_outcome};
use ormlite::prelude::*;
use std::sync::Arc;

#[derive(Model, Debug, Default, Clone, PartialEq)]
struct Setting {
    id: i64,
    key: String,
    value: Option<String>,
}

#[test]
fn installed_filter_answers_until_guard_drops() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = ScriptedConnection::new();
        let db = Db::with_dialect(SqliteDialect::new());
        let rows = vec![Row::from_pairs(vec![
            ("Id", Value::BigInt(1)),
            ("Key", Value::from("theme")),
            ("Value", Value::Null),
        ])];

        {
            let capture = Arc::new(CaptureSqlFilter::answering(CannedResults::new().with_rows(rows)));
            let _guard = install_results_filter(capture.clone());
            let settings: Vec<Setting> = unwrap_outcome(db.select_all(&cx, &conn).await);
            assert_eq!(
                settings,
                vec![Setting {
                    id: 1,
                    key: "theme".into(),
                    value: None,
                }]
            );
            assert_eq!(
                capture.sql(),
                vec!["SELECT \"Id\", \"Key\", \"Value\" FROM \"Setting\""]
            );
            assert!(conn.sql().is_empty());
        }

        let settings: Vec<Setting> = unwrap_outcome(db.select_all(&cx, &conn).await);
        assert!(settings.is_empty());
        assert_eq!(conn.sql().len(), 1);
    });
}

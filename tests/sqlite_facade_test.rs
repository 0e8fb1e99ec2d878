//! Facade operations against a real SQLite file.

use pg_sql_caller::config::DatabaseConfig;
use pg_sql_caller::db::{self, ModelDirectory};
use pg_sql_caller::error::CallerError;
use pg_sql_caller::facade::{ModelBinding, SqlFacade};
use pg_sql_caller::models::SqlValue;
use std::sync::Arc;
use tempfile::TempDir;

fn company(dir: &TempDir) -> SqlFacade {
    let path = dir.path().join("company.db");
    let config = DatabaseConfig::parse(&format!("Company=sqlite:{}", path.display())).unwrap();
    let model = db::connect(&config).unwrap();
    let facade = SqlFacade::builder("CompanySql")
        .model(ModelBinding::from(model))
        .build();

    facade
        .execute("CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();
    facade
        .execute(
            "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, department_id INTEGER, active BOOLEAN)",
            &[],
        )
        .unwrap();
    facade
        .execute("INSERT INTO departments VALUES (1, 'X'), (2, 'Y')", &[])
        .unwrap();
    facade
        .execute(
            "INSERT INTO employees VALUES (1, 'John', 1, 1), (2, 'Jane', 1, 0), (3, 'Jake', 2, 1)",
            &[],
        )
        .unwrap();
    facade
}

fn employee_count(facade: &SqlFacade) -> SqlValue {
    facade
        .select_value("SELECT count(*) FROM employees", &[])
        .unwrap()
        .unwrap()
}

#[test]
fn test_select_values_filters_by_bound_department() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    let names = facade
        .select_values(
            "SELECT e.name FROM employees e JOIN departments d ON d.id = e.department_id \
             WHERE d.name = ? ORDER BY e.id",
            &["X".into()],
        )
        .unwrap();
    assert_eq!(names, vec![SqlValue::from("John"), SqlValue::from("Jane")]);
    assert!(!names.contains(&SqlValue::from("Jake")));
}

#[test]
fn test_select_all_serialized_types_values() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    let rows = facade
        .select_all_serialized(
            "SELECT id, name, active FROM employees WHERE id IN (?) ORDER BY id",
            &[vec![1, 3].into()],
        )
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(1)));
    assert_eq!(rows[0].get("name"), Some(&SqlValue::from("John")));
    assert_eq!(rows[0].get("active"), Some(&SqlValue::Bool(true)));
    assert_eq!(rows[1].get("name"), Some(&SqlValue::from("Jake")));

    assert_eq!(
        facade
            .select_value_serialized("SELECT active FROM employees WHERE id = ?", &[2.into()])
            .unwrap(),
        SqlValue::Bool(false)
    );
    assert!(matches!(
        facade.select_value_serialized("SELECT id FROM employees WHERE id = ?", &[99.into()]),
        Err(CallerError::EmptyResult { .. })
    ));
}

#[test]
fn test_quoted_binds_are_stored_verbatim() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    facade
        .execute(
            "INSERT INTO departments (id, name) VALUES (?, ?)",
            &[3.into(), "O'Brien; DROP TABLE employees".into()],
        )
        .unwrap();
    assert_eq!(
        facade
            .select_value("SELECT name FROM departments WHERE id = ?", &[3.into()])
            .unwrap(),
        Some(SqlValue::from("O'Brien; DROP TABLE employees"))
    );
    assert_eq!(employee_count(&facade), SqlValue::Int(3));
}

#[derive(Debug)]
enum HireError {
    Db(CallerError),
    BudgetExceeded,
}

impl From<CallerError> for HireError {
    fn from(err: CallerError) -> Self {
        HireError::Db(err)
    }
}

#[test]
fn test_transaction_rolls_back_on_block_error() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    let result: Result<(), HireError> = facade.transaction(|| {
        facade.execute(
            "INSERT INTO employees VALUES (4, 'Jill', 2, 1)",
            &[],
        )?;
        assert!(facade.transaction_open()?);
        Err(HireError::BudgetExceeded)
    });

    assert!(matches!(result, Err(HireError::BudgetExceeded)));
    assert!(!facade.transaction_open().unwrap());
    assert_eq!(employee_count(&facade), SqlValue::Int(3));
}

#[test]
fn test_transaction_rolls_back_on_statement_error() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    let result: Result<(), HireError> = facade.transaction(|| {
        facade.execute("INSERT INTO employees VALUES (4, 'Jill', 2, 1)", &[])?;
        facade.execute("INSERT INTO nowhere VALUES (1)", &[])?;
        Ok(())
    });

    assert!(matches!(result, Err(HireError::Db(CallerError::Driver(_)))));
    assert_eq!(employee_count(&facade), SqlValue::Int(3));
}

#[test]
fn test_transaction_commits_and_returns_block_value() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    let hired = facade
        .transaction(|| {
            facade.execute("INSERT INTO employees VALUES (4, 'Jill', 2, 1)", &[])?;
            facade.select_value("SELECT name FROM employees WHERE id = 4", &[])
        })
        .unwrap();

    assert_eq!(hired, Some(SqlValue::from("Jill")));
    assert_eq!(employee_count(&facade), SqlValue::Int(4));
}

#[test]
fn test_nested_transaction_failure_keeps_outer_work() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    facade
        .transaction(|| {
            facade.execute("INSERT INTO employees VALUES (4, 'Jill', 2, 1)", &[])?;
            let inner: Result<(), HireError> = facade.transaction(|| {
                facade.execute("INSERT INTO employees VALUES (5, 'Joan', 2, 1)", &[])?;
                Err(HireError::BudgetExceeded)
            });
            assert!(inner.is_err());
            assert!(facade.transaction_open()?);
            Ok::<_, CallerError>(())
        })
        .unwrap();

    assert_eq!(
        facade
            .select_values("SELECT name FROM employees WHERE id > ? ORDER BY id", &[3.into()])
            .unwrap(),
        vec![SqlValue::from("Jill")]
    );
}

#[test]
fn test_transactions_on_other_threads_do_not_leak() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    facade
        .transaction(|| {
            let seen_elsewhere = std::thread::scope(|scope| {
                scope.spawn(|| facade.transaction_open()).join().unwrap()
            })?;
            assert!(!seen_elsewhere);
            assert!(facade.transaction_open()?);
            Ok::<_, CallerError>(())
        })
        .unwrap();
}

#[test]
fn test_deferred_model_resolves_through_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deferred.db");
    let config = DatabaseConfig::parse(&format!("Deferred=sqlite:{}", path.display())).unwrap();

    let directory = Arc::new(ModelDirectory::new());
    let facade = SqlFacade::builder("DeferredSql")
        .model("Deferred")
        .directory(Arc::clone(&directory))
        .build();
    assert!(matches!(
        facade.select_value("SELECT 1", &[]),
        Err(CallerError::InvalidInput { .. })
    ));

    directory.register(db::connect(&config).unwrap()).unwrap();
    assert_eq!(
        facade.select_value("SELECT 1", &[]).unwrap(),
        Some(SqlValue::Int(1))
    );
    assert!(facade.is_resolved());
    assert_eq!(facade.model().unwrap().name(), "Deferred");
}

#[test]
fn test_typecast_array_needs_no_connection_round_trip() {
    let dir = TempDir::new().unwrap();
    let facade = company(&dir);

    assert_eq!(
        facade
            .typecast_array(&[1.into(), 2.into(), 3.into()], "integer")
            .unwrap(),
        "{1,2,3}"
    );
    assert_eq!(
        facade
            .typecast_array(&["a b".into(), SqlValue::Null], "text")
            .unwrap(),
        r#"{"a b",NULL}"#
    );
}

use pglink::{Config, Connection, ParamStyle, PortalState, Result, SqlExt};

pub fn main() -> Result<()> {
    let conn = Connection::connect(&Config::from_env().row_cache_size(3))?;

    // Execute

    conn.execute("CREATE TEMP TABLE pglink(id serial, name text)", &[])?;

    let rows = conn.execute("INSERT INTO pglink(name) VALUES($1)", &["Deez".into()])?;
    assert_eq!(rows, Some(1));

    let stmt = conn.prepare("INSERT INTO pglink(name) VALUES($1)", &["".into()])?;
    let rows = stmt.execute_many(&[vec!["Foo".into()], vec!["Bar".into()]])?;
    assert_eq!(rows, Some(2));

    // Queries

    let mut rows = conn.query("SELECT id, name FROM pglink ORDER BY id", &[])?;
    let (_id, name) = rows.next_row()?.unwrap().decode::<(i32, String)>()?;
    assert_eq!(name, "Deez");
    assert_eq!(rows.by_ref().count(), 2);
    assert_eq!(rows.rows_affected(), Some(3));

    let rows = conn.query("SELECT name FROM pglink LIMIT 0", &[])?;
    assert_eq!(rows.count(), 0);

    // Portal suspension inside a transaction

    conn.begin()?;
    let mut rows = conn.query("SELECT g FROM generate_series(1, 10) g", &[])?;
    assert_eq!(rows.state(), PortalState::Suspended);
    let mut sum = 0;
    while let Some(row) = rows.next_row()? {
        sum += row.try_get::<_, i32>(0)?;
    }
    assert_eq!(sum, 55);
    drop(rows);
    conn.commit()?;
    assert!(!conn.in_transaction());

    conn.begin()?;
    conn.execute("INSERT INTO pglink(name) VALUES('Baz')", &[])?;
    conn.rollback()?;

    // Placeholder styles

    let conn = Connection::connect(&Config::from_env().param_style(ParamStyle::Qmark))?;
    let mut rows = conn.query("SELECT ?::text || '?'".once(), &["why".into()])?;
    assert_eq!(rows.next_row()?.unwrap().try_get::<_, String>(0)?, "why?");

    // Error case

    conn.execute("SELECT foo", &[]).unwrap_err();
    conn.execute("", &[])?;
    conn.execute("SELECT 1", &[])?;

    Ok(())
}

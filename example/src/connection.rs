use std::{env::var, sync::Arc, thread};
use pglink::{Config, Connection, Result};

pub fn main() -> Result<()> {
    let conn = Connection::connect(&Config::parse(&var("DATABASE_URL").unwrap())?)?;
    conn.execute("SELECT 1", &[])?;
    conn.close()?;
    conn.close().unwrap_err();
    conn.execute("SELECT 1", &[]).unwrap_err();

    let conn = Connection::connect_env()?;
    tracing::info!(
        server_version = conn.parameter("server_version"),
        backend = ?conn.backend_key(),
        "connected"
    );

    // one connection shared between threads, commands are serialized
    let conn = Arc::new(conn);
    let handles = (0..8i32)
        .map(|i| {
            let conn = conn.clone();
            thread::spawn(move || conn.execute("SELECT $1::int", &[i.into()]))
        })
        .collect::<Vec<_>>();

    for h in handles {
        h.join().unwrap()?;
    }

    Ok(())
}

use pglink::Result;
use pglink::Connection;

pub fn main() -> Result<()> {
    let conn = Connection::connect_env()?;
    conn.on_notice(|notice| tracing::info!("{notice}"));

    conn.execute("CREATE TEMP TABLE copied(id int, name text)", &[])?;

    let data = b"1\tone\n2\ttwo\n3\t\\N\n";
    let rows = conn.copy_in("COPY copied FROM STDIN", &mut &data[..])?;
    assert_eq!(rows, Some(3));

    let mut out = Vec::new();
    let rows = conn.copy_out("COPY copied TO STDOUT", &mut out)?;
    assert_eq!(rows, Some(3));
    assert_eq!(out, data);

    conn.execute("LISTEN pglink", &[])?;
    conn.execute("NOTIFY pglink, 'hello'", &[])?;
    let notifications = conn.notifications();
    assert_eq!(notifications[0].payload, "hello");

    Ok(())
}

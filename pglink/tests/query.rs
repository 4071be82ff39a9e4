use pglink::{Config, Connection, ErrorKind, ParamStyle, PortalState, SqlExt, TransactionStatus, Value};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

mod common;

use common::{INT4, INT8, TEXT, TIMESTAMP, max_row, serve, serve_with};

#[test]
fn rows_and_parameters() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();

        let parse = peer.prepare(&[INT8], &[("n", INT4), ("s", TEXT)]);
        let strings = parse.strings();
        assert_eq!(strings[1], "SELECT n, s FROM t WHERE id = $1");

        let (bind, execute) = peer.bind();
        // one binary int8 parameter
        assert!(bind.body.windows(12).any(|e| e == [0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 7]));
        // result formats: binary int4, text
        assert!(bind.body.ends_with(&[0, 2, 0, 1, 0, 0]));
        assert_eq!(max_row(&execute), 0);

        peer.data_row(&[Some(&1i32.to_be_bytes()), Some(b"one")]);
        peer.data_row(&[Some(&2i32.to_be_bytes()), None]);
        peer.command_complete("SELECT 2");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let mut rows = conn.query("SELECT n, s FROM t WHERE id = $1", &[7i64.into()]).unwrap();
    assert_eq!(rows.columns().len(), 2);
    assert_eq!(rows.state(), PortalState::Exhausted);

    let row = rows.next_row().unwrap().unwrap();
    assert_eq!(row.try_get::<_, i32>("n").unwrap(), 1);
    assert_eq!(row.try_get::<_, String>("s").unwrap(), "one");

    let row = rows.next_row().unwrap().unwrap();
    assert_eq!(row.get(1), Some(&Value::Null));
    assert!(rows.next_row().unwrap().is_none());
    assert_eq!(rows.rows_affected(), Some(2));

    drop(rows);
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn suspended_portal_inside_transaction() {
    let config = Config::new().user("alice").row_cache_size(2);
    let (config, handle) = serve_with(config, |mut peer| {
        peer.handshake();

        peer.prepare(&[], &[]);
        peer.bind();
        peer.command_complete("BEGIN");
        peer.status = b'T';
        peer.ready();

        peer.prepare(&[], &[("g", INT4)]);
        let (_, execute) = peer.bind();
        assert_eq!(max_row(&execute), 2);

        let mut next = 1i32;
        for batch in [2, 2] {
            for _ in 0..batch {
                peer.data_row(&[Some(&next.to_be_bytes())]);
                next += 1;
            }
            peer.send(b's', &[]);
            peer.ready();

            let resumed = peer.cycle();
            assert_eq!(resumed.len(), 1);
            assert_eq!(resumed[0].tag, b'E');
            assert_eq!(max_row(&resumed[0]), 2);
        }
        peer.data_row(&[Some(&next.to_be_bytes())]);
        peer.command_complete("SELECT 1");
        peer.ready();

        peer.prepare(&[], &[]);
        peer.bind();
        peer.command_complete("COMMIT");
        peer.status = b'I';
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    conn.begin().unwrap();
    assert!(conn.in_transaction());

    let mut rows = conn.query("SELECT g FROM generate_series(1, 5) g", &[]).unwrap();
    assert_eq!(rows.state(), PortalState::Suspended);

    let mut seen = Vec::new();
    for row in &mut rows {
        seen.push(row.unwrap().try_get::<_, i32>(0).unwrap());
    }
    assert_eq!(seen, [1, 2, 3, 4, 5]);
    assert_eq!(rows.state(), PortalState::Exhausted);
    assert_eq!(rows.rows_affected(), Some(5));
    drop(rows);

    conn.commit().unwrap();
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn error_then_next_command() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();

        peer.cycle();
        peer.error("42601", "syntax error at or near \"SELEC\"");
        peer.ready();

        peer.command("SELECT 1");
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let err = conn.execute("SELEC 1", &[]).unwrap_err();
    let db = err.as_database().unwrap();
    assert_eq!(db.code(), "42601");
    assert!(db.message().contains("SELEC"));

    assert_eq!(conn.execute("SELECT 1", &[]).unwrap(), Some(1));
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn statement_cache() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();

        peer.prepare(&[], &[]);
        peer.bind();
        peer.command_complete("UPDATE 3");
        peer.ready();

        // cached, only the portal of the first execution is closed
        peer.bind();
        peer.command_complete("UPDATE 4");
        peer.ready();

        // non persistent statement is prepared again
        peer.prepare(&[], &[]);
        peer.bind();
        peer.command_complete("UPDATE 5");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    assert_eq!(conn.execute("UPDATE t SET a = 1", &[]).unwrap(), Some(3));
    assert_eq!(conn.execute("UPDATE t SET a = 1", &[]).unwrap(), Some(4));
    assert_eq!(conn.execute("UPDATE t SET a = 1".once(), &[]).unwrap(), Some(5));
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn execute_many_sums_counts() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        peer.prepare(&[INT4], &[]);
        for tag in ["INSERT 0 1", "INSERT 0 2"] {
            peer.bind();
            peer.command_complete(tag);
            peer.ready();
        }
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let stmt = conn.prepare("INSERT INTO t SELECT generate_series(1, $1)", &[Value::Int4(0)]).unwrap();
    assert_eq!(stmt.params(), [INT4]);
    let total = stmt.execute_many(&[vec![1.into()], vec![2.into()]]).unwrap();
    assert_eq!(total, Some(3));
    drop(stmt);
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn closed_statement() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        peer.prepare(&[], &[]);

        let close = peer.recv();
        assert_eq!(close.tag, b'C');
        assert_eq!(close.body[0], b'S');
        peer.expect(b'S');
        peer.send(b'3', &[]);
        peer.ready();

        // prepared again after close
        peer.prepare(&[], &[]);
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let first = conn.prepare("SELECT", &[]).unwrap();
    let second = conn.prepare("SELECT", &[]).unwrap();
    first.close().unwrap();

    let err = second.execute(&[]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Interface(pglink::InterfaceError::StatementClosed)));
    drop(second);

    conn.prepare("SELECT", &[]).unwrap();
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn qmark_placeholders() {
    let config = Config::new().user("alice").param_style(ParamStyle::Qmark);
    let (config, handle) = serve_with(config, |mut peer| {
        peer.handshake();
        let parse = peer.prepare(&[], &[]);
        assert_eq!(parse.strings()[1], "SELECT $1, '?', $2");
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    conn.prepare("SELECT ?, '?', ?", &[Value::Null, Value::Null]).unwrap();
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn notifications_and_notices() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        peer.prepare(&[], &[]);
        peer.bind();
        peer.notice("relation \"t\" already exists, skipping");
        peer.send(b'A', b"\0\0\0\x09jobs\0ready\0");
        peer.command_complete("LISTEN");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let notices = Arc::new(AtomicUsize::new(0));
    let counter = notices.clone();
    conn.on_notice(move |notice| {
        assert!(notice.message().contains("skipping"));
        counter.fetch_add(1, Ordering::Relaxed);
    });

    assert_eq!(conn.execute("LISTEN jobs", &[]).unwrap(), None);
    assert_eq!(notices.load(Ordering::Relaxed), 1);

    let notifications = conn.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].process_id, 9);
    assert_eq!(notifications[0].channel, "jobs");
    assert_eq!(notifications[0].payload, "ready");
    assert!(conn.notifications().is_empty());

    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn float_datetimes_from_parameter_status() {
    let (config, handle) = serve(|mut peer| {
        peer.read_startup();
        peer.auth(0, &[]);
        peer.parameter_status("integer_datetimes", "off");
        peer.ready();

        peer.prepare(&[], &[("at", TIMESTAMP)]);
        peer.bind();
        peer.data_row(&[Some(&86_400.5f64.to_be_bytes())]);
        peer.command_complete("SELECT 1");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let row = conn.query("SELECT at FROM t", &[]).unwrap().next_row().unwrap().unwrap();
    let at = row.try_get::<_, time::PrimitiveDateTime>(0).unwrap();
    assert_eq!(at, time::macros::datetime!(2000-01-02 00:00:00.5));
    conn.close().unwrap();
    handle.join().unwrap();
}

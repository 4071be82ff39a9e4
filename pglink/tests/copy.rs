use pglink::{Connection, ErrorKind, InterfaceError};

mod common;

use common::{Peer, serve};

fn copy_in_response(peer: &mut Peer) {
    peer.prepare(&[], &[]);
    peer.bind();
    // text format, no column formats
    peer.send(b'G', &[0, 0, 0]);
}

#[test]
fn copy_in_exact_bytes() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let expected = data.clone();

    let (config, handle) = serve(move |mut peer| {
        peer.handshake();
        copy_in_response(&mut peer);

        let mut received = Vec::new();
        let mut chunks = 0;
        loop {
            let message = peer.recv();
            match message.tag {
                b'd' => {
                    assert!(message.body.len() <= 8 * 1024);
                    chunks += 1;
                    received.extend_from_slice(&message.body);
                }
                b'c' => break,
                tag => panic!("unexpected {}", tag as char),
            }
        }
        peer.expect(b'S');
        assert_eq!(received, expected);
        assert!(chunks >= 3);

        peer.command_complete("COPY 100");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let rows = conn.copy_in("COPY t FROM STDIN", &mut &data[..]).unwrap();
    assert_eq!(rows, Some(100));
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn copy_out_exact_bytes() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        peer.prepare(&[], &[]);
        peer.bind();
        peer.send(b'H', &[0, 0, 2, 0, 0, 0, 0]);
        peer.send(b'd', b"1\tone\n");
        peer.send(b'd', b"2\t\\N\n");
        peer.send(b'c', &[]);
        peer.command_complete("COPY 2");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let mut sink = Vec::new();
    let rows = conn.copy_out("COPY t TO STDOUT", &mut sink).unwrap();
    assert_eq!(rows, Some(2));
    assert_eq!(sink, b"1\tone\n2\t\\N\n");
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn copy_in_without_stream() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        copy_in_response(&mut peer);

        let fail = peer.expect(b'f');
        assert!(fail.strings()[0].contains("no copy-in stream"));
        peer.expect(b'S');
        peer.error("57014", "COPY from stdin failed: no copy-in stream given");
        peer.ready();

        // still serving
        peer.command("SELECT 1");
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let stmt = conn.prepare("COPY t FROM STDIN", &[]).unwrap();
    let err = stmt.execute(&[]).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Interface(InterfaceError::MissingCopyStream { direction: "in" })
    ));
    drop(stmt);

    assert_eq!(conn.execute("SELECT 1", &[]).unwrap(), Some(1));
    conn.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn copy_out_without_stream() {
    let (config, handle) = serve(|mut peer| {
        peer.handshake();
        peer.prepare(&[], &[]);
        peer.bind();
        peer.send(b'H', &[0, 0, 0]);
        peer.send(b'd', b"dropped\n");
        peer.send(b'c', &[]);
        peer.command_complete("COPY 1");
        peer.ready();
        peer.terminate();
    });

    let conn = Connection::connect(&config).unwrap();
    let err = conn.execute("COPY t TO STDOUT", &[]).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Interface(InterfaceError::MissingCopyStream { direction: "out" })
    ));
    conn.close().unwrap();
    handle.join().unwrap();
}

use std::net::TcpListener;
use std::thread;

use swiftws::handshake::Upgrader;
use swiftws::{acquire_frame, release_frame, dial, CloseCode, Error, Mode, OpCode};

use log::debug;

#[test]
fn echo_ping_fragment_close() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lis = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = lis.local_addr().unwrap();

    let t = thread::spawn(move || {
        let (tcp, _) = lis.accept().unwrap();
        debug!("server: tcp accepted");
        let conn = Upgrader::new(|_conn| {}).accept(tcp).unwrap();
        debug!("server: websocket accepted");

        let mut buf = Vec::new();
        let mode = conn.read_message(&mut buf).unwrap();
        assert_eq!(mode, Mode::Text);
        assert_eq!(buf, b"Hello");

        conn.write_string("Hello2").unwrap();

        // the ping sent before the fragments is answered transparently
        buf.clear();
        let mode = conn.read_message(&mut buf).unwrap();
        assert_eq!(mode, Mode::Text);
        assert_eq!(buf, b"Hello world");

        debug!("server: closing");
        conn.close_with_reason("Bye").unwrap();
    });

    let conn = dial(&format!("ws://127.0.0.1:{}/ws", addr.port())).unwrap();
    debug!("client: websocket connected");

    conn.write_string("Hello").unwrap();

    let mut buf = Vec::new();
    let mode = conn.read_message(&mut buf).unwrap();
    assert_eq!(mode, Mode::Text);
    assert_eq!(buf, b"Hello2");

    conn.send_code(OpCode::Ping, None, b"").unwrap();

    // fragmented message: text without FIN, then continuation with FIN
    let mut fr = acquire_frame();
    fr.set_text();
    fr.set_payload(b"Hello");
    fr.mask();
    conn.write_frame(&fr).unwrap();

    fr.reset();
    fr.set_continuation();
    fr.set_fin();
    fr.set_payload(b" world");
    fr.mask();
    conn.write_frame(&fr).unwrap();
    release_frame(fr);

    let fr = conn.next_frame().unwrap();
    assert!(fr.is_pong());
    release_frame(fr);

    let mut fr = conn.next_frame().unwrap();
    assert!(fr.is_close());
    assert_eq!(fr.status(), Some(CloseCode::Normal));
    assert_eq!(fr.payload(), b"Bye");
    conn.reply_close(&mut fr).unwrap();
    release_frame(fr);

    // the connection is gone for good
    assert!(matches!(conn.write_string("x"), Err(Error::Closed)));
    assert!(matches!(conn.close(), Err(Error::Closed)));

    t.join().unwrap();
}

#[test]
fn peer_close_ends_read_message() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lis = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = lis.local_addr().unwrap();

    let t = thread::spawn(move || {
        let (tcp, _) = lis.accept().unwrap();
        let conn = Upgrader::new(|_conn| {}).accept(tcp).unwrap();

        let mut buf = Vec::new();
        let err = conn.read_message(&mut buf).unwrap_err();
        assert!(err.is_closed());
    });

    let conn = dial(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap();
    conn.close().unwrap();

    t.join().unwrap();
}

#[test]
fn default_mode_and_binary_messages() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lis = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = lis.local_addr().unwrap();

    let t = thread::spawn(move || {
        let (tcp, _) = lis.accept().unwrap();
        let conn = Upgrader::new(|_conn| {}).accept(tcp).unwrap();

        let mut buf = Vec::new();
        let mode = conn.read_message(&mut buf).unwrap();
        assert_eq!(mode, Mode::Binary);
        assert_eq!(buf, vec![0u8, 1, 2, 253, 254, 255]);

        conn.write_message(Mode::Binary, &buf).unwrap();

        let mut buf = Vec::new();
        let _ = conn.read_message(&mut buf);
    });

    let conn = dial(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap();
    conn.set_mode(Mode::Binary);
    conn.write(&[0u8, 1, 2, 253, 254, 255]).unwrap();

    let mut buf = Vec::new();
    let mode = conn.read_message(&mut buf).unwrap();
    assert_eq!(mode, Mode::Binary);
    assert_eq!(buf, vec![0u8, 1, 2, 253, 254, 255]);

    conn.close().unwrap();
    t.join().unwrap();
}

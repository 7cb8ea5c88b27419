use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use swiftws::handshake::Upgrader;
use swiftws::{dial, Mode};

use log::debug;

const PRODUCERS: usize = 16;
const MESSAGES: usize = 250;
// 25 bytes
const TEXT: &str = "0123456789abcdefghijklmno";

#[test]
fn concurrent_writers_never_interleave() {
    let _ = env_logger::builder().is_test(true).try_init();

    let lis = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = lis.local_addr().unwrap();

    let t = thread::spawn(move || {
        let (tcp, _) = lis.accept().unwrap();
        let conn = Upgrader::new(|_conn| {}).accept(tcp).unwrap();

        let mut buf = Vec::new();
        for _ in 0..PRODUCERS * MESSAGES {
            buf.clear();
            let mode = conn.read_message(&mut buf).unwrap();
            assert_eq!(mode, Mode::Text);
            // a torn frame would show up as garbled payload here
            assert_eq!(buf, TEXT.as_bytes());
        }
        debug!("server: all {} messages arrived intact", PRODUCERS * MESSAGES);

        let _ = conn.close();
    });

    let conn = Arc::new(dial(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap());

    let writers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let conn = conn.clone();
            thread::spawn(move || {
                for _ in 0..MESSAGES {
                    conn.write_string(TEXT).unwrap();
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let _ = conn.close();
    t.join().unwrap();
}

#[test]
fn concurrent_readers_share_one_connection() {
    let _ = env_logger::builder().is_test(true).try_init();

    const READERS: usize = 8;
    const TOTAL: usize = 800;

    let lis = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = lis.local_addr().unwrap();

    let t = thread::spawn(move || {
        let (tcp, _) = lis.accept().unwrap();
        let conn = Arc::new(Upgrader::new(|_conn| {}).accept(tcp).unwrap());

        let received = Arc::new(AtomicUsize::new(0));
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let conn = conn.clone();
                let received = received.clone();
                thread::spawn(move || {
                    let mut buf = Vec::new();
                    loop {
                        buf.clear();
                        match conn.read_message(&mut buf) {
                            Ok(_) => {
                                assert_eq!(buf, TEXT.as_bytes());
                                received.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                assert!(e.is_closed());
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(received.load(Ordering::SeqCst), TOTAL);
    });

    let conn = dial(&format!("ws://127.0.0.1:{}/", addr.port())).unwrap();
    for _ in 0..TOTAL {
        conn.write_string(TEXT).unwrap();
    }
    conn.close().unwrap();

    t.join().unwrap();
}

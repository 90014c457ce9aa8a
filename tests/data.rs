use std::sync::{Arc, Mutex};
use std::thread;

use pskdtls::{Connection, Error};

mod common;
use common::*;

#[test]
fn large_write_is_split_into_records() {
    let (mut client, mut server) = connected(config(), config());

    let data: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    client.send(&data).unwrap();

    let mut lens = vec![];
    let mut received = vec![];
    while received.len() < data.len() {
        let chunk = server.recv().unwrap();
        lens.push(chunk.len());
        received.extend_from_slice(&chunk);
    }

    assert_eq!(lens, vec![16384, 16384, 7232]);
    assert_eq!(received, data);
}

#[test]
fn smaller_fragment_length() {
    let small = Arc::new(fast_config().max_fragment_len(1000).build().unwrap());
    let (mut client, mut server) = connected(small, config());

    client.send(&[7; 2500]).unwrap();
    assert_eq!(server.recv().unwrap().len(), 1000);
    assert_eq!(server.recv().unwrap().len(), 1000);
    assert_eq!(server.recv().unwrap().len(), 500);

    server.send(&[8; 2500]).unwrap();
    assert_eq!(client.recv().unwrap().len(), 2500);
}

#[test]
fn empty_write_sends_nothing() {
    let read_quick = Arc::new(
        fast_config()
            .read_timeout(Some(std::time::Duration::from_millis(200)))
            .build()
            .unwrap(),
    );
    let (mut client, mut server) = connected(config(), read_quick);

    client.send(&[]).unwrap();
    assert!(matches!(server.recv(), Err(Error::Timeout("read"))));
}

#[test]
fn lost_application_data_is_not_resent() {
    let _ = env_logger::try_init();
    let (mut tc, ts) = transports();

    let dropped = Arc::new(Mutex::new(false));
    let flag = dropped.clone();
    tc.set_filter(move |datagram| {
        let mut done = flag.lock().unwrap();
        if first_record(datagram) == (23, 1) && !*done {
            *done = true;
            return false;
        }
        true
    });

    let server = spawn_server(ts, config());
    let mut client = Connection::connect_with(tc, server_addr(), config()).unwrap();
    let mut server = server.join().unwrap().unwrap();

    client.send(b"lost").unwrap();
    assert!(*dropped.lock().unwrap());
    client.send(b"kept").unwrap();
    assert_eq!(server.recv().unwrap(), b"kept");
}

#[test]
fn messages_keep_order_in_both_directions() {
    let (mut client, mut server) = connected(config(), config());

    let echo = thread::spawn(move || {
        for _ in 0..20 {
            let data = server.recv().unwrap();
            server.send(&data).unwrap();
        }
        server
    });

    for i in 0..20u8 {
        client.send(&[i; 100]).unwrap();
        assert_eq!(client.recv().unwrap(), vec![i; 100]);
    }
    echo.join().unwrap();
}

use dmxp_capture::{
    BufferBuilder, BufferItem, BufferOptions, ConstructionError, FieldNames, SharedBuffer,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn item(source: &str, payload: &[u8]) -> BufferItem {
    BufferItem::new(source, payload.to_vec())
}

fn in_memory(capacity: usize) -> Arc<SharedBuffer> {
    Arc::new(BufferBuilder::new().with_capacity(capacity).build().unwrap())
}

#[test]
fn push_then_pop() {
    let buffer = in_memory(4);
    assert!(buffer.push(item("dev0", &[1, 2, 3])).unwrap());
    assert_eq!(buffer.len(), 1);

    let out = buffer.pop().unwrap().unwrap();
    assert_eq!(out.source, "dev0");
    assert_eq!(out.payload, vec![1, 2, 3]);
    assert!(buffer.is_empty());
}

#[test]
fn zero_capacity_is_a_construction_error() {
    let err = BufferBuilder::new().with_capacity(0).build().unwrap_err();
    assert!(matches!(err, ConstructionError::ZeroCapacity));
}

#[test]
fn huge_capacity_does_not_reserve_up_front() {
    let buffer = BufferBuilder::new().with_capacity(usize::MAX / 4).build().unwrap();
    assert_eq!(buffer.capacity(), usize::MAX / 4);
    assert!(buffer.push(item("big", b"1")).unwrap());
    assert_eq!(buffer.pop().unwrap().unwrap().payload, b"1");
}

#[test]
fn try_pop_on_empty_returns_none() {
    let buffer = in_memory(2);
    assert!(buffer.try_pop().unwrap().is_none());
    buffer.push(item("a", b"x")).unwrap();
    assert!(buffer.try_pop().unwrap().is_some());
    assert!(buffer.try_pop().unwrap().is_none());
}

#[test]
fn fifo_for_a_single_producer() {
    let buffer = in_memory(8);
    let producer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for i in 0..500u32 {
                assert!(buffer.push(item("p", &i.to_le_bytes())).unwrap());
            }
        })
    };

    for expected in 0..500u32 {
        let out = buffer.pop().unwrap().unwrap();
        assert_eq!(out.payload, expected.to_le_bytes());
    }
    producer.join().unwrap();
}

#[test]
fn push_blocks_at_capacity() {
    let buffer = in_memory(2);
    buffer.push(item("a", b"1")).unwrap();
    buffer.push(item("a", b"2")).unwrap();
    assert_eq!(buffer.len(), 2);

    let pushed = Arc::new(AtomicBool::new(false));
    let handle = {
        let buffer = Arc::clone(&buffer);
        let pushed = Arc::clone(&pushed);
        thread::spawn(move || {
            buffer.push(item("a", b"3")).unwrap();
            pushed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!pushed.load(Ordering::SeqCst), "push should block while full");
    assert!(buffer.len() <= buffer.capacity());

    assert_eq!(buffer.pop().unwrap().unwrap().payload, b"1");
    handle.join().unwrap();
    assert!(pushed.load(Ordering::SeqCst));
    assert_eq!(buffer.len(), 2);
}

#[test]
fn pop_blocks_until_push() {
    let buffer = in_memory(2);
    let handle = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.pop().unwrap())
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished());
    buffer.push(item("late", b"z")).unwrap();

    let out = handle.join().unwrap().unwrap();
    assert_eq!(out.source, "late");
}

#[test]
fn shutdown_drains_queued_items_then_reports_none() {
    let buffer = in_memory(8);
    for i in 0..5u8 {
        buffer.push(item("s", &[i])).unwrap();
    }
    buffer.shutdown();
    buffer.shutdown(); // idempotent

    for i in 0..5u8 {
        assert_eq!(buffer.pop().unwrap().unwrap().payload, vec![i]);
    }
    assert!(buffer.pop().unwrap().is_none());
    assert!(buffer.pop().unwrap().is_none());
    assert!(buffer.try_pop().unwrap().is_none());
}

#[test]
fn push_after_shutdown_is_a_noop() {
    let buffer = in_memory(4);
    buffer.shutdown();
    assert!(!buffer.push(item("s", b"dropped")).unwrap());
    assert!(buffer.is_empty());
    assert!(buffer.is_shutdown());
}

#[test]
fn shutdown_releases_blocked_pusher_without_enqueuing() {
    let buffer = in_memory(1);
    buffer.push(item("s", b"first")).unwrap();

    let handle = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.push(item("s", b"second")).unwrap())
    };
    thread::sleep(Duration::from_millis(50));
    buffer.shutdown();

    assert!(!handle.join().unwrap(), "blocked push must return without enqueuing");
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.pop().unwrap().unwrap().payload, b"first");
    assert!(buffer.pop().unwrap().is_none());
}

#[test]
fn shutdown_releases_blocked_popper() {
    let buffer = in_memory(1);
    let handle = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.pop().unwrap())
    };
    thread::sleep(Duration::from_millis(50));
    buffer.shutdown();
    assert!(handle.join().unwrap().is_none());
}

#[test]
fn field_names_are_stamped_by_the_buffer() {
    let labels = FieldNames {
        source: "origin".to_string(),
        timestamp: String::new(),
        payload: "bytes".to_string(),
    };
    let buffer = BufferBuilder::new().with_field_names(labels).build().unwrap();
    assert_eq!(buffer.field_names().timestamp, "timestamp");

    let mut incoming = item("x", b"1");
    incoming.field_names.source = "ignored".to_string();
    buffer.push(incoming).unwrap();

    let out = buffer.pop().unwrap().unwrap();
    assert_eq!(out.field_names.source, "origin");
    assert_eq!(out.field_names.timestamp, "timestamp");
    assert_eq!(out.field_names.payload, "bytes");
}

#[test]
fn in_memory_mode_ignores_max_payload_size() {
    let buffer = SharedBuffer::new(BufferOptions {
        capacity: 2,
        max_payload_size: 0,
        ..BufferOptions::default()
    })
    .unwrap();
    assert!(!buffer.is_persisted());
    assert!(buffer.push(item("big", &[7u8; 10_000])).unwrap());
    assert_eq!(buffer.pop().unwrap().unwrap().payload.len(), 10_000);
}

#[test]
fn queue_never_exceeds_capacity_under_contention() {
    let capacity = 4;
    let buffer = in_memory(capacity);
    let done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    buffer.push(item(&format!("p{p}"), &i.to_le_bytes())).unwrap();
                }
            })
        })
        .collect();

    let watcher = {
        let buffer = Arc::clone(&buffer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                assert!(buffer.len() <= capacity);
                thread::yield_now();
            }
        })
    };

    let mut popped = 0;
    while popped < 8_000 {
        if buffer.pop().unwrap().is_some() {
            popped += 1;
        }
    }
    for p in producers {
        p.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    watcher.join().unwrap();
    assert!(buffer.is_empty());
}

#[test]
fn debug_output_does_not_touch_payloads() {
    let buffer = in_memory(3);
    buffer.push(item("d", b"secret")).unwrap();
    let rendered = format!("{buffer:?}");
    assert!(rendered.contains("SharedBuffer"));
    assert!(rendered.contains("queued: 1"));
}

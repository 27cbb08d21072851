use chrono::{Local, TimeZone};
use dmxp_capture::Pipeline::RecordFormat;
use dmxp_capture::{
    BufferBuilder, BufferItem, ConsumerWriter, Lifecycle, Producer, ProducerError, RunContext,
    SharedBuffer, Source, WriterError, WriterSettings,
};
use serial_test::serial;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn settings(output: &Path, format: RecordFormat, flush_interval: Duration) -> WriterSettings {
    WriterSettings {
        output_path: output.to_path_buf(),
        format,
        flush_interval,
    }
}

fn no_timestamp() -> RecordFormat {
    RecordFormat {
        include_timestamp: false,
        ..RecordFormat::default()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn unhex(column: &str) -> Vec<u8> {
    column
        .split(' ')
        .filter(|pair| !pair.is_empty())
        .map(|pair| u8::from_str_radix(pair, 16).unwrap())
        .collect()
}

#[test]
fn writes_quoted_csv_line() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(BufferBuilder::new().with_capacity(8).build().unwrap());

    let format = RecordFormat {
        timestamp_format: "%Y-%m-%d".to_string(),
        ..RecordFormat::default()
    };
    let writer =
        ConsumerWriter::new(settings(&out, format, Duration::ZERO), Arc::clone(&buffer)).unwrap();
    assert!(writer.start().unwrap());
    assert!(!writer.start().unwrap());

    let noon = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap();
    buffer
        .push(BufferItem::with_timestamp(
            "dev0",
            SystemTime::from(noon),
            vec![0x41, 0x42],
        ))
        .unwrap();
    buffer.push(BufferItem::new("a\"b", vec![])).unwrap();

    writer.stop().unwrap();
    let lines = read_lines(&out);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], r#""2024-01-01","dev0","41 42""#);
    assert!(lines[1].ends_with(r#","a""b","""#));
}

#[test]
fn output_is_appended_not_truncated() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    std::fs::write(&out, "existing line\n").unwrap();

    let buffer = Arc::new(BufferBuilder::new().with_capacity(4).build().unwrap());
    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::ZERO),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();
    buffer.push(BufferItem::new("src", vec![0xff])).unwrap();
    writer.stop().unwrap();

    assert_eq!(read_lines(&out), vec!["existing line", r#""src","ff""#]);
}

#[test]
fn zero_flush_interval_makes_lines_visible_immediately() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(BufferBuilder::new().with_capacity(4).build().unwrap());
    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::ZERO),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();

    buffer.push(BufferItem::new("live", vec![1])).unwrap();
    let mut seen = false;
    for _ in 0..200 {
        if read_lines(&out).len() == 1 {
            seen = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(seen, "line should be flushed without waiting for stop");
    writer.stop().unwrap();
}

#[test]
fn interval_flush_waits_for_the_interval_to_elapse() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(BufferBuilder::new().with_capacity(4).build().unwrap());
    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::from_millis(500)),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();

    // Written well inside the interval: still sitting in the stream's buffer.
    buffer.push(BufferItem::new("early", vec![1])).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(buffer.is_empty());
    assert!(read_lines(&out).is_empty(), "flushed before the interval elapsed");

    // The first line written after the interval flushes everything pending.
    thread::sleep(Duration::from_millis(600));
    buffer.push(BufferItem::new("late", vec![2])).unwrap();
    let mut lines = Vec::new();
    for _ in 0..200 {
        lines = read_lines(&out);
        if lines.len() == 2 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(lines, vec![r#""early","01""#, r#""late","02""#]);
    assert!(writer.is_running());

    writer.stop().unwrap();
}

#[test]
fn long_flush_interval_still_flushes_on_stop() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(BufferBuilder::new().with_capacity(4).build().unwrap());
    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::from_secs(3600)),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();

    for i in 0..3u8 {
        buffer.push(BufferItem::new("slow", vec![i])).unwrap();
    }
    writer.stop().unwrap();
    assert_eq!(read_lines(&out).len(), 3);
}

#[test]
fn stop_drains_everything_already_queued() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(BufferBuilder::new().with_capacity(128).build().unwrap());
    for i in 0..100u8 {
        buffer.push(BufferItem::new("q", vec![i])).unwrap();
    }

    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::from_millis(50)),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();
    writer.stop().unwrap();

    let lines = read_lines(&out);
    assert_eq!(lines.len(), 100);
    assert_eq!(lines[99], r#""q","63""#);
}

#[test]
fn invalid_timestamp_format_fails_construction() {
    let dir = tempdir().unwrap();
    let buffer = Arc::new(BufferBuilder::new().build().unwrap());
    let format = RecordFormat {
        timestamp_format: "%".to_string(),
        ..RecordFormat::default()
    };
    let output = dir.path().join("o.csv");
    let err = ConsumerWriter::new(settings(&output, format, Duration::ZERO), buffer).unwrap_err();
    assert!(matches!(err, WriterError::InvalidTimestampFormat(_)));
}

#[test]
fn unopenable_output_fails_start() {
    let dir = tempdir().unwrap();
    let buffer = Arc::new(BufferBuilder::new().build().unwrap());
    let out: PathBuf = dir.path().join("missing").join("o.csv");
    let writer =
        ConsumerWriter::new(settings(&out, no_timestamp(), Duration::ZERO), buffer).unwrap();
    assert!(matches!(writer.start(), Err(WriterError::Open { .. })));
    assert!(!writer.is_running());
}

/// Pushes `count` records whose first four bytes are a sequence number,
/// padded with random bytes up to a random length.
struct Burst {
    label: String,
    count: u32,
    max_payload: usize,
    sent: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
}

impl Source for Burst {
    fn run(&mut self, ctx: &RunContext<'_>) -> Result<(), ProducerError> {
        let mut rng = fastrand::Rng::new();
        for seq in 0..self.count {
            let len = rng.usize(4..=self.max_payload);
            let mut payload = seq.to_le_bytes().to_vec();
            payload.extend((4..len).map(|_| rng.u8(..)));
            self.sent.lock().push(payload.clone());
            assert!(ctx.push(&self.label, payload)?);
        }
        Ok(())
    }
}

fn stress(
    buffer: Arc<SharedBuffer>,
    out: &Path,
    producers: usize,
    per_producer: u32,
    max_payload: usize,
) {
    let writer = ConsumerWriter::new(
        settings(out, no_timestamp(), Duration::from_millis(20)),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();

    let mut sent = Vec::new();
    let lifecycles: Vec<_> = (0..producers)
        .map(|p| {
            let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
            sent.push((format!("p{p}"), Arc::clone(&log)));
            Lifecycle::new(
                format!("p{p}"),
                Arc::clone(&buffer),
                Burst {
                    label: format!("p{p}"),
                    count: per_producer,
                    max_payload,
                    sent: log,
                },
            )
        })
        .collect();

    for l in &lifecycles {
        assert!(l.start().unwrap());
    }
    for l in &lifecycles {
        while l.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
        l.stop().unwrap();
    }
    writer.stop().unwrap();

    let lines = read_lines(out);
    assert_eq!(lines.len(), producers * per_producer as usize);

    // Group output by source, checking per-producer order as we go.
    let mut received: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
    for line in &lines {
        let (source, payload) = line.split_once(',').unwrap();
        let source = source.trim_matches('"').to_string();
        let payload = unhex(payload.trim_matches('"'));
        let seq = u32::from_le_bytes(payload[..4].try_into().unwrap());
        let entries = received.entry(source).or_default();
        assert_eq!(seq as usize, entries.len(), "out-of-order or duplicate record");
        entries.push(payload);
    }

    for (label, log) in sent {
        let expected = log.lock();
        let got = &received[&label];
        assert_eq!(got.len(), expected.len());

        let digest = |records: &[Vec<u8>]| {
            let mut hasher = Sha256::new();
            for r in records {
                hasher.update((r.len() as u32).to_le_bytes());
                hasher.update(r);
            }
            hasher.finalize()
        };
        assert_eq!(digest(&got[..]), digest(&expected[..]), "payload bytes differ for {label}");
    }
}

#[test]
#[serial]
fn concurrent_stress_in_memory() {
    let dir = tempdir().unwrap();
    let buffer = Arc::new(BufferBuilder::new().with_capacity(64).build().unwrap());
    stress(buffer, &dir.path().join("out.csv"), 4, 10_000, 64);
}

#[test]
#[serial]
fn concurrent_stress_persisted() {
    let dir = tempdir().unwrap();
    let buffer = Arc::new(
        BufferBuilder::new()
            .with_capacity(32)
            .with_max_payload_size(96)
            .persisted(dir.path().join("ring.mmap"))
            .build()
            .unwrap(),
    );
    stress(buffer, &dir.path().join("out.csv"), 4, 10_000, 96);
}

#[cfg(target_os = "linux")]
#[test]
fn corruption_stops_the_writer_and_releases_producers() {
    use std::fs::OpenOptions;
    use std::os::unix::fs::FileExt;

    let dir = tempdir().unwrap();
    let ring = dir.path().join("ring.mmap");
    let out = dir.path().join("out.csv");
    let buffer = Arc::new(
        BufferBuilder::new()
            .with_capacity(2)
            .with_max_payload_size(8)
            .persisted(&ring)
            .build()
            .unwrap(),
    );

    buffer.push(BufferItem::new("ok", vec![1])).unwrap();
    buffer.push(BufferItem::new("bad", vec![2, 2])).unwrap();
    // Slot 1 now claims a different length than its queue entry recorded.
    let file = OpenOptions::new().write(true).open(&ring).unwrap();
    file.write_all_at(&5u32.to_ne_bytes(), (4 + 8) as u64).unwrap();

    let writer = ConsumerWriter::new(
        settings(&out, no_timestamp(), Duration::ZERO),
        Arc::clone(&buffer),
    )
    .unwrap();
    writer.start().unwrap();

    // The writer shuts the buffer down when it hits the bad slot.
    for _ in 0..200 {
        if buffer.is_shutdown() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(buffer.is_shutdown());
    assert!(!buffer.push(BufferItem::new("late", vec![3])).unwrap());

    // A dead writer does not report itself as running.
    for _ in 0..200 {
        if !writer.is_running() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!writer.is_running());

    let err = writer.stop().unwrap_err();
    assert!(matches!(err, WriterError::Corruption(_)));
    assert_eq!(read_lines(&out), vec![r#""ok","01""#]);
}

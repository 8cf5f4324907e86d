// Integration tests for recordtape
// Round trips through buffers and tapes, chunk isolation, carousel walks and key identity

use bytes::BytesMut;
use recordtape::metadata::{FieldType, RecordMetadata};
use recordtape::storage::MemoryProvider;
use recordtape::{DataRecord, DataRecordTape, DynamicRecordBuffer, HashKey, Options, RecordKey, TapeCarousel, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn metadata() -> Arc<RecordMetadata> {
    Arc::new(
        RecordMetadata::new("event")
            .with_field("id", FieldType::Long)
            .with_field("kind", FieldType::String)
            .with_field("score", FieldType::Number)
            .with_field("flag", FieldType::Boolean)
            .with_field("blob", FieldType::Bytes),
    )
}

fn event(md: &Arc<RecordMetadata>, id: i64) -> DataRecord {
    let kind = if id % 7 == 0 { Value::Null } else { Value::from(format!("kind-{}", id % 5)) };
    DataRecord::from_values(
        md.clone(),
        vec![
            Value::Long(id),
            kind,
            Value::Number(id as f64 * 0.5),
            Value::Boolean(id % 2 == 0),
            Value::from(vec![id as u8; (id % 13) as usize]),
        ],
    )
    .unwrap()
}

/// Records written to a buffer come back equal, by handle and in sequence,
/// across repeated clear cycles
#[test]
fn test_buffer_round_trip_cycles() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let md = metadata();

    for spill in [false, true] {
        let options = Options::new().tmp_dir(dir.path()).buffer_capacity(256).spill_to_disk(spill);
        let mut buffer = DynamicRecordBuffer::new(options);
        buffer.init().unwrap();

        for cycle in 0..3 {
            let records: Vec<_> = (0..150).map(|i| event(&md, i + cycle * 1000)).collect();
            let keys: Vec<_> = records.iter().map(|r| buffer.write(r).unwrap()).collect();
            buffer.flush_buffer().unwrap();
            buffer.load_data().unwrap();

            let mut read = DataRecord::new(md.clone());
            for (key, expected) in keys.iter().zip(&records).rev() {
                buffer.read_record(key, &mut read).unwrap();
                assert_eq!(&read, expected, "cycle {} spill {}", cycle, spill);
            }
            for expected in &records {
                assert!(buffer.next(&mut read).unwrap());
                assert_eq!(&read, expected);
            }
            assert!(!buffer.next(&mut read).unwrap());
            buffer.clear().unwrap();
        }
        buffer.close();
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Records put on a tape come back equal across repeated clear cycles
#[test]
fn test_tape_round_trip_cycles() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let md = metadata();
    let mut carousel = TapeCarousel::new(1, Options::new().tmp_dir(dir.path()));
    carousel.open().unwrap();
    let tape = carousel.get_first_tape().unwrap();

    for cycle in 0..3 {
        let records: Vec<_> = (0..500).map(|i| event(&md, i * (cycle + 1))).collect();
        tape.add_data_chunk().unwrap();
        for record in &records {
            tape.put_record(record).unwrap();
        }
        tape.flush(true).unwrap();
        tape.rewind().unwrap();

        let mut read = DataRecord::new(md.clone());
        for expected in &records {
            assert!(tape.get_record(&mut read).unwrap());
            assert_eq!(&read, expected);
        }
        assert!(!tape.get_record(&mut read).unwrap());
        tape.clear().unwrap();
    }
    carousel.free();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// get() stops at every chunk end and never leaks into the next chunk
#[test]
fn test_chunk_isolation() {
    init_logging();
    let mut tape = DataRecordTape::new(Options::default(), Arc::new(MemoryProvider));
    tape.open(0).unwrap();

    let sizes = [17usize, 0, 42, 1];
    for (chunk, size) in sizes.iter().enumerate() {
        tape.add_data_chunk().unwrap();
        for i in 0..*size {
            tape.put(format!("{}:{}", chunk, i).as_bytes()).unwrap();
        }
    }

    // Read chunks out of order
    let mut buf = BytesMut::new();
    for chunk in [2usize, 0, 3, 1] {
        tape.set_data_chunk(chunk).unwrap();
        let mut count = 0;
        while tape.get(&mut buf).unwrap() {
            assert_eq!(&buf[..], format!("{}:{}", chunk, count).as_bytes());
            count += 1;
        }
        assert_eq!(count, sizes[chunk]);
        assert!(!tape.get(&mut buf).unwrap());
    }
    assert_eq!(tape.num_chunks(), sizes.len());
}

/// Values sharing the null encoding come back from a tape as the record that was put
#[test]
fn test_null_sentinels_round_trip() {
    let md = Arc::new(
        RecordMetadata::new("sentinel")
            .with_field("i", FieldType::Integer)
            .with_field("l", FieldType::Long)
            .with_field("n", FieldType::Number)
            .with_field("d", FieldType::Date),
    );
    let record = DataRecord::from_values(
        md.clone(),
        vec![Value::Integer(i32::MIN), Value::Long(i64::MIN), Value::Number(f64::NAN), Value::Date(i64::MIN)],
    )
    .unwrap();

    let mut tape = DataRecordTape::new(Options::default(), Arc::new(MemoryProvider));
    tape.open(0).unwrap();
    tape.put_record(&record).unwrap();
    tape.rewind().unwrap();

    let mut read = DataRecord::from_values(
        md,
        vec![Value::Integer(1), Value::Long(1), Value::Number(1.0), Value::Date(1)],
    )
    .unwrap();
    assert!(tape.get_record(&mut read).unwrap());
    assert_eq!(read, record);
}

/// The carousel walk visits every tape once in order and does not wrap
#[test]
fn test_carousel_pass() {
    init_logging();
    for n in [1usize, 2, 5] {
        let mut carousel = TapeCarousel::with_provider(n, Options::default(), Arc::new(MemoryProvider));
        carousel.open().unwrap();

        let mut seen = vec![carousel.get_first_tape().unwrap().id().unwrap()];
        for _ in 1..n {
            seen.push(carousel.get_next_tape().unwrap().id().unwrap());
        }
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        assert!(carousel.get_next_tape().is_none(), "walk must not wrap to tape 0");
        assert_eq!(carousel.free(), 0);
    }
}

fn hash_of(key: &HashKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// HashKey equality depends on key fields only
#[test]
fn test_hash_key_equality() {
    let md = metadata();
    let key = Arc::new(RecordKey::new(&["kind", "flag"], md.clone()).unwrap());

    let a = event(&md, 3);
    let mut b = event(&md, 3);
    b.set(0, 99i64).unwrap();
    b.set(2, 1.25).unwrap();
    let (ka, kb) = (HashKey::new(key.clone(), Arc::new(a.clone())).unwrap(), HashKey::new(key.clone(), Arc::new(b)).unwrap());
    assert_eq!(ka, kb);
    assert_eq!(hash_of(&ka), hash_of(&kb));

    let mut c = a.clone();
    c.set(1, "other").unwrap();
    let kc = HashKey::new(key.clone(), Arc::new(c)).unwrap();
    assert_ne!(ka, kc);
    assert_ne!(hash_of(&ka), hash_of(&kc));

    let mut d = a;
    d.set(3, true).unwrap();
    assert_ne!(ka, HashKey::new(key, Arc::new(d)).unwrap());
}

/// An empty buffer reads nothing across repeated reset and clear cycles
#[test]
fn test_empty_buffer_cycles() {
    let md = metadata();
    for spill in [false, true] {
        let dir = TempDir::new().unwrap();
        let mut buffer = DynamicRecordBuffer::new(Options::new().tmp_dir(dir.path()).spill_to_disk(spill));
        buffer.init().unwrap();
        let mut record = event(&md, 1);

        for _ in 0..3 {
            buffer.flush_buffer().unwrap();
            buffer.load_data().unwrap();
            assert!(!buffer.next(&mut record).unwrap());
            buffer.reset().unwrap();
            assert!(!buffer.next(&mut record).unwrap());
            buffer.clear().unwrap();
        }
        assert_eq!(record, event(&md, 1));
        assert!(buffer.is_empty());
    }
}

/// Many chunks spread over a carousel stay independent per tape
#[test]
fn test_partitioned_spill() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let md = metadata();
    let options = Options::new().tmp_dir(dir.path()).io_buffer_size(512);
    let mut carousel = TapeCarousel::new(3, options);
    carousel.open().unwrap();

    for id in 0..300i64 {
        let tape = carousel.get_tape((id % 3) as usize).unwrap();
        if id % 30 < 3 {
            tape.add_data_chunk().unwrap();
        }
        tape.put_record(&event(&md, id)).unwrap();
    }
    carousel.flush(true);
    carousel.rewind().unwrap();

    let mut record = DataRecord::new(md.clone());
    for tape_index in 0..3usize {
        let tape = carousel.get_tape(tape_index).unwrap();
        assert_eq!(tape.num_chunks(), 10);
        let mut expected = tape_index as i64;
        for chunk in 0..10 {
            tape.set_data_chunk(chunk).unwrap();
            while tape.get_record(&mut record).unwrap() {
                assert_eq!(record.get(0), &Value::Long(expected));
                expected += 3;
            }
        }
        assert_eq!(expected, 300 + tape_index as i64);
    }
}

//! Delta-block series tests.

use tempfile::TempDir;
use tickfile::codec::{CodecKind, FieldCodec, FieldValue};
use tickfile::record::{FieldShape, IndexedRecord, Record, RecordDescriptor};
use tickfile::{DeltaBlockSeries, OpenMode, Result, SeriesOptions, TickfileError};

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Trade {
    time: i64,
    price: f64,
    size: i64,
}

fn trade_descriptor(price_multiplier: i64) -> RecordDescriptor<Trade> {
    RecordDescriptor::new("tickfile_tests::Trade")
        .field(FieldShape::leaf("i64"))
        .field(FieldShape::leaf("f64"))
        .field(FieldShape::leaf("i64"))
        .codec(FieldCodec::new(
            "time",
            CodecKind::TimestampDelta,
            |t: &Trade| FieldValue::Int(t.time),
            |t, v| {
                if let FieldValue::Int(x) = v {
                    t.time = x;
                }
            },
        ))
        .codec(FieldCodec::new(
            "price",
            CodecKind::MultipliedDelta {
                multiplier: price_multiplier,
                divisor: 1,
            },
            |t: &Trade| FieldValue::Float(t.price),
            |t, v| {
                t.price = match v {
                    FieldValue::Float(f) => f,
                    FieldValue::Int(i) => i as f64,
                }
            },
        ))
        .codec(FieldCodec::new(
            "size",
            CodecKind::MultipliedDelta {
                multiplier: 1,
                divisor: 1,
            },
            |t: &Trade| FieldValue::Int(t.size),
            |t, v| {
                if let FieldValue::Int(x) = v {
                    t.size = x;
                }
            },
        ))
}

impl Record for Trade {
    const SIZE: usize = 24;

    fn descriptor() -> RecordDescriptor<Self> {
        trade_descriptor(10_000)
    }

    fn write_to(&self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.time.to_le_bytes());
        dst[8..16].copy_from_slice(&self.price.to_le_bytes());
        dst[16..24].copy_from_slice(&self.size.to_le_bytes());
    }

    fn read_from(src: &[u8]) -> Self {
        Self {
            time: i64::from_le_bytes(src[..8].try_into().unwrap()),
            price: f64::from_le_bytes(src[8..16].try_into().unwrap()),
            size: i64::from_le_bytes(src[16..24].try_into().unwrap()),
        }
    }
}

impl IndexedRecord for Trade {
    type Index = i64;

    fn series_index(&self) -> i64 {
        self.time
    }
}

/// Same name and shape as `Trade`, but written with a coarser multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct CoarseTrade {
    time: i64,
    price: f64,
    size: i64,
}

impl Record for CoarseTrade {
    const SIZE: usize = 24;

    fn descriptor() -> RecordDescriptor<Self> {
        // Identical signature, different codec parameters.
        let fine = trade_descriptor(100);
        let mut desc = RecordDescriptor::new("tickfile_tests::Trade");
        for shape in fine.fields() {
            desc = desc.field(shape.clone());
        }
        for codec in fine.codecs() {
            desc = desc.codec(remap(codec.clone()));
        }
        desc
    }

    fn write_to(&self, dst: &mut [u8]) {
        dst[..8].copy_from_slice(&self.time.to_le_bytes());
        dst[8..16].copy_from_slice(&self.price.to_le_bytes());
        dst[16..24].copy_from_slice(&self.size.to_le_bytes());
    }

    fn read_from(src: &[u8]) -> Self {
        Self {
            time: i64::from_le_bytes(src[..8].try_into().unwrap()),
            price: f64::from_le_bytes(src[8..16].try_into().unwrap()),
            size: i64::from_le_bytes(src[16..24].try_into().unwrap()),
        }
    }
}

impl IndexedRecord for CoarseTrade {
    type Index = i64;

    fn series_index(&self) -> i64 {
        self.time
    }
}

fn remap(codec: FieldCodec<Trade>) -> FieldCodec<CoarseTrade> {
    // Field accessors for the twin layout.
    match codec.name {
        "time" => FieldCodec::new(
            "time",
            codec.kind,
            |t: &CoarseTrade| FieldValue::Int(t.time),
            |t, v| {
                if let FieldValue::Int(x) = v {
                    t.time = x;
                }
            },
        ),
        "price" => FieldCodec::new(
            "price",
            codec.kind,
            |t: &CoarseTrade| FieldValue::Float(t.price),
            |t, v| {
                t.price = match v {
                    FieldValue::Float(f) => f,
                    FieldValue::Int(i) => i as f64,
                }
            },
        ),
        _ => FieldCodec::new(
            "size",
            codec.kind,
            |t: &CoarseTrade| FieldValue::Int(t.size),
            |t, v| {
                if let FieldValue::Int(x) = v {
                    t.size = x;
                }
            },
        ),
    }
}

fn trades(n: i64) -> Vec<Trade> {
    (0..n)
        .map(|i| Trade {
            time: 637_000_000_000_000_000 + i * 5_000_000,
            price: (98_000 + (i % 25)) as f64 / 10_000.0,
            size: 10 + (i % 9) * 3,
        })
        .collect()
}

#[test]
fn test_roundtrip_across_many_blocks() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trades.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 256, &SeriesOptions::new())?;

    let data = trades(2_000);
    series.append(&data)?;
    assert!(series.block_count() > 1);

    let decoded = series.stream_all().read_all()?;
    assert_eq!(decoded, data);
    Ok(())
}

#[test]
fn test_blocks_decode_independently() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("independent.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 128, &SeriesOptions::new())?;
    let data = trades(300);
    series.append(&data)?;

    // Walk block by block; concatenation must equal the input and every
    // block must carry at least one record.
    let mut stream = series.stream_all();
    let mut total = 0;
    while let Some(items) = stream.next_block()? {
        assert!(!items.is_empty());
        assert_eq!(items[0], data[total]);
        total += items.len();
    }
    assert_eq!(total, data.len());
    Ok(())
}

#[test]
fn test_reopen_and_extend() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("extend.tf");
    let data = trades(600);
    {
        let mut series = DeltaBlockSeries::<Trade>::create(&path, 256, &SeriesOptions::new())?;
        series.append(&data[..400])?;
        series.close()?;
    }

    let mut series =
        DeltaBlockSeries::<Trade>::open(&path, OpenMode::ReadWrite, &SeriesOptions::new())?;
    series.append(&data[400..])?;

    let decoded = series.stream_all().read_all()?;
    assert_eq!(decoded, data);
    Ok(())
}

#[test]
fn test_append_refuses_regression_across_blocks() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("regress.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 256, &SeriesOptions::new())?;
    series.append(&trades(100))?;

    let early = Trade {
        time: 1,
        price: 9.8,
        size: 1,
    };
    match series.append(&[early]) {
        Err(TickfileError::IndexNonMonotonic(_)) => {}
        other => panic!("expected IndexNonMonotonic, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_read_from_mid_series() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seek.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 128, &SeriesOptions::new())?;
    let data = trades(1_000);
    series.append(&data)?;

    let from = data[617].time;
    let tail = series.read_from(from)?;
    assert_eq!(tail.len(), data.len() - 617);
    assert_eq!(tail[0], data[617]);
    assert_eq!(tail.last(), data.last());

    // A bound past the end yields nothing.
    let none = series.read_from(data.last().unwrap().time + 1)?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn test_changed_codec_parameters_are_refused() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.tf");
    {
        let mut series = DeltaBlockSeries::<Trade>::create(&path, 256, &SeriesOptions::new())?;
        series.append(&trades(10))?;
        series.close()?;
    }

    match DeltaBlockSeries::<CoarseTrade>::open(&path, OpenMode::Read, &SeriesOptions::new()) {
        Err(TickfileError::Format(msg)) => assert!(msg.contains("price")),
        other => panic!("expected Format, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_precision_loss_surfaces_through_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loss.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 256, &SeriesOptions::new()).unwrap();

    // 1/30000 is off the 1/10000 grid.
    let bad = Trade {
        time: 0,
        price: 1.0 / 3.0,
        size: 1,
    };
    match series.append(&[bad]) {
        Err(TickfileError::PrecisionLoss(_)) => {}
        other => panic!("expected PrecisionLoss, got {other:?}"),
    }
    assert_eq!(series.block_count(), 0);
}

#[test]
fn test_mid_batch_failure_writes_nothing() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("midloss.tf");
    // A small block size so the good prefix of the batch fills several
    // blocks before the bad item is reached.
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 64, &SeriesOptions::new())?;

    let mut batch = trades(40);
    let last_time = batch.last().unwrap().time;
    batch.push(Trade {
        time: last_time + 1,
        price: 1.0 / 3.0,
        size: 1,
    });

    match series.append(&batch) {
        Err(TickfileError::PrecisionLoss(_)) => {}
        other => panic!("expected PrecisionLoss, got {other:?}"),
    }
    // Nothing from the failed batch may be visible, not even the blocks
    // that encoded cleanly before the bad item.
    assert_eq!(series.block_count(), 0);
    assert!(series.stream_all().read_all()?.is_empty());

    // The series is still usable afterwards.
    series.append(&trades(40))?;
    assert_eq!(series.stream_all().read_all()?, trades(40));
    Ok(())
}

#[test]
fn test_truncate_blocks() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trunc.tf");
    let mut series = DeltaBlockSeries::<Trade>::create(&path, 128, &SeriesOptions::new())?;
    series.append(&trades(500))?;
    let blocks = series.block_count();
    assert!(blocks >= 4);

    series.truncate_blocks(2)?;
    assert_eq!(series.block_count(), 2);
    let remaining = series.stream_all().read_all()?;
    assert!(!remaining.is_empty());
    assert!(remaining.len() < 500);
    // What remains is still a prefix of the input.
    assert_eq!(remaining[..], trades(500)[..remaining.len()]);
    Ok(())
}

#[test]
fn test_tiny_block_size_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiny.tf");
    match DeltaBlockSeries::<Trade>::create(&path, 8, &SeriesOptions::new()) {
        Err(TickfileError::OutOfRange(_)) => {}
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

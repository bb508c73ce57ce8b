//! Lifecycle and addressing tests for uniform series files.

use tempfile::TempDir;
use tickfile::format::{FileHeader, FormatVersion};
use tickfile::record::{FieldShape, Record, RecordDescriptor};
use tickfile::signature::TypeSignature;
use tickfile::time::TICKS_PER_MINUTE;
use tickfile::{
    GrowthSchedule, OpenMode, Result, SeriesOptions, TickfileError, Timestamp, UniformSeriesFile,
};

// 2020-01-01T00:00:00 in ticks.
const T0_2020: i64 = 637_134_336_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
struct Sample {
    i: i32,
    value: f64,
}

impl Record for Sample {
    const SIZE: usize = 12;

    fn descriptor() -> RecordDescriptor<Self> {
        RecordDescriptor::new("tickfile_tests::Sample")
            .field(FieldShape::leaf("i32"))
            .field(FieldShape::leaf("f64"))
    }

    fn write_to(&self, dst: &mut [u8]) {
        dst[..4].copy_from_slice(&self.i.to_le_bytes());
        dst[4..12].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_from(src: &[u8]) -> Self {
        Self {
            i: i32::from_le_bytes(src[..4].try_into().unwrap()),
            value: f64::from_le_bytes(src[4..12].try_into().unwrap()),
        }
    }
}

fn samples(range: std::ops::Range<i32>) -> Vec<Sample> {
    range
        .map(|i| Sample {
            i,
            value: f64::from(i) * 0.5,
        })
        .collect()
}

#[test]
fn test_create_append_read_minute_series() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minute.tf");
    let t0 = Timestamp::from_ticks(T0_2020);

    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())?;
    series.append(t0, &samples(0..120))?;
    assert_eq!(series.count(), 120);

    // [00:30, 01:00) resolves to thirty records.
    let from = t0.add_ticks(30 * TICKS_PER_MINUTE);
    let to = t0.add_ticks(60 * TICKS_PER_MINUTE);
    let records = series.read(from, to)?.read_all()?;
    assert_eq!(records.len(), 30);
    assert_eq!(records[0].i, 30);
    assert_eq!(records[29].i, 59);
    Ok(())
}

#[test]
fn test_reopen_preserves_header_and_data() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reopen.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let opts = SeriesOptions::new().tag("eurusd bars");

    let mut series = UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &opts)?;
    series.append(t0, &samples(0..10))?;
    series.close()?;

    let mut reopened = UniformSeriesFile::<Sample>::open(&path, OpenMode::Read, &opts)?;
    assert_eq!(reopened.header().tag, "eurusd bars");
    assert_eq!(reopened.header().type_name, "tickfile_tests::Sample");
    assert_eq!(reopened.header().record_size, Sample::SIZE as u32);
    assert_eq!(reopened.header().version, FormatVersion::CURRENT);
    assert_eq!(reopened.first_timestamp(), t0);
    assert_eq!(reopened.item_span(), TICKS_PER_MINUTE);
    assert_eq!(reopened.count(), 10);

    let records = reopened.read_ordinals(0, 10)?;
    assert_eq!(records, samples(0..10));
    Ok(())
}

#[test]
fn test_ordinal_translation_roundtrip() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("translate.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())?;
    series.append(t0, &samples(0..50))?;

    for n in [0u64, 1, 17, 49] {
        assert_eq!(series.ordinal_of(series.timestamp_of(n))?, n);
    }
    assert_eq!(
        series.first_unavailable_timestamp().ticks(),
        T0_2020 + 50 * TICKS_PER_MINUTE
    );
    Ok(())
}

#[test]
fn test_misaligned_timestamp_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("misaligned.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())
            .unwrap();

    let off_grid = t0.add_ticks(TICKS_PER_MINUTE / 2);
    match series.ordinal_of(off_grid) {
        Err(TickfileError::IndexMisaligned(_)) => {}
        other => panic!("expected IndexMisaligned, got {other:?}"),
    }
}

#[test]
fn test_append_overwrites_tail_in_place() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("overwrite.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())?;
    series.append(t0, &samples(0..10))?;

    // Rewrite the last two records and extend by one in the same call.
    let patch = [
        Sample { i: 80, value: 8.0 },
        Sample { i: 81, value: 8.1 },
        Sample { i: 82, value: 8.2 },
    ];
    series.append(t0.add_ticks(8 * TICKS_PER_MINUTE), &patch)?;
    assert_eq!(series.count(), 11);

    let records = series.read_ordinals(7, 4)?;
    assert_eq!(records[0].i, 7);
    assert_eq!(records[1].i, 80);
    assert_eq!(records[3].i, 82);
    Ok(())
}

#[test]
fn test_append_past_first_unavailable_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gap.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())
            .unwrap();
    series.append(t0, &samples(0..5)).unwrap();

    let gap_start = t0.add_ticks(6 * TICKS_PER_MINUTE);
    match series.append(gap_start, &samples(6..7)) {
        Err(TickfileError::OutOfRange(_)) => {}
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

#[test]
fn test_range_is_clipped_and_rounded_up() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())?;
    series.append(t0, &samples(0..20))?;

    // A `from` before the epoch clips to the epoch; an off-grid `from`
    // rounds up to the next boundary.
    let before = Timestamp::from_ticks(T0_2020 - TICKS_PER_MINUTE);
    let all = series.read(before, t0.add_ticks(120 * TICKS_PER_MINUTE))?.read_all()?;
    assert_eq!(all.len(), 20);

    let off_grid = t0.add_ticks(3 * TICKS_PER_MINUTE + 1);
    let tail = series.read(off_grid, t0.add_ticks(6 * TICKS_PER_MINUTE))?.read_all()?;
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].i, 4);

    // Inverted and empty ranges yield nothing.
    let none = series
        .read(t0.add_ticks(5 * TICKS_PER_MINUTE), t0.add_ticks(5 * TICKS_PER_MINUTE))?
        .read_all()?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn test_truncate_is_idempotent_and_never_grows() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncate.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let mut series =
        UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &SeriesOptions::new())?;
    series.append(t0, &samples(0..30))?;

    series.truncate_records(12)?;
    assert_eq!(series.count(), 12);
    series.truncate_records(12)?;
    assert_eq!(series.count(), 12);

    match series.truncate_records(13) {
        Err(TickfileError::TruncateGrow { requested: 13, count: 12 }) => {}
        other => panic!("expected TruncateGrow, got {other:?}"),
    }

    series.truncate_before(t0.add_ticks(5 * TICKS_PER_MINUTE))?;
    assert_eq!(series.count(), 5);
    assert_eq!(
        series.first_unavailable_timestamp(),
        t0.add_ticks(5 * TICKS_PER_MINUTE)
    );
    Ok(())
}

#[test]
fn test_invalid_spans_are_rejected() {
    let dir = TempDir::new().unwrap();
    let t0 = Timestamp::from_ticks(T0_2020);
    let opts = SeriesOptions::new();

    for span in [0i64, -1, tickfile::time::TICKS_PER_DAY + 1, 7_000_000_000] {
        let path = dir.path().join(format!("bad-{span}.tf"));
        match UniformSeriesFile::<Sample>::create(&path, t0, span, &opts) {
            Err(TickfileError::OutOfRange(_)) => {}
            other => panic!("span {span}: expected OutOfRange, got {other:?}"),
        }
    }
}

#[test]
fn test_streamed_windows_follow_the_schedule() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("windows.tf");
    let t0 = Timestamp::from_ticks(T0_2020);
    let opts = SeriesOptions::new().buffer_schedule(GrowthSchedule::Growing {
        init_size: 64,
        grow_after: 2,
        large_size: 256,
    });
    let mut series = UniformSeriesFile::<Sample>::create(&path, t0, TICKS_PER_MINUTE, &opts)?;
    series.append(t0, &samples(0..500))?;

    let mut stream = series.read(t0, t0.add_ticks(500 * TICKS_PER_MINUTE))?;
    let mut window_lens = Vec::new();
    let mut next_expected = 0;
    while let Some(window) = stream.next_chunk()? {
        window_lens.push(window.len());
        for record in window {
            assert_eq!(record.i, next_expected);
            next_expected += 1;
        }
    }
    assert_eq!(next_expected, 500);
    assert_eq!(window_lens, vec![64, 64, 256, 116]);
    Ok(())
}

#[test]
fn test_legacy_v1_0_epoch_is_decoded() -> Result<()> {
    // Frame a 1.0 file by hand: the epoch travels as a binary DateTime
    // with the kind marker in the top bits.
    const LEGACY_TICKS: i64 = 637_012_224_000_000_000;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.tf");

    let mut subheader = Vec::new();
    subheader.extend_from_slice(&(Sample::SIZE as i32).to_le_bytes());
    TypeSignature::of::<Sample>().encode(&mut subheader);
    subheader.extend_from_slice(&TICKS_PER_MINUTE.to_le_bytes());
    let binary = LEGACY_TICKS | (1i64 << 62);
    subheader.extend_from_slice(&binary.to_le_bytes());

    let (_, image) = FileHeader::build(
        Sample::SIZE as u32,
        FormatVersion::V1_0,
        "legacy",
        "tickfile_tests::Sample",
        &subheader,
    )?;
    std::fs::write(&path, image).unwrap();

    let series = UniformSeriesFile::<Sample>::open(&path, OpenMode::Read, &SeriesOptions::new())?;
    assert_eq!(series.header().version, FormatVersion::V1_0);
    assert_eq!(series.first_timestamp().ticks(), LEGACY_TICKS);
    assert_eq!(series.count(), 0);
    Ok(())
}

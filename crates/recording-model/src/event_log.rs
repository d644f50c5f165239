//! Gaze event log loading.
//!
//! The tracker writes one `;`-separated row per scene frame. Current
//! recordings carry a header row with named columns; older ones have no
//! header and a fixed 9-column positional layout. Both are normalized into
//! [`GazeEvent`] values with the same shape.

use std::io::Read;
use std::path::Path;

use serde::Serialize;

use gazereel_common::clock::format_elapsed_ms;
use gazereel_common::error::{GazereelError, GazereelResult};

use crate::frame_index::FrameKey;

/// Named columns of the current layout (compared trimmed, case-insensitive).
pub const COL_FRAME_NUMBER: &str = "Frame Number";
pub const COL_TIME_STAMP: &str = "Time Stamp";
pub const COL_REGARD_X: &str = "Point Of Regard X";
pub const COL_REGARD_Y: &str = "Point Of Regard Y";

/// Column count of the legacy header-less layout:
/// frame, timestamp, regard x, regard y, then five sensor columns.
pub const POSITIONAL_COLUMNS: usize = 9;

/// Value substituted for "not a number" markers in numeric columns.
pub const MISSING_VALUE: f64 = -1.0;

const NAN_MARKERS: [&str; 4] = ["-nan(ind)", "nan(ind)", "-nan", "nan"];

/// One row of the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GazeEvent {
    pub frame_key: FrameKey,

    /// Tracker clock in milliseconds; only meaningful as a delta.
    pub timestamp_ms: i64,

    /// Point of regard as a ratio of the frame width, or -1 when unknown.
    pub regard_x: f64,
    /// Point of regard as a ratio of the frame height, or -1 when unknown.
    pub regard_y: f64,

    /// `HH:MM:SS:mmm` label derived from `timestamp_ms`.
    pub elapsed: String,
}

impl GazeEvent {
    pub fn new(frame_key: FrameKey, timestamp_ms: i64, regard_x: f64, regard_y: f64) -> Self {
        Self {
            frame_key,
            timestamp_ms,
            regard_x,
            regard_y,
            elapsed: format_elapsed_ms(timestamp_ms),
        }
    }

    /// Whether the tracker reported a gaze point for this row.
    pub fn has_gaze(&self) -> bool {
        self.regard_x >= 0.0 && self.regard_y >= 0.0
    }
}

/// Layout of the event log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSchema {
    /// Header row with named columns.
    Named,
    /// No header; fixed positional columns.
    Positional,
}

/// Caller's expectation about the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaHint {
    /// Detect from the first row.
    #[default]
    Auto,
    Named,
    Positional,
}

/// What to do with a row whose values cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRowPolicy {
    #[default]
    Abort,
    /// Log a warning and drop the row.
    Skip,
}

/// Inclusive-low, exclusive-high frame key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRange {
    lo: FrameKey,
    hi: FrameKey,
}

impl FrameRange {
    /// Create `[lo, hi)`; fails when the range is empty or inverted.
    pub fn new(lo: FrameKey, hi: FrameKey) -> GazereelResult<Self> {
        if lo >= hi {
            return Err(GazereelError::range(format!(
                "frame range [{lo}, {hi}) is empty or inverted"
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> FrameKey {
        self.lo
    }

    pub fn hi(&self) -> FrameKey {
        self.hi
    }

    pub fn contains(&self, key: FrameKey) -> bool {
        key >= self.lo && key < self.hi
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// Column positions resolved by schema detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    frame: usize,
    timestamp: usize,
    regard_x: usize,
    regard_y: usize,
}

impl ColumnMap {
    const POSITIONAL: ColumnMap = ColumnMap {
        frame: 0,
        timestamp: 1,
        regard_x: 2,
        regard_y: 3,
    };
}

/// Loaded and normalized event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    schema: ColumnSchema,
    events: Vec<GazeEvent>,
    skipped_rows: usize,
}

impl EventLog {
    /// Load the event log at `path`.
    pub fn load(
        path: &Path,
        hint: SchemaHint,
        on_malformed: MalformedRowPolicy,
    ) -> GazereelResult<Self> {
        if !path.is_file() {
            return Err(GazereelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path)?;
        let log = Self::from_reader(file, hint, on_malformed).map_err(|e| match e {
            GazereelError::Schema { message } => {
                GazereelError::schema(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;

        tracing::debug!(
            path = %path.display(),
            schema = ?log.schema,
            rows = log.events.len(),
            skipped = log.skipped_rows,
            "Event log loaded"
        );
        Ok(log)
    }

    /// Parse an event log from any reader.
    pub fn from_reader<R: Read>(
        reader: R,
        hint: SchemaHint,
        on_malformed: MalformedRowPolicy,
    ) -> GazereelResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = reader.records();
        let first = match records.next() {
            Some(record) => record.map_err(csv_error)?,
            None => return Err(GazereelError::schema("event log is empty")),
        };

        let (schema, columns) = detect_schema(&first, hint)?;
        let mut log = Self {
            schema,
            events: Vec::new(),
            skipped_rows: 0,
        };

        let leading = match schema {
            ColumnSchema::Named => None,
            ColumnSchema::Positional => Some(Ok(first)),
        };
        for record in leading.into_iter().chain(records) {
            let record = record.map_err(csv_error)?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            match parse_row(&record, columns) {
                Ok(event) => log.events.push(event),
                Err(reason) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    match on_malformed {
                        MalformedRowPolicy::Abort => {
                            return Err(GazereelError::schema(format!("line {line}: {reason}")));
                        }
                        MalformedRowPolicy::Skip => {
                            tracing::warn!(line, reason = %reason, "Skipping malformed event row");
                            log.skipped_rows += 1;
                        }
                    }
                }
            }
        }

        if log.events.is_empty() {
            return Err(GazereelError::schema("event log contains no data rows"));
        }
        Ok(log)
    }

    /// Keep only rows whose frame key lies in `range`. Returns the number removed.
    pub fn retain_range(&mut self, range: &FrameRange) -> usize {
        let before = self.events.len();
        self.events.retain(|event| range.contains(event.frame_key));
        before - self.events.len()
    }

    pub fn schema(&self) -> ColumnSchema {
        self.schema
    }

    pub fn events(&self) -> &[GazeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<GazeEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Rows dropped under [`MalformedRowPolicy::Skip`].
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Smallest and largest frame key in the log.
    pub fn frame_key_span(&self) -> Option<(FrameKey, FrameKey)> {
        let min = self.events.iter().map(|e| e.frame_key).min()?;
        let max = self.events.iter().map(|e| e.frame_key).max()?;
        Some((min, max))
    }
}

fn detect_schema(
    first: &csv::StringRecord,
    hint: SchemaHint,
) -> GazereelResult<(ColumnSchema, ColumnMap)> {
    let named = named_columns(first);
    let positional_ok =
        first.len() >= POSITIONAL_COLUMNS && parse_integer(first.get(0).unwrap_or("")).is_ok();

    match (hint, named) {
        (SchemaHint::Auto | SchemaHint::Named, Ok(columns)) => Ok((ColumnSchema::Named, columns)),
        (SchemaHint::Auto, Err(_)) if positional_ok => {
            Ok((ColumnSchema::Positional, ColumnMap::POSITIONAL))
        }
        (SchemaHint::Positional, _) if positional_ok => {
            Ok((ColumnSchema::Positional, ColumnMap::POSITIONAL))
        }
        (SchemaHint::Positional, _) => Err(GazereelError::schema(format!(
            "expected {POSITIONAL_COLUMNS} unnamed columns starting with a frame number, found {} fields",
            first.len()
        ))),
        (_, Err(missing)) => Err(GazereelError::schema(format!(
            "missing columns {} and the file does not match the {POSITIONAL_COLUMNS}-column legacy layout",
            missing.join(", ")
        ))),
    }
}

fn named_columns(header: &csv::StringRecord) -> Result<ColumnMap, Vec<&'static str>> {
    let find = |name: &str| {
        header
            .iter()
            .position(|field| field.trim().eq_ignore_ascii_case(name))
    };

    let frame = find(COL_FRAME_NUMBER);
    let timestamp = find(COL_TIME_STAMP);
    let regard_x = find(COL_REGARD_X);
    let regard_y = find(COL_REGARD_Y);

    match (frame, timestamp, regard_x, regard_y) {
        (Some(frame), Some(timestamp), Some(regard_x), Some(regard_y)) => Ok(ColumnMap {
            frame,
            timestamp,
            regard_x,
            regard_y,
        }),
        _ => {
            let missing = [
                (COL_FRAME_NUMBER, frame),
                (COL_TIME_STAMP, timestamp),
                (COL_REGARD_X, regard_x),
                (COL_REGARD_Y, regard_y),
            ]
            .into_iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name)
            .collect();
            Err(missing)
        }
    }
}

fn parse_row(record: &csv::StringRecord, columns: ColumnMap) -> Result<GazeEvent, String> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .ok_or_else(|| format!("missing {name} value ({} fields)", record.len()))
    };

    let frame = parse_integer(field(columns.frame, COL_FRAME_NUMBER)?)
        .map_err(|e| format!("{COL_FRAME_NUMBER}: {e}"))?;
    let frame_key = FrameKey::try_from(frame)
        .map_err(|_| format!("{COL_FRAME_NUMBER}: negative frame number {frame}"))?;
    let timestamp_ms = parse_integer(field(columns.timestamp, COL_TIME_STAMP)?)
        .map_err(|e| format!("{COL_TIME_STAMP}: {e}"))?;
    let regard_x = parse_measurement(field(columns.regard_x, COL_REGARD_X)?)
        .map_err(|e| format!("{COL_REGARD_X}: {e}"))?;
    let regard_y = parse_measurement(field(columns.regard_y, COL_REGARD_Y)?)
        .map_err(|e| format!("{COL_REGARD_Y}: {e}"))?;

    Ok(GazeEvent::new(frame_key, timestamp_ms, regard_x, regard_y))
}

/// Integer column; decimal text is rounded to the nearest integer.
fn parse_integer(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.round() as i64),
        _ => Err(format!("'{raw}' is not a number")),
    }
}

/// Float column where "not a number" markers mean [`MISSING_VALUE`].
fn parse_measurement(raw: &str) -> Result<f64, String> {
    let raw = raw.trim();
    if NAN_MARKERS.iter().any(|m| raw.eq_ignore_ascii_case(m)) {
        return Ok(MISSING_VALUE);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_nan() => Ok(MISSING_VALUE),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("'{raw}' is not a number")),
    }
}

fn csv_error(err: csv::Error) -> GazereelError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => GazereelError::Io(io),
        other => GazereelError::schema(format!("unreadable event log: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMED: &str = "\
Frame Number ; Time Stamp ; Point Of Regard X ; Point Of Regard Y ; Pupil ;
1 ; 1000 ; 0.25 ; 0.5 ; 3.1 ;
2 ; 1040 ; -nan(ind) ; -nan(ind) ; 3.2 ;
3 ; 1080 ; 0.75 ; 0.125 ; 3.3 ;
";

    const POSITIONAL: &str = "\
1;1000;0.25;0.5;0;0;0;0;0
2;1040;-nan(ind);-nan(ind);0;0;0;0;0
3;1080;0.75;0.125;0;0;0;0;0
";

    fn load(text: &str) -> GazereelResult<EventLog> {
        EventLog::from_reader(text.as_bytes(), SchemaHint::Auto, MalformedRowPolicy::Abort)
    }

    #[test]
    fn test_named_schema_is_detected() {
        let log = load(NAMED).unwrap();
        assert_eq!(log.schema(), ColumnSchema::Named);
        assert_eq!(log.len(), 3);
        let first = &log.events()[0];
        assert_eq!(first.frame_key, 1);
        assert_eq!(first.timestamp_ms, 1000);
        assert!((first.regard_x - 0.25).abs() < 1e-12);
        assert_eq!(first.elapsed, "00:00:01:000");
    }

    #[test]
    fn test_positional_schema_matches_named() {
        let named = load(NAMED).unwrap();
        let positional = load(POSITIONAL).unwrap();
        assert_eq!(positional.schema(), ColumnSchema::Positional);
        assert_eq!(named.events(), positional.events());
    }

    #[test]
    fn test_nan_markers_become_missing_value() {
        let log = load(NAMED).unwrap();
        let second = &log.events()[1];
        assert_eq!(second.regard_x, MISSING_VALUE);
        assert_eq!(second.regard_y, MISSING_VALUE);
        assert!(!second.has_gaze());
        assert!(log.events()[0].has_gaze());
    }

    #[test]
    fn test_named_columns_may_be_reordered() {
        let text = "Point Of Regard Y;Time Stamp;Frame Number;Point Of Regard X\n0.5;20;9;0.1\n";
        let log = load(text).unwrap();
        let event = &log.events()[0];
        assert_eq!(event.frame_key, 9);
        assert_eq!(event.timestamp_ms, 20);
        assert!((event.regard_y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_layout_is_schema_error() {
        let err = load("a;b;c\n1;2;3\n").unwrap_err();
        match err {
            GazereelError::Schema { message } => assert!(message.contains("Frame Number")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_named_hint_rejects_positional_file() {
        let err = EventLog::from_reader(
            POSITIONAL.as_bytes(),
            SchemaHint::Named,
            MalformedRowPolicy::Abort,
        )
        .unwrap_err();
        assert!(matches!(err, GazereelError::Schema { .. }));
    }

    #[test]
    fn test_positional_hint_rejects_short_rows() {
        let err = EventLog::from_reader(
            "1;2;3\n".as_bytes(),
            SchemaHint::Positional,
            MalformedRowPolicy::Abort,
        )
        .unwrap_err();
        assert!(matches!(err, GazereelError::Schema { .. }));
    }

    #[test]
    fn test_malformed_row_aborts_or_skips() {
        let text = "Frame Number;Time Stamp;Point Of Regard X;Point Of Regard Y\n1;0;0.1;0.1\n2;oops;0.1;0.1\n3;80;0.1;0.1\n";

        let err = load(text).unwrap_err();
        match err {
            GazereelError::Schema { message } => assert!(message.contains("line 3")),
            other => panic!("unexpected error: {other:?}"),
        }

        let log =
            EventLog::from_reader(text.as_bytes(), SchemaHint::Auto, MalformedRowPolicy::Skip)
                .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.skipped_rows(), 1);
    }

    #[test]
    fn test_empty_log_is_schema_error() {
        assert!(matches!(load(""), Err(GazereelError::Schema { .. })));
        assert!(matches!(
            load("Frame Number;Time Stamp;Point Of Regard X;Point Of Regard Y\n"),
            Err(GazereelError::Schema { .. })
        ));
    }

    #[test]
    fn test_decimal_values_are_accepted() {
        let log = load("1.0;40.4;0.5;0.5;0;0;0;0;0\n").unwrap();
        assert_eq!(log.events()[0].frame_key, 1);
        assert_eq!(log.events()[0].timestamp_ms, 40);
    }

    #[test]
    fn test_frame_range_validation() {
        assert!(FrameRange::new(300, 600).is_ok());
        assert!(matches!(
            FrameRange::new(600, 300),
            Err(GazereelError::Range { .. })
        ));
        assert!(matches!(
            FrameRange::new(5, 5),
            Err(GazereelError::Range { .. })
        ));
    }

    #[test]
    fn test_retain_range_is_half_open() {
        let mut text = String::from("Frame Number;Time Stamp;Point Of Regard X;Point Of Regard Y\n");
        for key in 250..650 {
            text.push_str(&format!("{key};{};0.5;0.5\n", key * 40));
        }
        let mut log = load(&text).unwrap();
        let removed = log.retain_range(&FrameRange::new(300, 600).unwrap());
        assert_eq!(removed, 100);
        assert_eq!(log.len(), 300);
        assert_eq!(log.frame_key_span(), Some((300, 599)));
    }

    proptest::proptest! {
        #[test]
        fn prop_retain_range_keeps_exactly_keys_in_range(
            keys in proptest::collection::vec(0u64..1000, 1..200),
            lo in 0u64..1000,
            width in 1u64..500,
        ) {
            let mut text = String::new();
            for (i, key) in keys.iter().enumerate() {
                text.push_str(&format!("{key};{};0.5;0.5;0;0;0;0;0\n", i * 40));
            }
            let mut log = load(&text).unwrap();
            let range = FrameRange::new(lo, lo + width).unwrap();
            log.retain_range(&range);

            let expected = keys.iter().filter(|k| **k >= lo && **k < lo + width).count();
            proptest::prop_assert_eq!(log.len(), expected);
            proptest::prop_assert!(log.events().iter().all(|e| range.contains(e.frame_key)));
        }
    }

    #[test]
    fn test_negative_frame_number_is_rejected() {
        let err = load("-1;0;0.5;0.5;0;0;0;0;0\n").unwrap_err();
        assert!(matches!(err, GazereelError::Schema { .. }));
    }
}

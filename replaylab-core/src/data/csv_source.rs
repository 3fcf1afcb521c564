//! Local candle file: a CSV with `timestamp,Open,High,Low,Close,Volume`
//! columns, parsed once into an ascending, de-duplicated series.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::Candle;

#[derive(Debug, Error)]
pub enum CsvSourceError {
    #[error("failed to open candle file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("candle file has no '{0}' column")]
    MissingColumn(&'static str),
}

/// Parsed candles plus what was thrown away on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvLoadReport {
    pub candles: Vec<Candle>,
    /// Rows without a timestamp or open price.
    pub missing: usize,
    /// Rows with unparseable values or a broken OHLC range.
    pub malformed: usize,
    /// Later rows sharing a timestamp with an earlier one.
    pub duplicates: usize,
}

impl CsvLoadReport {
    pub fn skipped(&self) -> usize {
        self.missing + self.malformed + self.duplicates
    }
}

#[derive(Debug, Clone)]
pub struct LocalCandleFile {
    path: PathBuf,
}

impl LocalCandleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Candle>, CsvSourceError> {
        Ok(self.load_report()?.candles)
    }

    pub fn load_report(&self) -> Result<CsvLoadReport, CsvSourceError> {
        let file = File::open(&self.path).map_err(|source| CsvSourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        let report = parse_candles(file)?;
        info!(
            path = %self.path.display(),
            candles = report.candles.len(),
            "candle file loaded"
        );
        Ok(report)
    }
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, CsvSourceError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require =
            |name: &'static str| find(name).ok_or(CsvSourceError::MissingColumn(name));
        Ok(Self {
            timestamp: require("timestamp")?,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
        })
    }
}

enum Row {
    Candle(Candle),
    Missing,
    Malformed,
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Row {
    let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());

    let (Some(ts), Some(open)) = (field(cols.timestamp), field(cols.open)) else {
        return Row::Missing;
    };

    let number = |s: Option<&str>| s.and_then(|s| s.parse::<f64>().ok());
    let volume = match cols.volume.and_then(field) {
        Some(v) => number(Some(v)),
        None => Some(0.0),
    };

    let candle = match (
        parse_timestamp(ts),
        number(Some(open)),
        number(field(cols.high)),
        number(field(cols.low)),
        number(field(cols.close)),
        volume,
    ) {
        (Some(time), Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
            Candle::new(time, open, high, low, close, volume)
        }
        _ => return Row::Malformed,
    };

    if candle.is_sane() {
        Row::Candle(candle)
    } else {
        Row::Malformed
    }
}

/// Parse CSV text into candles sorted by time. The first row for a timestamp wins.
pub fn parse_candles<R: Read>(reader: R) -> Result<CsvLoadReport, CsvSourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let cols = Columns::from_headers(rdr.headers()?)?;

    let mut report = CsvLoadReport::default();
    for result in rdr.records() {
        let Ok(record) = result else {
            report.malformed += 1;
            continue;
        };
        match parse_row(&record, &cols) {
            Row::Candle(c) => report.candles.push(c),
            Row::Missing => report.missing += 1,
            Row::Malformed => report.malformed += 1,
        }
    }

    // Stable sort keeps file order among equal timestamps.
    report.candles.sort_by_key(|c| c.time);
    let before = report.candles.len();
    report.candles.dedup_by_key(|c| c.time);
    report.duplicates = before - report.candles.len();

    if report.skipped() > 0 {
        warn!(
            missing = report.missing,
            malformed = report.malformed,
            duplicates = report.duplicates,
            "skipped candle rows"
        );
    }
    Ok(report)
}

/// Write candles in the same column layout `parse_candles` reads.
pub fn write_candles<W: Write>(writer: W, candles: &[Candle]) -> Result<(), CsvSourceError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["timestamp", "Open", "High", "Low", "Close", "Volume"])?;
    for c in candles {
        wtr.write_record([
            c.time.to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Unix seconds from epoch seconds, epoch milliseconds, RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (all UTC).
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(epoch_seconds(n));
    }
    if let Ok(f) = value.parse::<f64>() {
        return f.is_finite().then(|| epoch_seconds(f.trunc() as i64));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
    }
    None
}

/// Values past year ~5138 in seconds are taken as milliseconds.
fn epoch_seconds(n: i64) -> i64 {
    if n.abs() >= 100_000_000_000 {
        n / 1000
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("1700000000000"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("2024-01-02T00:00:00Z"), Some(1_704_153_600));
        assert_eq!(parse_timestamp("2024-01-02 00:00:00"), Some(1_704_153_600));
        assert_eq!(parse_timestamp("2024-01-02"), Some(1_704_153_600));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn sorts_dedupes_and_skips() {
        let data = "\
timestamp,Open,High,Low,Close,Volume
1700003600,1.2,1.3,1.1,1.25,10
1700000000,1.0,1.1,0.9,1.05,5
,1.0,1.1,0.9,1.05,5
1700007200,,1.1,0.9,1.05,5
1700010800,abc,1.1,0.9,1.05,5
1700014400,1.0,0.5,0.9,1.05,5
1700003600,9.0,9.5,8.5,9.1,1
";
        let report = parse_candles(data.as_bytes()).unwrap();
        assert_eq!(report.candles.len(), 2);
        assert_eq!(report.candles[0].time, 1_700_000_000);
        assert_eq!(report.candles[1].open, 1.2);
        assert_eq!(report.missing, 2);
        assert_eq!(report.malformed, 2);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn volume_column_optional() {
        let data = "timestamp,open,high,low,close\n2024-01-02,1,2,0.5,1.5\n";
        let report = parse_candles(data.as_bytes()).unwrap();
        assert_eq!(report.candles[0].volume, 0.0);
    }

    #[test]
    fn missing_required_column() {
        let data = "timestamp,Open,High,Close\n";
        assert!(matches!(
            parse_candles(data.as_bytes()),
            Err(CsvSourceError::MissingColumn("low"))
        ));
    }

    #[test]
    fn written_file_reads_back() {
        let candles = vec![
            Candle::new(1_700_000_000, 1.1, 1.2, 1.0, 1.15, 42.0),
            Candle::new(1_700_000_060, 1.15, 1.25, 1.1, 1.2, 7.5),
        ];
        let mut buf = Vec::new();
        write_candles(&mut buf, &candles).unwrap();
        let report = parse_candles(buf.as_slice()).unwrap();
        assert_eq!(report.candles, candles);
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn missing_file_is_open_error() {
        let source = LocalCandleFile::new("/nonexistent/candles.csv");
        assert!(matches!(source.load(), Err(CsvSourceError::Open { .. })));
    }
}

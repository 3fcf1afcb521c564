//! Candle aggregation: roll base-resolution candles up into a coarser timeframe.
//!
//! Chunks are fixed-size and taken in index order, so a gap in the base data
//! shifts bucket boundaries rather than producing empty buckets.

use crate::domain::{Candle, Timeframe, TimeframeError};

/// Aggregate `base` (at `base_timeframe`) into `target` candles.
///
/// Identity when the timeframes match.
pub fn aggregate(
    base: &[Candle],
    base_timeframe: Timeframe,
    target: Timeframe,
) -> Result<Vec<Candle>, TimeframeError> {
    let n = target
        .ratio_to(base_timeframe)
        .ok_or(TimeframeError::NotAggregatable {
            base: base_timeframe,
            target,
        })?;
    Ok(aggregate_by(base, n))
}

/// Roll up every `n` consecutive candles into one. The last chunk may be shorter.
pub fn aggregate_by(base: &[Candle], n: usize) -> Vec<Candle> {
    if n <= 1 {
        return base.to_vec();
    }
    base.chunks(n).filter_map(merge).collect()
}

fn merge(chunk: &[Candle]) -> Option<Candle> {
    let first = chunk.first()?;
    let last = chunk.last()?;
    let (high, low, volume) = chunk.iter().fold(
        (f64::NEG_INFINITY, f64::INFINITY, 0.0),
        |(high, low, volume), c| (high.max(c.high), low.min(c.low), volume + c.volume),
    );
    Some(Candle {
        time: first.time,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 1.1000 + i as f64 * 0.0010;
                Candle::new(
                    1_700_000_000 + i as i64 * 3600,
                    base,
                    base + 0.0020,
                    base - 0.0015,
                    base + 0.0005,
                    100.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn identity_when_timeframes_match() {
        let base = hourly(5);
        let out = aggregate(&base, Timeframe::H1, Timeframe::H1).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn four_hour_rollup() {
        let base = hourly(10);
        let out = aggregate(&base, Timeframe::H1, Timeframe::H4).unwrap();
        assert_eq!(out.len(), 3);

        let first = &out[0];
        assert_eq!(first.time, base[0].time);
        assert_eq!(first.open, base[0].open);
        assert_eq!(first.close, base[3].close);
        assert_eq!(first.high, base[3].high);
        assert_eq!(first.low, base[0].low);
        assert_eq!(first.volume, 100.0 + 101.0 + 102.0 + 103.0);

        // Trailing partial chunk of two candles.
        let last = &out[2];
        assert_eq!(last.time, base[8].time);
        assert_eq!(last.close, base[9].close);
        assert_eq!(last.volume, 108.0 + 109.0);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(aggregate(&[], Timeframe::H1, Timeframe::D1).unwrap().is_empty());
    }

    #[test]
    fn finer_target_is_rejected() {
        let err = aggregate(&hourly(3), Timeframe::H1, Timeframe::M15).unwrap_err();
        assert_eq!(
            err,
            TimeframeError::NotAggregatable {
                base: Timeframe::H1,
                target: Timeframe::M15
            }
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let base = hourly(8);
        let before = base.clone();
        let _ = aggregate_by(&base, 4);
        assert_eq!(base, before);
    }
}

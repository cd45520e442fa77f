//! Conversions between wall-clock instants and the `{seconds, nanos}` pairs
//! carried on the wire.
//!
//! Timestamps use a floored split, so the nanosecond part of an instant
//! before the epoch is always non-negative. Durations use a truncating
//! split: the nanosecond part keeps the sign of the millisecond remainder,
//! which means `-1 ms` encodes as `{0, -1_000_000}` and `-1000 ms` as
//! `{-1, 0}`. Both representations decode back to the exact millisecond
//! value; sub-millisecond precision is not modelled.

use bincode::{Decode, Encode};
use chrono::{DateTime, TimeZone, Utc};

const MILLIS_PER_SECOND: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// Wall-clock instant expressed as seconds and nanoseconds since the epoch.
///
/// Either field may be absent on the wire. An absent field is distinct from
/// zero and makes the whole value undecodable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub seconds: Option<i64>,
    /// Nanosecond offset within `seconds`, always in `0..1_000_000_000`.
    pub nanos: Option<i32>,
}

impl Timestamp {
    /// Build a timestamp with both fields present.
    #[must_use]
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self {
            seconds: Some(seconds),
            nanos: Some(nanos),
        }
    }

    /// Encode a millisecond offset from the epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        let seconds = millis.div_euclid(MILLIS_PER_SECOND);
        let remainder = millis.rem_euclid(MILLIS_PER_SECOND);
        Self::new(seconds, remainder_to_nanos(remainder))
    }

    /// Encode a wall-clock instant.
    #[must_use]
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self::from_millis(instant.timestamp_millis())
    }

    /// Stamp the current wall-clock time.
    #[must_use]
    pub fn now() -> Self { Self::from_datetime(Utc::now()) }

    /// Decode into milliseconds since the epoch.
    ///
    /// Returns `None` when either field is absent or the value overflows.
    #[must_use]
    pub fn to_millis(&self) -> Option<i64> { compose_millis(self.seconds?, self.nanos?) }

    /// Decode into a wall-clock instant.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        self.to_millis()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self { Self::from_datetime(value) }
}

/// Signed span of time expressed as seconds and nanoseconds.
///
/// The two components share the sign of the original millisecond count,
/// except that a zero component carries no sign at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct WireDuration {
    /// Whole seconds, truncated towards zero.
    pub seconds: Option<i64>,
    /// Sub-second remainder in nanoseconds, signed like the remainder.
    pub nanos: Option<i32>,
}

impl WireDuration {
    /// Build a duration with both fields present.
    #[must_use]
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self {
            seconds: Some(seconds),
            nanos: Some(nanos),
        }
    }

    /// Encode a signed millisecond count using a truncating split.
    #[expect(
        clippy::integer_division,
        clippy::integer_division_remainder_used,
        reason = "durations split with truncating division so the remainder keeps its sign"
    )]
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        let seconds = millis / MILLIS_PER_SECOND;
        let remainder = millis % MILLIS_PER_SECOND;
        Self::new(seconds, remainder_to_nanos(remainder))
    }

    /// Encode the span between two instants (`end - start`).
    #[must_use]
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::from_millis(
            end.timestamp_millis()
                .saturating_sub(start.timestamp_millis()),
        )
    }

    /// Encode a non-negative standard duration, saturating at `i64::MAX` ms.
    #[must_use]
    pub fn from_std(duration: std::time::Duration) -> Self {
        Self::from_millis(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }

    /// Decode into a signed millisecond count.
    ///
    /// Returns `None` when either field is absent or the value overflows.
    #[must_use]
    pub fn to_millis(&self) -> Option<i64> { compose_millis(self.seconds?, self.nanos?) }

    /// Decode into a standard duration; negative spans clamp to zero.
    #[must_use]
    pub fn to_std(&self) -> Option<std::time::Duration> {
        self.to_millis()
            .map(|millis| std::time::Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

impl From<std::time::Duration> for WireDuration {
    fn from(value: std::time::Duration) -> Self { Self::from_std(value) }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "remainder is bounded by ±999 so the product fits in i32"
)]
const fn remainder_to_nanos(remainder: i64) -> i32 { (remainder * NANOS_PER_MILLI) as i32 }

#[expect(
    clippy::integer_division,
    reason = "sub-millisecond precision is discarded"
)]
fn compose_millis(seconds: i64, nanos: i32) -> Option<i64> {
    seconds
        .checked_mul(MILLIS_PER_SECOND)?
        .checked_add(i64::from(nanos) / NANOS_PER_MILLI)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(-1, 0, -1_000_000)]
    #[case(-1_000, -1, 0)]
    #[case(1_000, 1, 0)]
    #[case(1_500, 1, 500_000_000)]
    #[case(-1_500, -1, -500_000_000)]
    #[case(0, 0, 0)]
    fn duration_split_truncates(#[case] millis: i64, #[case] seconds: i64, #[case] nanos: i32) {
        assert_eq!(
            WireDuration::from_millis(millis),
            WireDuration::new(seconds, nanos)
        );
    }

    #[rstest]
    #[case(-1, -1, 999_000_000)]
    #[case(-1_000, -1, 0)]
    #[case(1_234, 1, 234_000_000)]
    fn timestamp_split_floors(#[case] millis: i64, #[case] seconds: i64, #[case] nanos: i32) {
        assert_eq!(Timestamp::from_millis(millis), Timestamp::new(seconds, nanos));
    }

    #[rstest]
    fn missing_fields_are_absent_not_zero() {
        let only_seconds = Timestamp {
            seconds: Some(10),
            nanos: None,
        };
        let only_nanos = WireDuration {
            seconds: None,
            nanos: Some(0),
        };
        assert_eq!(only_seconds.to_millis(), None);
        assert_eq!(only_nanos.to_millis(), None);
        assert_eq!(Timestamp::new(0, 0).to_millis(), Some(0));
    }

    #[rstest]
    fn overflowing_seconds_decode_to_none() {
        assert_eq!(Timestamp::new(i64::MAX, 0).to_millis(), None);
    }

    #[rstest]
    fn between_measures_end_minus_start() {
        let start = Utc.timestamp_millis_opt(10_000).single().expect("valid instant");
        let end = Utc.timestamp_millis_opt(8_999).single().expect("valid instant");
        assert_eq!(
            WireDuration::between(start, end),
            WireDuration::new(-1, -1_000_000)
        );
        assert_eq!(
            WireDuration::between(end, start),
            WireDuration::new(1, 1_000_000)
        );
    }

    #[rstest]
    fn negative_durations_clamp_when_converted_to_std() {
        assert_eq!(
            WireDuration::from_millis(-5).to_std(),
            Some(std::time::Duration::ZERO)
        );
        assert_eq!(
            WireDuration::from_millis(2_500).to_std(),
            Some(std::time::Duration::from_millis(2_500))
        );
    }

    proptest! {
        #[test]
        fn timestamp_round_trips(millis in -8_000_000_000_000_000i64..8_000_000_000_000_000i64) {
            let encoded = Timestamp::from_millis(millis);
            prop_assert_eq!(encoded.to_millis(), Some(millis));
            let nanos = encoded.nanos.unwrap_or(-1);
            prop_assert!((0..1_000_000_000).contains(&nanos));
            let instant = encoded.to_datetime().expect("instant within chrono range");
            prop_assert_eq!(Timestamp::from_datetime(instant), encoded);
        }

        #[test]
        fn duration_round_trips(millis in i64::MIN / 2..i64::MAX / 2) {
            let encoded = WireDuration::from_millis(millis);
            prop_assert_eq!(encoded.to_millis(), Some(millis));
            let seconds = encoded.seconds.unwrap_or_default();
            let nanos = encoded.nanos.unwrap_or_default();
            prop_assert!(seconds == 0 || nanos == 0 || seconds.signum() == i64::from(nanos.signum()));
        }
    }
}

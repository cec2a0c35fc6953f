//! Exact time arithmetic and interval algebra.
//!
//! All time values carried by the engine are exact decimals (seconds),
//! so that repeated offset and rate computations never accumulate
//! floating-point drift. MFCC and DTW internals stay in `f64`; the
//! boundary between the two worlds is the frame index.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised by interval operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    /// Interval begin is negative.
    #[error("interval begin is negative")]
    NegativeBegin,

    /// Interval begin is after its end.
    #[error("interval begin is after its end")]
    BeginAfterEnd,

    /// A shrink/enlarge quantity was not positive.
    #[error("quantity is not positive")]
    QuantityNotPositive,

    /// A shrink quantity exceeded the interval length.
    #[error("quantity is greater than the interval length")]
    QuantityExceedsLength,

    /// A move target point lies before the interval begin.
    #[error("point is before the interval begin")]
    PointBeforeBegin,

    /// A move target point lies after the interval end.
    #[error("point is after the interval end")]
    PointAfterEnd,
}

/// Result type for interval operations.
pub type TimingResult<T> = Result<T, TimingError>;

/// A time value in seconds, with exact decimal arithmetic.
///
/// Millisecond resolution is guaranteed; intermediate results keep
/// whatever precision the arithmetic produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeValue(Decimal);

impl TimeValue {
    /// Zero seconds.
    pub const ZERO: TimeValue = TimeValue(Decimal::ZERO);

    /// Wrap a raw decimal number of seconds.
    pub fn new(seconds: Decimal) -> Self {
        Self(seconds)
    }

    /// Build from a whole number of milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(Decimal::new(millis, 3))
    }

    /// Build from an `f64` number of seconds, rounded to microseconds.
    ///
    /// Returns `None` for non-finite input.
    pub fn from_secs_f64(seconds: f64) -> Option<Self> {
        rust_decimal::prelude::FromPrimitive::from_f64(seconds)
            .map(|d: Decimal| Self(d.round_dp(6)))
    }

    /// The inner decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion to `f64` seconds.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Whether this value is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// The smallest multiple of this value greater than or equal to
    /// `other`. If `other` is zero, returns this value unchanged.
    pub fn geq_multiple(&self, other: TimeValue) -> TimeValue {
        if other == TimeValue::ZERO || self.0 == Decimal::ZERO {
            return *self;
        }
        TimeValue((other.0 / self.0).ceil() * self.0)
    }

    /// Number of whole frames of duration `shift` contained in this
    /// value (floor). Negative values yield zero.
    pub fn to_frames(&self, shift: TimeValue) -> usize {
        if shift.0 <= Decimal::ZERO || self.0 <= Decimal::ZERO {
            return 0;
        }
        (self.0 / shift.0).floor().to_usize().unwrap_or(0)
    }

    /// The time value of `frames` frames of duration `shift`.
    pub fn from_frames(frames: usize, shift: TimeValue) -> TimeValue {
        shift * frames
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl FromStr for TimeValue {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TimeValue(Decimal::from_str(s)?))
    }
}

impl From<Decimal> for TimeValue {
    fn from(value: Decimal) -> Self {
        TimeValue(value)
    }
}

impl Add for TimeValue {
    type Output = TimeValue;
    fn add(self, rhs: TimeValue) -> TimeValue {
        TimeValue(self.0 + rhs.0)
    }
}

impl AddAssign for TimeValue {
    fn add_assign(&mut self, rhs: TimeValue) {
        self.0 += rhs.0;
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;
    fn sub(self, rhs: TimeValue) -> TimeValue {
        TimeValue(self.0 - rhs.0)
    }
}

impl SubAssign for TimeValue {
    fn sub_assign(&mut self, rhs: TimeValue) {
        self.0 -= rhs.0;
    }
}

impl Neg for TimeValue {
    type Output = TimeValue;
    fn neg(self) -> TimeValue {
        TimeValue(-self.0)
    }
}

impl Mul<Decimal> for TimeValue {
    type Output = TimeValue;
    fn mul(self, rhs: Decimal) -> TimeValue {
        TimeValue(self.0 * rhs)
    }
}

impl Mul<usize> for TimeValue {
    type Output = TimeValue;
    fn mul(self, rhs: usize) -> TimeValue {
        TimeValue(self.0 * Decimal::from(rhs as u64))
    }
}

/// Ratio of two time values, as a plain decimal.
impl Div for TimeValue {
    type Output = Decimal;
    fn div(self, rhs: TimeValue) -> Decimal {
        self.0 / rhs.0
    }
}

// TOML carries time values as plain (fractional) second counts; exact
// decimals are recovered by rounding to microseconds on the way in.
impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeValueVisitor;

        impl Visitor<'_> for TimeValueVisitor {
            type Value = TimeValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number of seconds or a decimal string")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TimeValue, E> {
                TimeValue::from_secs_f64(v)
                    .ok_or_else(|| E::custom("time value is not finite"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TimeValue, E> {
                Ok(TimeValue(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TimeValue, E> {
                Ok(TimeValue(Decimal::from(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TimeValue, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimeValueVisitor)
    }
}

/// Relative placement of an ordered pair of intervals `(A, B)`.
///
/// `P` denotes a point (zero-length interval), `I` a proper interval;
/// the suffix encodes where B's endpoints fall with respect to A's.
/// For two points only less/coincide/greater apply; for a point versus
/// an interval (and vice versa) the endpoint can also sit at A's begin
/// (`B`), inside (`I`), or at A's end (`E`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelativePosition {
    PpL,
    PpC,
    PpG,
    PiLl,
    PiLc,
    PiLg,
    PiCg,
    PiGg,
    IpL,
    IpB,
    IpI,
    IpE,
    IpG,
    IiLl,
    IiLb,
    IiLi,
    IiLe,
    IiLg,
    IiBi,
    IiBe,
    IiBg,
    IiIi,
    IiIe,
    IiIg,
    IiEg,
    IiGg,
}

impl RelativePosition {
    /// The position of `(B, A)` given the position of `(A, B)`.
    pub fn inverse(self) -> RelativePosition {
        use RelativePosition::*;
        match self {
            PpL => PpG,
            PpC => PpC,
            PpG => PpL,
            PiLl => IpG,
            PiLc => IpE,
            PiLg => IpI,
            PiCg => IpB,
            PiGg => IpL,
            IpL => PiGg,
            IpB => PiCg,
            IpI => PiLg,
            IpE => PiLc,
            IpG => PiLl,
            IiLl => IiGg,
            IiLb => IiEg,
            IiLi => IiIg,
            IiLe => IiIe,
            IiLg => IiIi,
            IiBi => IiBg,
            IiBe => IiBe,
            IiBg => IiBi,
            IiIi => IiLg,
            IiIe => IiLe,
            IiIg => IiLi,
            IiEg => IiLb,
            IiGg => IiLl,
        }
    }
}

/// A time interval, that is, a pair `(begin, end)` of time points with
/// `0 <= begin <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInterval {
    begin: TimeValue,
    end: TimeValue,
}

impl TimeInterval {
    /// Create a new interval, validating `0 <= begin <= end`.
    pub fn new(begin: TimeValue, end: TimeValue) -> TimingResult<Self> {
        if begin.is_negative() {
            return Err(TimingError::NegativeBegin);
        }
        if begin > end {
            return Err(TimingError::BeginAfterEnd);
        }
        Ok(Self { begin, end })
    }

    // Internal constructor for endpoints already known to be ordered.
    pub(crate) fn from_ordered(begin: TimeValue, end: TimeValue) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    /// The begin time point.
    pub fn begin(&self) -> TimeValue {
        self.begin
    }

    /// The end time point.
    pub fn end(&self) -> TimeValue {
        self.end
    }

    /// Replace the begin time point. The caller is responsible for
    /// keeping `begin <= end`.
    pub fn set_begin(&mut self, begin: TimeValue) {
        self.begin = begin;
    }

    /// Replace the end time point. The caller is responsible for
    /// keeping `begin <= end`.
    pub fn set_end(&mut self, end: TimeValue) {
        self.end = end;
    }

    /// The difference between end and begin.
    pub fn length(&self) -> TimeValue {
        self.end - self.begin
    }

    /// Whether begin and end coincide.
    pub fn has_zero_length(&self) -> bool {
        self.begin == self.end
    }

    /// Whether this interval starts at the given time point.
    pub fn starts_at(&self, point: TimeValue) -> bool {
        self.begin == point
    }

    /// Whether this interval ends at the given time point.
    pub fn ends_at(&self, point: TimeValue) -> bool {
        self.end == point
    }

    /// The time value at `percent` of this interval; `percent` is
    /// clamped into `[0, 100]`.
    pub fn percent_value(&self, percent: Decimal) -> TimeValue {
        let hundred = Decimal::from(100u64);
        let p = percent.clamp(Decimal::ZERO, hundred) / hundred;
        self.begin + self.length() * p
    }

    /// Whether this interval contains the given point, extrema included.
    pub fn contains(&self, point: TimeValue) -> bool {
        self.begin <= point && point <= self.end
    }

    /// Whether this interval contains the given point, extrema excluded.
    pub fn inner_contains(&self, point: TimeValue) -> bool {
        self.begin < point && point < self.end
    }

    /// Translate this interval by `offset`.
    ///
    /// Unless `allow_negative` is set, both endpoints are floored at
    /// zero. When `bounds` is given, both endpoints are clamped into it
    /// while preserving `begin <= end`.
    pub fn offset(
        &mut self,
        offset: TimeValue,
        allow_negative: bool,
        bounds: Option<&TimeInterval>,
    ) {
        self.begin += offset;
        self.end += offset;
        if !allow_negative {
            self.begin = self.begin.max(TimeValue::ZERO);
            self.end = self.end.max(TimeValue::ZERO);
        }
        if let Some(bounds) = bounds {
            self.begin = self.begin.clamp(bounds.begin, bounds.end);
            self.end = self.end.clamp(self.begin, bounds.end);
        }
    }

    /// The relative position of `other` with respect to this interval.
    pub fn relative_position_of(&self, other: &TimeInterval) -> RelativePosition {
        use RelativePosition::*;
        if self.has_zero_length() {
            if other.has_zero_length() {
                if other.begin < self.begin {
                    PpL
                } else if other.begin == self.begin {
                    PpC
                } else {
                    PpG
                }
            } else if other.end < self.begin {
                PiLl
            } else if other.end == self.begin {
                PiLc
            } else if other.begin < self.begin {
                PiLg
            } else if other.begin == self.begin {
                PiCg
            } else {
                PiGg
            }
        } else if other.has_zero_length() {
            if other.begin < self.begin {
                IpL
            } else if other.begin == self.begin {
                IpB
            } else if other.begin < self.end {
                IpI
            } else if other.begin == self.end {
                IpE
            } else {
                IpG
            }
        } else if other.begin < self.begin {
            if other.end < self.begin {
                IiLl
            } else if other.end == self.begin {
                IiLb
            } else if other.end < self.end {
                IiLi
            } else if other.end == self.end {
                IiLe
            } else {
                IiLg
            }
        } else if other.begin == self.begin {
            if other.end < self.end {
                IiBi
            } else if other.end == self.end {
                IiBe
            } else {
                IiBg
            }
        } else if other.begin < self.end {
            if other.end < self.end {
                IiIi
            } else if other.end == self.end {
                IiIe
            } else {
                IiIg
            }
        } else if other.begin == self.end {
            IiEg
        } else {
            IiGg
        }
    }

    /// The relative position of this interval with respect to `other`.
    pub fn relative_position_wrt(&self, other: &TimeInterval) -> RelativePosition {
        self.relative_position_of(other).inverse()
    }

    /// The intersection of this interval with `other`, or `None` if
    /// the two are disjoint.
    pub fn intersection(&self, other: &TimeInterval) -> Option<TimeInterval> {
        use RelativePosition::*;
        match self.relative_position_of(other) {
            PpC | PiLc | PiLg | PiCg | IpB | IiLb => {
                Some(TimeInterval::from_ordered(self.begin, self.begin))
            }
            IpE | IiEg => Some(TimeInterval::from_ordered(self.end, self.end)),
            IiBi | IiBe | IiIi | IiIe => {
                Some(TimeInterval::from_ordered(other.begin, other.end))
            }
            IpI | IiLi | IiLe | IiLg | IiBg | IiIg => {
                let begin = self.begin.max(other.begin);
                let end = self.end.min(other.end);
                Some(TimeInterval::from_ordered(begin, end))
            }
            _ => None,
        }
    }

    /// Whether `other` overlaps this interval, possibly only at an
    /// extremum.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.intersection(other).is_some()
    }

    /// Whether this interval ends exactly when `other` begins.
    pub fn is_adjacent_before(&self, other: &TimeInterval) -> bool {
        self.end == other.begin
    }

    /// Whether this interval begins exactly when `other` ends.
    pub fn is_adjacent_after(&self, other: &TimeInterval) -> bool {
        other.is_adjacent_before(self)
    }

    /// Whether this interval ends when `other` begins and both have
    /// non-zero length.
    pub fn is_non_zero_before_non_zero(&self, other: &TimeInterval) -> bool {
        self.is_adjacent_before(other) && !self.has_zero_length() && !other.has_zero_length()
    }

    /// Whether this interval begins when `other` ends and both have
    /// non-zero length.
    pub fn is_non_zero_after_non_zero(&self, other: &TimeInterval) -> bool {
        other.is_non_zero_before_non_zero(self)
    }

    /// This interval extended by `quantity` on both sides, with the
    /// begin floored at zero.
    pub fn shadow(&self, quantity: TimeValue) -> TimeInterval {
        let q = quantity.max(TimeValue::ZERO);
        TimeInterval::from_ordered((self.begin - q).max(TimeValue::ZERO), self.end + q)
    }

    /// Shrink this interval by `quantity`, moving the begin forward
    /// (`from_begin`) or the end backward.
    pub fn shrink(&mut self, quantity: TimeValue, from_begin: bool) -> TimingResult<()> {
        if quantity <= TimeValue::ZERO {
            return Err(TimingError::QuantityNotPositive);
        }
        if quantity > self.length() {
            return Err(TimingError::QuantityExceedsLength);
        }
        if from_begin {
            self.begin += quantity;
        } else {
            self.end -= quantity;
        }
        Ok(())
    }

    /// Enlarge this interval by `quantity`, moving the begin backward
    /// (`from_begin`) or the end forward.
    pub fn enlarge(&mut self, quantity: TimeValue, from_begin: bool) -> TimingResult<()> {
        if quantity <= TimeValue::ZERO {
            return Err(TimingError::QuantityNotPositive);
        }
        if from_begin {
            self.begin -= quantity;
        } else {
            self.end += quantity;
        }
        Ok(())
    }

    /// Slide this interval, preserving its length, so that its end
    /// falls at `point`. Fails if `point` is before the current begin.
    pub fn move_end_at(&mut self, point: TimeValue) -> TimingResult<()> {
        if point < self.begin {
            return Err(TimingError::PointBeforeBegin);
        }
        let length = self.length();
        self.end = point;
        self.begin = self.end - length;
        Ok(())
    }

    /// Slide this interval, preserving its length, so that its begin
    /// falls at `point`. Fails if `point` is after the current end.
    pub fn move_begin_at(&mut self, point: TimeValue) -> TimingResult<()> {
        if point > self.end {
            return Err(TimingError::PointAfterEnd);
        }
        let length = self.length();
        self.begin = point;
        self.end = self.begin + length;
        Ok(())
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(s: &str) -> TimeValue {
        s.parse().unwrap()
    }

    fn interval(b: &str, e: &str) -> TimeInterval {
        TimeInterval::new(tv(b), tv(e)).unwrap()
    }

    #[test]
    fn constructor_rejects_bad_endpoints() {
        assert_eq!(
            TimeInterval::new(tv("-1.000"), tv("0.000")),
            Err(TimingError::NegativeBegin)
        );
        assert_eq!(
            TimeInterval::new(tv("2.000"), tv("1.000")),
            Err(TimingError::BeginAfterEnd)
        );
        assert!(TimeInterval::new(tv("1.000"), tv("1.000")).is_ok());
    }

    #[test]
    fn percent_value_clamps_to_unit_range() {
        let i = interval("0.000", "1.000");
        let cases = [
            (-10i64, "0.000"),
            (10, "0.100"),
            (25, "0.250"),
            (50, "0.500"),
            (75, "0.750"),
            (150, "1.000"),
        ];
        for (p, expected) in cases {
            assert_eq!(i.percent_value(Decimal::from(p)), tv(expected));
        }
    }

    #[test]
    fn geq_multiple_snaps_up() {
        let shift = tv("0.040");
        assert_eq!(shift.geq_multiple(tv("0.000")), shift);
        assert_eq!(shift.geq_multiple(tv("0.040")), tv("0.040"));
        assert_eq!(shift.geq_multiple(tv("0.041")), tv("0.080"));
        assert_eq!(shift.geq_multiple(tv("0.001")), tv("0.040"));
    }

    #[test]
    fn frames_round_trip() {
        let shift = tv("0.040");
        assert_eq!(tv("1.000").to_frames(shift), 25);
        assert_eq!(tv("0.039").to_frames(shift), 0);
        assert_eq!(TimeValue::from_frames(25, shift), tv("1.000"));
    }

    #[test]
    fn intersection_is_commutative_and_idempotent() {
        let a = interval("0.000", "2.000");
        let b = interval("1.000", "3.000");
        let ab = a.intersection(&b).unwrap();
        let ba = b.intersection(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab, interval("1.000", "2.000"));
        assert_eq!(ab.intersection(&ab).unwrap(), ab);
    }

    #[test]
    fn disjoint_intervals_have_no_intersection() {
        let a = interval("0.000", "1.000");
        let b = interval("2.000", "3.000");
        assert!(a.intersection(&b).is_none());
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn adjacency_is_end_equals_begin() {
        let a = interval("0.000", "1.000");
        let b = interval("1.000", "2.000");
        assert!(a.is_adjacent_before(&b));
        assert!(b.is_adjacent_after(&a));
        assert!(a.is_non_zero_before_non_zero(&b));
        let p = interval("1.000", "1.000");
        assert!(a.is_adjacent_before(&p));
        assert!(!a.is_non_zero_before_non_zero(&p));
    }

    #[test]
    fn relative_position_matches_inverse() {
        let samples = [
            interval("0.000", "0.000"),
            interval("0.000", "1.000"),
            interval("0.500", "0.500"),
            interval("0.500", "1.500"),
            interval("1.000", "1.000"),
            interval("1.000", "2.000"),
            interval("2.000", "3.000"),
            interval("0.000", "2.000"),
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(
                    a.relative_position_of(b),
                    b.relative_position_of(a).inverse(),
                    "pair {a} / {b}"
                );
            }
        }
    }

    #[test]
    fn relative_position_classifies_known_cases() {
        use RelativePosition::*;
        let a = interval("1.000", "2.000");
        assert_eq!(a.relative_position_of(&interval("0.000", "0.500")), IiLl);
        assert_eq!(a.relative_position_of(&interval("0.000", "1.000")), IiLb);
        assert_eq!(a.relative_position_of(&interval("2.000", "3.000")), IiEg);
        assert_eq!(a.relative_position_of(&interval("1.200", "1.800")), IiIi);
        assert_eq!(a.relative_position_of(&interval("1.500", "1.500")), IpI);
        let p = interval("1.000", "1.000");
        assert_eq!(p.relative_position_of(&interval("0.500", "2.000")), PiLg);
    }

    #[test]
    fn offset_round_trips_without_clipping() {
        let mut i = interval("1.000", "2.000");
        i.offset(tv("0.500"), false, None);
        assert_eq!(i, interval("1.500", "2.500"));
        i.offset(tv("-0.500"), false, None);
        assert_eq!(i, interval("1.000", "2.000"));
    }

    #[test]
    fn offset_clamps_into_bounds() {
        let bounds = interval("0.000", "3.000");
        let mut i = interval("2.000", "2.500");
        i.offset(tv("1.000"), false, Some(&bounds));
        assert_eq!(i, interval("3.000", "3.000"));
    }

    #[test]
    fn shadow_extends_both_sides() {
        let i = interval("0.050", "1.000");
        assert_eq!(i.shadow(tv("0.080")), interval("0.000", "1.080"));
    }

    #[test]
    fn shrink_and_enlarge_mutate_one_endpoint() {
        let mut i = interval("1.000", "2.000");
        i.shrink(tv("0.500"), true).unwrap();
        assert_eq!(i, interval("1.500", "2.000"));
        i.enlarge(tv("0.250"), false).unwrap();
        assert_eq!(i, interval("1.500", "2.250"));
        assert_eq!(
            i.shrink(tv("5.000"), false),
            Err(TimingError::QuantityExceedsLength)
        );
    }

    #[test]
    fn moves_preserve_length() {
        let mut i = interval("1.000", "2.000");
        i.move_end_at(tv("3.000")).unwrap();
        assert_eq!(i, interval("2.000", "3.000"));
        i.move_begin_at(tv("0.000")).unwrap();
        assert_eq!(i, interval("0.000", "1.000"));
        assert_eq!(i.move_end_at(tv("-1.000")), Err(TimingError::PointBeforeBegin));
    }

    #[test]
    fn time_value_survives_toml() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            shift: TimeValue,
        }
        let toml = "shift = 0.040";
        let parsed: Holder = toml::from_str(toml).unwrap();
        assert_eq!(parsed.shift, tv("0.040"));
        let back = toml::to_string(&parsed).unwrap();
        let again: Holder = toml::from_str(&back).unwrap();
        assert_eq!(again.shift, tv("0.040"));
    }
}

//! A sync map fragment: a text fragment bound to a time interval.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::text::TextFragment;
use crate::timing::{TimeInterval, TimeValue};

/// Role of a fragment in a sync map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentType {
    /// Aligned text fragment.
    #[default]
    Regular,
    /// Pre-speech silence.
    Head,
    /// Post-speech silence.
    Tail,
    /// Long pause inside the text.
    Nonspeech,
}

impl std::fmt::Display for FragmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentType::Regular => write!(f, "regular"),
            FragmentType::Head => write!(f, "head"),
            FragmentType::Tail => write!(f, "tail"),
            FragmentType::Nonspeech => write!(f, "nonspeech"),
        }
    }
}

/// A text fragment and its associated time interval in the real wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMapFragment {
    /// The time interval.
    pub interval: TimeInterval,
    /// The text fragment, if any (HEAD/TAIL carry none or empty text).
    pub text_fragment: Option<TextFragment>,
    /// Role of this fragment.
    pub fragment_type: FragmentType,
    /// Confidence of the audio timing, in `[0, 1]`.
    pub confidence: f64,
}

impl SyncMapFragment {
    /// Create a fragment from an interval.
    pub fn new(
        interval: TimeInterval,
        text_fragment: Option<TextFragment>,
        fragment_type: FragmentType,
    ) -> Self {
        Self {
            interval,
            text_fragment,
            fragment_type,
            confidence: 1.0,
        }
    }

    /// The begin time.
    pub fn begin(&self) -> TimeValue {
        self.interval.begin()
    }

    /// The end time.
    pub fn end(&self) -> TimeValue {
        self.interval.end()
    }

    /// The audio duration, end minus begin.
    pub fn length(&self) -> TimeValue {
        self.interval.length()
    }

    /// Whether begin and end coincide.
    pub fn has_zero_length(&self) -> bool {
        self.interval.has_zero_length()
    }

    /// Whether this fragment is HEAD or TAIL.
    pub fn is_head_or_tail(&self) -> bool {
        matches!(self.fragment_type, FragmentType::Head | FragmentType::Tail)
    }

    /// Whether this fragment is REGULAR.
    pub fn is_regular(&self) -> bool {
        self.fragment_type == FragmentType::Regular
    }

    /// Identifier of the bound text fragment, if any.
    pub fn identifier(&self) -> Option<&str> {
        self.text_fragment.as_ref().map(|t| t.identifier.as_str())
    }

    /// Text of the bound text fragment, if any.
    pub fn text(&self) -> Option<String> {
        self.text_fragment.as_ref().map(TextFragment::text)
    }

    /// Number of characters of the bound text fragment.
    pub fn chars(&self) -> usize {
        self.text_fragment.as_ref().map_or(0, TextFragment::chars)
    }

    /// The rate in characters/second.
    ///
    /// Defined only for REGULAR fragments with non-zero length.
    pub fn rate(&self) -> Option<Decimal> {
        if self.fragment_type != FragmentType::Regular || self.has_zero_length() {
            return None;
        }
        Some(Decimal::from(self.chars() as u64) / self.length().as_decimal())
    }

    /// The time this fragment lacks to respect `max_rate`: positive
    /// means the fragment is too fast. Zero for non-REGULAR fragments.
    pub fn rate_lack(&self, max_rate: Decimal) -> TimeValue {
        if self.fragment_type == FragmentType::Regular {
            TimeValue::new(Decimal::from(self.chars() as u64) / max_rate) - self.length()
        } else {
            TimeValue::ZERO
        }
    }

    /// The time that can be stolen from this fragment while keeping it
    /// within `max_rate`: the opposite of the lack for REGULAR
    /// fragments, the whole length for NONSPEECH, zero for HEAD/TAIL.
    pub fn rate_slack(&self, max_rate: Decimal) -> TimeValue {
        match self.fragment_type {
            FragmentType::Regular => -self.rate_lack(max_rate),
            FragmentType::Nonspeech => self.length(),
            FragmentType::Head | FragmentType::Tail => TimeValue::ZERO,
        }
    }
}

// Fragments order and compare by their interval alone.
impl PartialEq for SyncMapFragment {
    fn eq(&self, other: &Self) -> bool {
        self.interval == other.interval
    }
}

impl Eq for SyncMapFragment {}

impl PartialOrd for SyncMapFragment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SyncMapFragment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.interval.cmp(&other.interval)
    }
}

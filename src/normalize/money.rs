use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Serialize, Serializer};

/// Non-negative fixed-point amount in millions, six fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Millions {
    micros: u64,
}

impl Millions {
    /// Largest value a `DECIMAL(12,6)` column holds.
    pub const MAX: Millions = Millions {
        micros: 999_999_999_999,
    };

    /// Rounds to the nearest millionth of a million. `None` when the value
    /// is negative, not finite or above [`Millions::MAX`].
    pub fn from_f64(value: f64) -> Option<Self> {
        let micros = (value * 1_000_000.0).round();
        if !micros.is_finite() || micros < 0.0 || micros > Self::MAX.micros as f64 {
            return None;
        }
        Some(Millions {
            micros: micros as u64,
        })
    }

    pub fn as_f64(self) -> f64 {
        self.micros as f64 / 1_000_000.0
    }
}

impl fmt::Display for Millions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.micros / 1_000_000, self.micros % 1_000_000)
    }
}

impl Serialize for Millions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl ToSql for Millions {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_f64()))
    }
}

/// Which scaling rule produced an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// "million" present; taken at face value.
    Millions,
    /// "billion" present; multiplied by 1000.
    Billions,
    /// No unit word; assumed to be whole currency units.
    RawUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Amount {
    pub value: Millions,
    pub scale: Scale,
}

/// Parse a scraped budget or box office figure into millions.
///
/// A range such as `$1.2–1.5 million` yields the midpoint. Text with no
/// number at all is treated as `1` before scaling. Returns `None` when the
/// scaled amount does not fit in [`Millions::MAX`].
pub fn normalize_money(raw: &str) -> Option<Amount> {
    let cleaned = strip_noise(raw);
    let number = range_midpoint(&cleaned)
        .or_else(|| first_number(&cleaned))
        .unwrap_or(1.0);

    let lower = cleaned.to_lowercase();
    let (scale, millions) = if lower.contains("million") {
        (Scale::Millions, number)
    } else if lower.contains("billion") {
        (Scale::Billions, number * 1000.0)
    } else {
        (Scale::RawUnits, number / 1_000_000.0)
    };

    Some(Amount {
        value: Millions::from_f64(millions)?,
        scale,
    })
}

fn strip_noise(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\\xa0|[$£€¥₹,\x{a0}\x{200b}]").unwrap());
    re.replace_all(raw, "").to_string()
}

fn range_midpoint(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?P<lower>[0-9]+\.[0-9]+|[0-9]+)\s*[-–—]\s*(?P<upper>[0-9]+\.[0-9]+|[0-9]+)")
            .unwrap()
    });
    let caps = re.captures(text)?;
    let lower: f64 = caps["lower"].parse().ok()?;
    let upper: f64 = caps["upper"].parse().ok()?;
    Some((lower + upper) / 2.0)
}

fn first_number(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[0-9]+\.[0-9]+|[0-9]+").unwrap());
    re.find(text)?.as_str().parse().ok()
}

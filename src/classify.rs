//! Clinical status bands for glucose readings.
//!
//! Every surface that shows a status (dashboard, calendar, history, exports,
//! admin views) goes through [`classify`], so a reading is labelled the same
//! everywhere.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::reading::{ReadingType, ValidationError, is_valid_level};

/// Fasting readings at or above this level are normal (mg/dL).
pub const FASTING_NORMAL_MIN: i32 = 70;
/// Fasting readings at or below this level are normal (mg/dL).
pub const FASTING_NORMAL_MAX: i32 = 100;
/// Non-fasting readings below this level are normal (mg/dL).
pub const NON_FASTING_ELEVATED_FROM: i32 = 140;
/// Non-fasting readings at or above this level are high (mg/dL).
pub const NON_FASTING_HIGH_FROM: i32 = 200;
/// Calendar days averaging within this band are in range (mg/dL, inclusive).
pub const DAY_IN_RANGE_MIN: i64 = 70;
pub const DAY_IN_RANGE_MAX: i64 = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Normal,
    Low,
    Elevated,
    High,
    /// Input outside the validated domain.
    Unknown,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Normal => "normal",
            ReadingStatus::Low => "low",
            ReadingStatus::Elevated => "elevated",
            ReadingStatus::High => "high",
            ReadingStatus::Unknown => "unknown",
        }
    }

    pub fn color(&self) -> StatusColor {
        match self {
            ReadingStatus::Normal => StatusColor::Green,
            ReadingStatus::Low | ReadingStatus::Elevated => StatusColor::Amber,
            ReadingStatus::High => StatusColor::Red,
            ReadingStatus::Unknown => StatusColor::Neutral,
        }
    }

    pub fn is_in_range(&self) -> bool {
        matches!(self, ReadingStatus::Normal)
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" => Ok(ReadingStatus::Normal),
            "low" => Ok(ReadingStatus::Low),
            "elevated" => Ok(ReadingStatus::Elevated),
            "high" => Ok(ReadingStatus::High),
            "unknown" => Ok(ReadingStatus::Unknown),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Display severity color for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Amber,
    Red,
    Neutral,
}

impl StatusColor {
    /// Stable class name for presentation layers.
    pub fn class_name(&self) -> &'static str {
        match self {
            StatusColor::Green => "status-green",
            StatusColor::Amber => "status-amber",
            StatusColor::Red => "status-red",
            StatusColor::Neutral => "status-neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: ReadingStatus,
    pub color: StatusColor,
}

impl From<ReadingStatus> for Classification {
    fn from(status: ReadingStatus) -> Self {
        Self {
            status,
            color: status.color(),
        }
    }
}

/// Classify a level for its reading type.
///
/// Levels outside the accepted 50..=500 range yield [`ReadingStatus::Unknown`].
pub fn classify(level: i32, reading_type: ReadingType) -> Classification {
    status_for(level, reading_type).into()
}

/// Classify with a type name straight from an untyped source.
/// An unrecognised type yields [`ReadingStatus::Unknown`].
pub fn classify_raw(level: i32, reading_type: &str) -> Classification {
    match reading_type.parse::<ReadingType>() {
        Ok(kind) => classify(level, kind),
        Err(_) => ReadingStatus::Unknown.into(),
    }
}

pub fn status_for(level: i32, reading_type: ReadingType) -> ReadingStatus {
    if !is_valid_level(level) {
        return ReadingStatus::Unknown;
    }

    match reading_type {
        ReadingType::Fasting => {
            if level < FASTING_NORMAL_MIN {
                ReadingStatus::Low
            } else if level <= FASTING_NORMAL_MAX {
                ReadingStatus::Normal
            } else {
                ReadingStatus::High
            }
        }
        ReadingType::Random | ReadingType::BeforeMeal | ReadingType::AfterMeal => {
            if level < NON_FASTING_ELEVATED_FROM {
                ReadingStatus::Normal
            } else if level < NON_FASTING_HIGH_FROM {
                ReadingStatus::Elevated
            } else {
                ReadingStatus::High
            }
        }
    }
}

/// Band for a calendar day, judged on its rounded average across all types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayBand {
    InRange,
    High,
    Low,
    NoData,
}

impl DayBand {
    pub fn from_average(average: Option<i64>) -> Self {
        match average {
            None => DayBand::NoData,
            Some(avg) if (DAY_IN_RANGE_MIN..=DAY_IN_RANGE_MAX).contains(&avg) => DayBand::InRange,
            Some(avg) if avg > DAY_IN_RANGE_MAX => DayBand::High,
            Some(_) => DayBand::Low,
        }
    }

    pub fn color(&self) -> StatusColor {
        match self {
            DayBand::InRange => StatusColor::Green,
            DayBand::High => StatusColor::Red,
            DayBand::Low => StatusColor::Amber,
            DayBand::NoData => StatusColor::Neutral,
        }
    }
}

//! Glucose reading types and input validation.
//!
//! A [`Reading`] is what storage hands back; a [`NewReading`] is the validated
//! input for creating one. The level bound lives here so that nothing outside
//! this module can construct an out-of-range reading for insertion.

use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest accepted glucose level in mg/dL.
pub const MIN_LEVEL: i32 = 50;
/// Highest accepted glucose level in mg/dL.
pub const MAX_LEVEL: i32 = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Sugar level must be between 50 and 500 mg/dL, got {0}")]
    LevelOutOfRange(i32),
    #[error("Unknown reading type: {0}")]
    UnknownReadingType(String),
    #[error("Unknown reading status: {0}")]
    UnknownStatus(String),
}

/// Clinical context a reading was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingType {
    Fasting,
    Random,
    BeforeMeal,
    AfterMeal,
}

impl ReadingType {
    pub const ALL: [ReadingType; 4] = [
        ReadingType::Fasting,
        ReadingType::Random,
        ReadingType::BeforeMeal,
        ReadingType::AfterMeal,
    ];

    /// Storage and export spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Fasting => "fasting",
            ReadingType::Random => "random",
            ReadingType::BeforeMeal => "before-meal",
            ReadingType::AfterMeal => "after-meal",
        }
    }

    /// Human-readable label for cards and headings.
    pub fn label(&self) -> &'static str {
        match self {
            ReadingType::Fasting => "Fasting",
            ReadingType::Random => "Random",
            ReadingType::BeforeMeal => "Before Meal",
            ReadingType::AfterMeal => "After Meal",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fasting" => Ok(ReadingType::Fasting),
            "random" => Ok(ReadingType::Random),
            "before-meal" => Ok(ReadingType::BeforeMeal),
            "after-meal" => Ok(ReadingType::AfterMeal),
            other => Err(ValidationError::UnknownReadingType(other.to_string())),
        }
    }
}

/// A stored glucose reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub id: i32,
    pub user_id: i32,
    pub reading_type: ReadingType,
    pub level: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

impl Reading {
    /// Notes as shown to people, with the placeholder for missing notes.
    pub fn notes_or_placeholder(&self) -> &str {
        self.notes.as_deref().unwrap_or("No notes")
    }
}

/// Validated input for a new reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReading {
    reading_type: ReadingType,
    level: i32,
    date: NaiveDate,
    time: NaiveTime,
    notes: Option<String>,
}

impl NewReading {
    pub fn new(
        reading_type: ReadingType,
        level: i32,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
    ) -> Result<Self, ValidationError> {
        if !is_valid_level(level) {
            return Err(ValidationError::LevelOutOfRange(level));
        }

        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            reading_type,
            level,
            date,
            time,
            notes,
        })
    }

    pub fn reading_type(&self) -> ReadingType {
        self.reading_type
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Attach storage identity.
    pub fn into_reading(self, id: i32, user_id: i32) -> Reading {
        Reading {
            id,
            user_id,
            reading_type: self.reading_type,
            level: self.level,
            date: self.date,
            time: self.time,
            notes: self.notes,
        }
    }
}

pub fn is_valid_level(level: i32) -> bool {
    (MIN_LEVEL..=MAX_LEVEL).contains(&level)
}

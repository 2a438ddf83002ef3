//! Plate text normalization and format validation.
//!
//! Recognized text is canonicalized by dropping every whitespace character and
//! uppercasing the rest. A canonical string becomes a [`PlateNumber`] only when it
//! is at most [`MAX_PLATE_LEN`] characters long and fully matches one of the two
//! accepted shapes:
//!
//! - country code (two letters) + 3 digits + 3 letters + 2 digits, e.g. `KZ123ABC45`
//! - 3 digits + 3 letters + 2 digits, e.g. `444BOP02`
//!
//! The country code is uppercased at construction, so it is effectively matched
//! case-insensitively against the raw text.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::ConfigError;

pub const MAX_PLATE_LEN: usize = 10;
pub const DEFAULT_COUNTRY_CODE: &str = "KZ";

const DOMESTIC_BODY: &str = "[0-9]{3}[A-Z]{3}[0-9]{2}";

/// Canonical plate identity, only obtainable through [`PlateValidator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlateNumber(String);

impl PlateNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value read back from storage. Rows written by this crate are
    /// already canonical; rows edited by hand are taken as they are.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlateNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateFormat {
    /// Country code prefix followed by the domestic body (10 characters).
    Country,
    /// Domestic body only (8 characters).
    Domestic,
}

/// Strips all whitespace, surrounding and interior, and uppercases the rest.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub struct PlateValidator {
    country: Regex,
    domestic: Regex,
}

impl PlateValidator {
    pub fn new(country_code: &str) -> Result<Self, ConfigError> {
        if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(format!(
                "country code must be two ASCII letters, got '{country_code}'"
            )));
        }

        let code = country_code.to_ascii_uppercase();
        let country = Regex::new(&format!("^{}{DOMESTIC_BODY}$", regex::escape(&code)))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let domestic = Regex::new(&format!("^{DOMESTIC_BODY}$"))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(Self { country, domestic })
    }

    /// Which format, if any, an already normalized string matches.
    pub fn classify(&self, normalized: &str) -> Option<PlateFormat> {
        if normalized.chars().count() > MAX_PLATE_LEN {
            return None;
        }
        if self.country.is_match(normalized) {
            Some(PlateFormat::Country)
        } else if self.domestic.is_match(normalized) {
            Some(PlateFormat::Domestic)
        } else {
            None
        }
    }

    pub fn matches(&self, normalized: &str, format: PlateFormat) -> bool {
        self.classify(normalized) == Some(format)
    }

    pub fn validate(&self, normalized: &str) -> Option<PlateNumber> {
        self.classify(normalized)
            .map(|_| PlateNumber(normalized.to_string()))
    }

    /// Normalize then validate. Rejections are silent.
    pub fn parse(&self, raw: &str) -> Option<PlateNumber> {
        self.validate(&normalize(raw))
    }
}

impl Default for PlateValidator {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE).expect("default country code is valid")
    }
}

//! Postal-code bucketing.
//!
//! Locations are never geocoded. A six-digit postal code is mapped to a
//! district (its first three digits), a state (its first two digits) and a
//! coarse region (its first digit), and distances between two codes are
//! approximated by the length of their shared prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PostmatchError, Result};

/// Distance tiers in kilometres, indexed by shared-prefix length.
pub const DISTANCE_SAME_CODE_KM: u32 = 0;
pub const DISTANCE_SAME_DISTRICT_KM: u32 = 5;
pub const DISTANCE_SAME_STATE_PREFIX_KM: u32 = 25;
pub const DISTANCE_SAME_REGION_KM: u32 = 100;
pub const DISTANCE_FAR_KM: u32 = 500;

/// Returned for a two-digit prefix with no state mapping.
pub const UNKNOWN_STATE: &str = "Unknown";

/// A validated postal location with its derived buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub postal_code: String,
    pub district: String,
    pub state: String,
}

impl Location {
    /// Validate `code` and derive its district and state buckets.
    pub fn from_postal_code(code: &str) -> Result<Self> {
        validate_postal_code(code)?;
        Ok(Self {
            postal_code: code.to_string(),
            district: district_for(code),
            state: state_for(code).to_string(),
        })
    }

    #[must_use]
    pub fn region(&self) -> Option<Region> {
        region_for(&self.postal_code)
    }

    /// Approximate distance to `other` in kilometres.
    #[must_use]
    pub fn distance_km(&self, other: &Location) -> u32 {
        distance_km(&self.postal_code, &other.postal_code)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.postal_code, self.district, self.state)
    }
}

/// Coarse postal zone selected by the first digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    North,
    West,
    South,
    East,
    NorthEast,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::North => write!(f, "NORTH"),
            Self::West => write!(f, "WEST"),
            Self::South => write!(f, "SOUTH"),
            Self::East => write!(f, "EAST"),
            Self::NorthEast => write!(f, "NORTH_EAST"),
        }
    }
}

/// A postal code is exactly six ASCII digits and never starts with `0`.
pub fn validate_postal_code(code: &str) -> Result<()> {
    let bytes = code.as_bytes();
    let well_formed = bytes.len() == 6
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] != b'0';
    if well_formed {
        Ok(())
    } else {
        Err(PostmatchError::InvalidPostalCode {
            code: code.to_string(),
        })
    }
}

#[must_use]
pub fn district_for(code: &str) -> String {
    let prefix = code.get(..3).unwrap_or(code);
    format!("District-{prefix}")
}

#[must_use]
pub fn state_for(code: &str) -> &'static str {
    match code.get(..2) {
        Some("11") => "Delhi",
        Some("12") => "Haryana",
        Some("13" | "14") => "Punjab",
        Some("20" | "21" | "22") => "Uttar Pradesh",
        Some("30" | "31" | "32") => "Rajasthan",
        Some("40" | "41" | "42") => "Maharashtra",
        Some("50") => "Madhya Pradesh",
        Some("51" | "52") => "Chhattisgarh",
        Some("56" | "57" | "58") => "Karnataka",
        Some("60" | "61" | "62") => "Tamil Nadu",
        Some("67" | "68" | "69") => "Kerala",
        Some("70" | "71" | "72") => "West Bengal",
        Some("75" | "76" | "77") => "Odisha",
        Some("78") => "Assam",
        Some("79") => "North Eastern States",
        Some("80" | "81") => "Bihar",
        Some("82" | "83") => "Jharkhand",
        _ => UNKNOWN_STATE,
    }
}

#[must_use]
pub fn region_for(code: &str) -> Option<Region> {
    match code.as_bytes().first()? {
        b'1' | b'2' => Some(Region::North),
        b'3' | b'4' => Some(Region::West),
        b'5' | b'6' => Some(Region::South),
        b'7' => Some(Region::East),
        b'8' | b'9' => Some(Region::NorthEast),
        _ => None,
    }
}

/// Approximate distance between two postal codes from their shared prefix.
#[must_use]
pub fn distance_km(a: &str, b: &str) -> u32 {
    if a == b {
        return DISTANCE_SAME_CODE_KM;
    }
    let shared = a
        .bytes()
        .zip(b.bytes())
        .take(3)
        .take_while(|(x, y)| x == y)
        .count();
    match shared {
        3 => DISTANCE_SAME_DISTRICT_KM,
        2 => DISTANCE_SAME_STATE_PREFIX_KM,
        1 => DISTANCE_SAME_REGION_KM,
        _ => DISTANCE_FAR_KM,
    }
}

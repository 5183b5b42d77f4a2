use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_LEVEL: f64 = 1.0;
pub const MAX_LEVEL: f64 = 6.0;

/// Upper bounds (exclusive) of the first five bands. Anything at or above
/// the last breakpoint is C2.
const BAND_BREAKPOINTS: [(f64, CefrLevel); 5] = [
    (1.5, CefrLevel::A1),
    (2.5, CefrLevel::A2),
    (3.5, CefrLevel::B1),
    (4.5, CefrLevel::B2),
    (5.5, CefrLevel::C1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    pub fn from_numeric(level: f64) -> Self {
        let level = clamp_level(level);
        BAND_BREAKPOINTS
            .iter()
            .find(|(upper, _)| level < *upper)
            .map(|(_, band)| *band)
            .unwrap_or(CefrLevel::C2)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Some(Self::A1),
            "A2" => Some(Self::A2),
            "B1" => Some(Self::B1),
            "B2" => Some(Self::B2),
            "C1" => Some(Self::C1),
            "C2" => Some(Self::C2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    pub fn from_ordinal(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn lower(&self) -> Option<Self> {
        self.ordinal().checked_sub(1).and_then(Self::from_ordinal)
    }

    pub fn higher(&self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// Neighbouring bands, lower first. A1 and C2 only have one neighbour.
    pub fn adjacent(&self) -> Vec<Self> {
        self.lower().into_iter().chain(self.higher()).collect()
    }

    /// Numeric level at the centre of the band: A1 = 1.0, A2 = 2.0, ..., C2 = 6.0.
    pub fn midpoint(&self) -> f64 {
        MIN_LEVEL + self.ordinal() as f64
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        return MIN_LEVEL;
    }
    level.clamp(MIN_LEVEL, MAX_LEVEL)
}

pub fn is_level_in_range(level: f64) -> bool {
    level.is_finite() && (MIN_LEVEL..=MAX_LEVEL).contains(&level)
}

pub fn numeric_to_cefr(level: f64) -> CefrLevel {
    CefrLevel::from_numeric(level)
}

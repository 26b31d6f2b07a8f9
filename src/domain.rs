use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeFailure, PhenoError};

/// Storage width of one raw sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Uint8,
    Uint16,
}

impl SampleType {
    pub fn bits(self) -> u32 {
        match self {
            SampleType::Uint8 => 8,
            SampleType::Uint16 => 16,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            SampleType::Uint8 => 1,
            SampleType::Uint16 => 2,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleType::Uint8 => write!(f, "uint8"),
            SampleType::Uint16 => write!(f, "uint16"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Mono,
    Color,
}

/// Colour filter layout, named after the top-left 2x2 tile read row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfaPattern {
    Rggb,
    /// Same layout OpenCV calls `BayerRG`.
    #[default]
    Bggr,
    Grbg,
    Gbrg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl CfaPattern {
    pub fn color_at(self, row: usize, col: usize) -> Channel {
        use Channel::{Blue, Green, Red};
        let tile = match self {
            CfaPattern::Rggb => [Red, Green, Green, Blue],
            CfaPattern::Bggr => [Blue, Green, Green, Red],
            CfaPattern::Grbg => [Green, Red, Blue, Green],
            CfaPattern::Gbrg => [Green, Blue, Red, Green],
        };
        tile[(row % 2) * 2 + col % 2]
    }
}

/// Decode parameters for one dataformat code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub sample_type: SampleType,
    pub kind: ImageKind,
    pub bit_precision: u32,
    pub cfa: CfaPattern,
}

impl FormatDescriptor {
    pub fn new(
        sample_type: SampleType,
        kind: ImageKind,
        bit_precision: u32,
    ) -> Result<Self, PhenoError> {
        if bit_precision == 0 || bit_precision > sample_type.bits() {
            return Err(PhenoError::InvalidConfig(format!(
                "bit precision {bit_precision} does not fit a {sample_type} sample"
            )));
        }
        Ok(Self {
            sample_type,
            kind,
            bit_precision,
            cfa: CfaPattern::default(),
        })
    }

    pub fn with_cfa(mut self, cfa: CfaPattern) -> Self {
        self.cfa = cfa;
        self
    }

    pub fn is_color(&self) -> bool {
        self.kind == ImageKind::Color
    }

    /// Multiplier that spreads `bit_precision` significant bits over the storage width.
    pub fn scale_factor(&self) -> u32 {
        1 << (self.sample_type.bits() - self.bit_precision)
    }
}

/// Immutable dataformat code -> descriptor map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatTable {
    formats: BTreeMap<i32, FormatDescriptor>,
}

impl FormatTable {
    pub fn get(&self, code: i32) -> Result<&FormatDescriptor, DecodeFailure> {
        self.formats
            .get(&code)
            .ok_or(DecodeFailure::UnknownFormat(code))
    }
}

impl FromIterator<(i32, FormatDescriptor)> for FormatTable {
    fn from_iter<I: IntoIterator<Item = (i32, FormatDescriptor)>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}

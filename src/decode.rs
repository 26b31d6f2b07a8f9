//! Reconstruction of raw sensor captures into rasters.
//!
//! A payload is a zip archive with a single `data` member holding row-major
//! unsigned samples (16-bit samples are little endian). Decoding validates the
//! exact byte length, rescales the true sensor precision onto the storage
//! width, demosaics colour captures and applies the 180 degree orientation
//! correction.

use ndarray::{Array2, Array3, s};
use tracing::warn;

use crate::bayer::demosaic_bilinear;
use crate::domain::{FormatDescriptor, FormatTable, SampleType};
use crate::error::DecodeFailure;
use crate::fs_util::read_raw_member;
use crate::ledger::ImageRecord;

/// Unsigned storage sample.
pub trait Sample: Copy + Default + PartialEq + std::fmt::Debug {
    fn to_u32(self) -> u32;

    fn saturating_from(value: u32) -> Self;
}

impl Sample for u8 {
    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn saturating_from(value: u32) -> Self {
        value.min(u32::from(u8::MAX)) as u8
    }
}

impl Sample for u16 {
    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn saturating_from(value: u32) -> Self {
        value.min(u32::from(u16::MAX)) as u16
    }
}

/// Decoded image; colour variants are `[height, width, 3]` in B, G, R order.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Gray8(Array2<u8>),
    Gray16(Array2<u16>),
    Bgr8(Array3<u8>),
    Bgr16(Array3<u16>),
}

impl Raster {
    pub fn width(&self) -> usize {
        match self {
            Raster::Gray8(grid) => grid.ncols(),
            Raster::Gray16(grid) => grid.ncols(),
            Raster::Bgr8(grid) => grid.dim().1,
            Raster::Bgr16(grid) => grid.dim().1,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Raster::Gray8(grid) => grid.nrows(),
            Raster::Gray16(grid) => grid.nrows(),
            Raster::Bgr8(grid) => grid.dim().0,
            Raster::Bgr16(grid) => grid.dim().0,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Raster::Gray8(_) | Raster::Gray16(_) => 1,
            Raster::Bgr8(_) | Raster::Bgr16(_) => 3,
        }
    }

    pub fn bit_depth(&self) -> u32 {
        match self {
            Raster::Gray8(_) | Raster::Bgr8(_) => 8,
            Raster::Gray16(_) | Raster::Bgr16(_) => 16,
        }
    }

    /// Vertical flip followed by horizontal flip.
    pub fn rotated_180(&self) -> Raster {
        match self {
            Raster::Gray8(grid) => Raster::Gray8(grid.slice(s![..;-1, ..;-1]).to_owned()),
            Raster::Gray16(grid) => Raster::Gray16(grid.slice(s![..;-1, ..;-1]).to_owned()),
            Raster::Bgr8(grid) => Raster::Bgr8(grid.slice(s![..;-1, ..;-1, ..]).to_owned()),
            Raster::Bgr16(grid) => Raster::Bgr16(grid.slice(s![..;-1, ..;-1, ..]).to_owned()),
        }
    }
}

/// Samples above the declared sensor precision; decoding still succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionViolation {
    pub max_raw: u32,
    pub limit: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub raster: Raster,
    pub precision_violation: Option<PrecisionViolation>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub width: u32,
    pub height: u32,
    pub format: FormatDescriptor,
    pub orientation: i32,
}

pub fn decode(payload: &[u8], params: &DecodeParams) -> Result<Decoded, DecodeFailure> {
    let invalid = DecodeFailure::InvalidDimensions {
        width: params.width,
        height: params.height,
    };
    if params.width == 0 || params.height == 0 {
        return Err(invalid);
    }
    let expected = (params.width as usize)
        .checked_mul(params.height as usize)
        .and_then(|pixels| pixels.checked_mul(params.format.sample_type.byte_len()))
        .ok_or(invalid)?;
    let data = read_raw_member(payload, expected)?;

    let decoded = match params.format.sample_type {
        SampleType::Uint8 => {
            let (image, violation) = reconstruct(data, params)?;
            Decoded {
                raster: match image {
                    Image::Mono(grid) => Raster::Gray8(grid),
                    Image::Color(grid) => Raster::Bgr8(grid),
                },
                precision_violation: violation,
            }
        }
        SampleType::Uint16 => {
            let samples = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let (image, violation) = reconstruct(samples, params)?;
            Decoded {
                raster: match image {
                    Image::Mono(grid) => Raster::Gray16(grid),
                    Image::Color(grid) => Raster::Bgr16(grid),
                },
                precision_violation: violation,
            }
        }
    };

    if params.orientation != 0 {
        return Ok(Decoded {
            raster: decoded.raster.rotated_180(),
            ..decoded
        });
    }
    Ok(decoded)
}

enum Image<T> {
    Mono(Array2<T>),
    Color(Array3<T>),
}

type Reconstructed<T> = (Image<T>, Option<PrecisionViolation>);

fn reconstruct<T: Sample>(
    mut samples: Vec<T>,
    params: &DecodeParams,
) -> Result<Reconstructed<T>, DecodeFailure> {
    let violation = rescale(&mut samples, &params.format);
    let grid = Array2::from_shape_vec((params.height as usize, params.width as usize), samples)
        .map_err(|_| DecodeFailure::InvalidDimensions {
            width: params.width,
            height: params.height,
        })?;
    let image = if params.format.is_color() {
        Image::Color(demosaic_bilinear(&grid, params.format.cfa))
    } else {
        Image::Mono(grid)
    };
    Ok((image, violation))
}

/// Multiplies every sample by the format's scale factor, saturating at the storage max.
pub fn rescale<T: Sample>(
    samples: &mut [T],
    format: &FormatDescriptor,
) -> Option<PrecisionViolation> {
    let limit = (1u32 << format.bit_precision) - 1;
    let scale = format.scale_factor();
    let mut max_raw = 0;
    let mut count = 0;
    for sample in samples.iter_mut() {
        let raw = sample.to_u32();
        if raw > limit {
            count += 1;
            max_raw = max_raw.max(raw);
        }
        *sample = T::saturating_from(raw.saturating_mul(scale));
    }
    (count > 0).then_some(PrecisionViolation {
        max_raw,
        limit,
        count,
    })
}

/// Decoder with its dataformat table injected at construction.
#[derive(Debug, Clone)]
pub struct RawDecoder {
    formats: FormatTable,
}

impl RawDecoder {
    pub fn new(formats: FormatTable) -> Self {
        Self { formats }
    }

    pub fn decode_record(
        &self,
        payload: &[u8],
        record: &ImageRecord,
    ) -> Result<Decoded, DecodeFailure> {
        let format = *self.formats.get(record.dataformat)?;
        let decoded = decode(
            payload,
            &DecodeParams {
                width: record.width,
                height: record.height,
                format,
                orientation: record.orientation,
            },
        )?;
        if let Some(violation) = decoded.precision_violation {
            warn!(
                path = %record.relative_path(),
                max_raw = violation.max_raw,
                limit = violation.limit,
                samples = violation.count,
                "raw samples exceed declared bit precision"
            );
        }
        Ok(decoded)
    }
}

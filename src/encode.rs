use std::io::Cursor;

use camino::Utf8Path;
use image::{ImageBuffer, ImageFormat, ImageResult, Luma, Rgb};

use crate::decode::Raster;
use crate::error::MaterializeError;
use crate::store::DatasetLayout;

/// Encodes a raster as PNG at its own bit depth; BGR rasters are written as RGB.
pub fn encode_png(raster: &Raster) -> ImageResult<Vec<u8>> {
    let width = raster.width() as u32;
    let height = raster.height() as u32;
    let mut cursor = Cursor::new(Vec::new());
    match raster {
        Raster::Gray8(grid) => {
            ImageBuffer::from_fn(width, height, |x, y| Luma([grid[[y as usize, x as usize]]]))
                .write_to(&mut cursor, ImageFormat::Png)?
        }
        Raster::Gray16(grid) => {
            ImageBuffer::from_fn(width, height, |x, y| Luma([grid[[y as usize, x as usize]]]))
                .write_to(&mut cursor, ImageFormat::Png)?
        }
        Raster::Bgr8(grid) => ImageBuffer::from_fn(width, height, |x, y| {
            let (y, x) = (y as usize, x as usize);
            Rgb([grid[[y, x, 2]], grid[[y, x, 1]], grid[[y, x, 0]]])
        })
        .write_to(&mut cursor, ImageFormat::Png)?,
        Raster::Bgr16(grid) => ImageBuffer::from_fn(width, height, |x, y| {
            let (y, x) = (y as usize, x as usize);
            Rgb([grid[[y, x, 2]], grid[[y, x, 1]], grid[[y, x, 0]]])
        })
        .write_to(&mut cursor, ImageFormat::Png)?,
    }
    Ok(cursor.into_inner())
}

/// Writes the PNG through a temporary file so a failed write never leaves a partial image.
pub fn write_png(raster: &Raster, path: &Utf8Path) -> Result<(), MaterializeError> {
    let content = encode_png(raster).map_err(|err| MaterializeError::Write(err.to_string()))?;
    DatasetLayout::write_bytes_atomic(path, &content)
        .map_err(|err| MaterializeError::Write(err.to_string()))
}

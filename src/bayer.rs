//! Bilinear demosaicing of a single-channel colour filter array.
//!
//! Every output pixel keeps its own CFA sample; each missing channel is the
//! rounded mean of the in-bounds neighbours (3x3 window) that carry that
//! colour. Inside a Bayer mosaic this selects the usual bilinear stencils:
//! the four crosses for green at red/blue sites, the four diagonals for
//! blue at red sites (and vice versa), and the horizontal or vertical pair
//! for red/blue at green sites. At the border only the neighbours that
//! exist are averaged.
//!
//! Output channels are ordered B, G, R.

use ndarray::{Array2, Array3};

use crate::decode::Sample;
use crate::domain::{CfaPattern, Channel};

const BGR: [Channel; 3] = [Channel::Blue, Channel::Green, Channel::Red];

pub fn demosaic_bilinear<T: Sample>(mosaic: &Array2<T>, cfa: CfaPattern) -> Array3<T> {
    let (height, width) = mosaic.dim();
    Array3::from_shape_fn((height, width, 3), |(row, col, channel)| {
        let wanted = BGR[channel];
        if cfa.color_at(row, col) == wanted {
            return mosaic[[row, col]];
        }
        let mut sum = 0u32;
        let mut count = 0u32;
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                if dy == 0 && dx == 0 {
                    continue;
                }
                let (Some(y), Some(x)) = (row.checked_add_signed(dy), col.checked_add_signed(dx))
                else {
                    continue;
                };
                if y >= height || x >= width || cfa.color_at(y, x) != wanted {
                    continue;
                }
                sum += mosaic[[y, x]].to_u32();
                count += 1;
            }
        }
        if count == 0 {
            T::default()
        } else {
            T::saturating_from((sum + count / 2) / count)
        }
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn green_site_takes_row_and_column_pairs() {
        // RGGB tile repeated over 3x3; centre (1,1) is blue.
        let mosaic: Array2<u8> = array![[10, 20, 12], [30, 40, 32], [14, 24, 16]];
        let out = demosaic_bilinear(&mosaic, CfaPattern::Rggb);
        // Blue site: own sample, green from the cross, red from the diagonals.
        assert_eq!(out[[1, 1, 0]], 40);
        assert_eq!(out[[1, 1, 1]], (20 + 30 + 32 + 24 + 2) / 4);
        assert_eq!(out[[1, 1, 2]], (10 + 12 + 14 + 16 + 2) / 4);
        // Green site (0,1) in a red row: red horizontal, blue vertical.
        assert_eq!(out[[0, 1, 2]], 11);
        assert_eq!(out[[0, 1, 0]], 40);
        assert_eq!(out[[0, 1, 1]], 20);
    }

    #[test]
    fn sixteen_bit_samples_do_not_overflow() {
        let mosaic: Array2<u16> = Array2::from_elem((4, 4), u16::MAX);
        let out = demosaic_bilinear(&mosaic, CfaPattern::Bggr);
        assert!(out.iter().all(|value| *value == u16::MAX));
    }
}

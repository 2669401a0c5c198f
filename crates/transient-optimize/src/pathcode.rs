//! Fixed-width binary encoding of viewing paths.
//!
//! A path is a sequence of `(row, col)` pixel positions. Each coordinate is
//! written as `bits` binary digits, most significant first, and the
//! coordinates are concatenated in path order, row before column. Signed
//! coordinates are not supported.

use transient_types::SurveyShape;

use crate::error::OptimizeError;

/// Widest supported coordinate.
pub const MAX_BITS: u32 = u32::BITS;

/// Smallest width that holds every row and column index of `shape`.
pub const fn bit_width(shape: SurveyShape) -> u32 {
    let largest = if shape.rows > shape.cols {
        shape.rows
    } else {
        shape.cols
    };
    let bits = MAX_BITS.saturating_sub(largest.saturating_sub(1).leading_zeros());
    if bits == 0 { 1 } else { bits }
}

fn check_width(bits: u32) -> Result<usize, OptimizeError> {
    if bits == 0 || bits > MAX_BITS {
        return Err(OptimizeError::InvalidBitWidth { bits });
    }
    usize::try_from(bits).map_err(|_| OptimizeError::InvalidBitWidth { bits })
}

/// Encode `path` with `bits` digits per coordinate.
///
/// # Errors
///
/// Returns [`OptimizeError::InvalidBitWidth`] unless `1 <= bits <= 32`, and
/// [`OptimizeError::PathValueTooWide`] for a coordinate that needs more
/// than `bits` digits.
pub fn encode_path(path: &[(u32, u32)], bits: u32) -> Result<String, OptimizeError> {
    let width = check_width(bits)?;
    let mut code = String::with_capacity(path.len().saturating_mul(width).saturating_mul(2));
    for &(row, col) in path {
        for value in [row, col] {
            if value.checked_shr(bits).unwrap_or(0) != 0 {
                return Err(OptimizeError::PathValueTooWide { value, bits });
            }
            for shift in (0..bits).rev() {
                let digit = value.checked_shr(shift).unwrap_or(0) & 1;
                code.push(if digit == 1 { '1' } else { '0' });
            }
        }
    }
    Ok(code)
}

/// Decode a string written by [`encode_path`] with the same `bits`.
///
/// # Errors
///
/// Returns [`OptimizeError::InvalidBitWidth`] for an unsupported width,
/// [`OptimizeError::InvalidPathCode`] when the length is not a whole
/// number of `(row, col)` pairs, and [`OptimizeError::InvalidPathDigit`]
/// for any character other than `0` or `1`.
pub fn decode_path(code: &str, bits: u32) -> Result<Vec<(u32, u32)>, OptimizeError> {
    let width = check_width(bits)?;
    let pair = width.saturating_mul(2);
    if code.len().checked_rem(pair) != Some(0) {
        return Err(OptimizeError::InvalidPathCode {
            len: code.len(),
            bits,
        });
    }

    let mut values = Vec::with_capacity(code.len().checked_div(width).unwrap_or(0));
    let mut value = 0_u32;
    for (index, found) in code.chars().enumerate() {
        let digit = match found {
            '0' => 0,
            '1' => 1,
            _ => return Err(OptimizeError::InvalidPathDigit { index, found }),
        };
        value = value.checked_shl(1).unwrap_or(0) | digit;
        if index.checked_add(1).and_then(|n| n.checked_rem(width)) == Some(0) {
            values.push(value);
            value = 0;
        }
    }
    Ok(values
        .chunks_exact(2)
        .filter_map(|pair| match pair {
            [row, col] => Some((*row, *col)),
            _ => None,
        })
        .collect())
}

/// Read a path [`Genome`](crate::breed::Genome) (one `[row, col]` gene per
/// frame) as pixel positions.
///
/// # Errors
///
/// Returns [`OptimizeError::DimensionMismatch`] for a gene that is not a
/// pair, and [`OptimizeError::NonIntegralPathGene`] for a coordinate that
/// is not a non-negative whole number below `2^32`.
pub fn genome_path(genome: &[Vec<f64>]) -> Result<Vec<(u32, u32)>, OptimizeError> {
    genome
        .iter()
        .map(|gene| match gene.as_slice() {
            [row, col] => Ok((coordinate(*row)?, coordinate(*col)?)),
            _ => Err(OptimizeError::DimensionMismatch {
                expected: 2,
                actual: gene.len(),
            }),
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coordinate(value: f64) -> Result<u32, OptimizeError> {
    if !value.is_finite() || value < 0.0 || value.fract().abs() > 0.0 || value > f64::from(u32::MAX) {
        return Err(OptimizeError::NonIntegralPathGene { value });
    }
    // Whole, non-negative and at most u32::MAX: the cast is exact.
    Ok(value as u32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_written_most_significant_first() {
        assert_eq!(encode_path(&[(1, 2), (3, 0)], 2).unwrap(), "01101100");
        assert_eq!(decode_path("01101100", 2).unwrap(), vec![(1, 2), (3, 0)]);
        assert_eq!(encode_path(&[], 4).unwrap(), "");
    }

    #[test]
    fn full_width_coordinates_survive() {
        let path = [(u32::MAX, 0), (7, 0x8000_0000)];
        let code = encode_path(&path, 32).unwrap();
        assert_eq!(code.len(), 128);
        assert_eq!(decode_path(&code, 32).unwrap(), path.to_vec());
    }

    #[test]
    fn widths_follow_the_survey_shape() {
        assert_eq!(bit_width(SurveyShape::new(1, 1)), 1);
        assert_eq!(bit_width(SurveyShape::new(2, 1)), 1);
        assert_eq!(bit_width(SurveyShape::new(64, 64)), 6);
        assert_eq!(bit_width(SurveyShape::new(65, 3)), 7);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(encode_path(&[(4, 0)], 2), Err(OptimizeError::PathValueTooWide { value: 4, bits: 2 })));
        assert!(matches!(encode_path(&[(0, 0)], 0), Err(OptimizeError::InvalidBitWidth { bits: 0 })));
        assert!(matches!(decode_path("011", 2), Err(OptimizeError::InvalidPathCode { len: 3, bits: 2 })));
        assert!(matches!(
            decode_path("01x0", 1),
            Err(OptimizeError::InvalidPathDigit { index: 2, found: 'x' })
        ));
    }

    #[test]
    fn genomes_must_hold_whole_pairs() {
        assert_eq!(genome_path(&[vec![3.0, 4.0], vec![0.0, 1.0]]).unwrap(), vec![(3, 4), (0, 1)]);
        assert!(matches!(
            genome_path(&[vec![1.5, 0.0]]),
            Err(OptimizeError::NonIntegralPathGene { .. })
        ));
        assert!(matches!(
            genome_path(&[vec![1.0]]),
            Err(OptimizeError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }
}

//! Presence bitmasks.
//!
//! A [`PresenceMask`] holds one unsigned integer per table row. Bit `b` of a
//! row is set once the attribute column with presence bit `b` has been
//! written for that row, which separates "never written" from "written as
//! zero". Masks start 8 bits wide and are widened by doubling through
//! [`PresenceMask::resized`], which zero-extends each value into a new typed
//! array.

use std::ops::{BitOr, Shl};

use cuds_core::CudsError;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Bit width of a presence mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaskWidth {
    W8,
    W16,
    W32,
    W64,
}

impl MaskWidth {
    /// Number of bits per row.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// The doubled width, or `None` at 64 bits.
    #[must_use]
    pub const fn doubled(self) -> Option<Self> {
        match self {
            Self::W8 => Some(Self::W16),
            Self::W16 => Some(Self::W32),
            Self::W32 => Some(Self::W64),
            Self::W64 => None,
        }
    }

    /// The narrowest width reachable from `self` by doubling that has at
    /// least `columns` bits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaskOverflow`] past 64 columns.
    pub fn fitting(self, columns: usize) -> StoreResult<Self> {
        let mut width = self;
        while (width.bits() as usize) < columns {
            width = width
                .doubled()
                .ok_or(StoreError::MaskOverflow { columns })?;
        }
        Ok(width)
    }
}

/// One presence bitfield per row, stored at the mask's width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceMask {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl PresenceMask {
    /// A mask of `rows` empty bitfields.
    #[must_use]
    pub fn zeroed(width: MaskWidth, rows: usize) -> Self {
        match width {
            MaskWidth::W8 => Self::U8(vec![0; rows]),
            MaskWidth::W16 => Self::U16(vec![0; rows]),
            MaskWidth::W32 => Self::U32(vec![0; rows]),
            MaskWidth::W64 => Self::U64(vec![0; rows]),
        }
    }

    #[must_use]
    pub fn width(&self) -> MaskWidth {
        match self {
            Self::U8(_) => MaskWidth::W8,
            Self::U16(_) => MaskWidth::W16,
            Self::U32(_) => MaskWidth::W32,
            Self::U64(_) => MaskWidth::W64,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bitfield of `row`, zero-extended.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<u64> {
        match self {
            Self::U8(v) => v.get(row).copied().map(u64::from),
            Self::U16(v) => v.get(row).copied().map(u64::from),
            Self::U32(v) => v.get(row).copied().map(u64::from),
            Self::U64(v) => v.get(row).copied(),
        }
    }

    /// Returns `true` if `bit` of `row` is set.
    #[must_use]
    pub fn is_set(&self, row: usize, bit: u32) -> bool {
        bit < 64 && self.get(row).is_some_and(|v| v & (1 << bit) != 0)
    }

    /// Set `bit` of `row`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaskOverflow`] if `bit` is not below the width,
    /// or a `NotFound` model error if the row does not exist.
    pub fn set(&mut self, row: usize, bit: u32) -> StoreResult<()> {
        if bit >= self.width().bits() {
            return Err(StoreError::MaskOverflow {
                columns: bit as usize + 1,
            });
        }
        let found = match self {
            Self::U8(v) => set_bit(v, row, bit),
            Self::U16(v) => set_bit(v, row, bit),
            Self::U32(v) => set_bit(v, row, bit),
            Self::U64(v) => set_bit(v, row, bit),
        };
        if found {
            Ok(())
        } else {
            Err(CudsError::not_found("row", row).into())
        }
    }

    /// Append a row holding `bits`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaskOverflow`] if `bits` does not fit the width.
    pub fn push(&mut self, bits: u64) -> StoreResult<()> {
        let overflow = || StoreError::MaskOverflow {
            columns: 64 - bits.leading_zeros() as usize,
        };
        match self {
            Self::U8(v) => v.push(u8::try_from(bits).map_err(|_| overflow())?),
            Self::U16(v) => v.push(u16::try_from(bits).map_err(|_| overflow())?),
            Self::U32(v) => v.push(u32::try_from(bits).map_err(|_| overflow())?),
            Self::U64(v) => v.push(bits),
        }
        Ok(())
    }

    /// Overwrite the whole bitfield of `row` with `bits`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaskOverflow`] if `bits` does not fit the width,
    /// or a `NotFound` model error if the row does not exist.
    pub fn replace(&mut self, row: usize, bits: u64) -> StoreResult<()> {
        let overflow = || StoreError::MaskOverflow {
            columns: 64 - bits.leading_zeros() as usize,
        };
        let slot = match self {
            Self::U8(v) => put(v, row, u8::try_from(bits).map_err(|_| overflow())?),
            Self::U16(v) => put(v, row, u16::try_from(bits).map_err(|_| overflow())?),
            Self::U32(v) => put(v, row, u32::try_from(bits).map_err(|_| overflow())?),
            Self::U64(v) => put(v, row, bits),
        };
        if slot {
            Ok(())
        } else {
            Err(CudsError::not_found("row", row).into())
        }
    }

    /// Remove `row`, shifting every later row down by one.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if the row does not exist.
    pub fn remove(&mut self, row: usize) -> StoreResult<()> {
        if row >= self.len() {
            return Err(CudsError::not_found("row", row).into());
        }
        match self {
            Self::U8(v) => {
                v.remove(row);
            }
            Self::U16(v) => {
                v.remove(row);
            }
            Self::U32(v) => {
                v.remove(row);
            }
            Self::U64(v) => {
                v.remove(row);
            }
        }
        Ok(())
    }

    /// Rows whose bitfield is non-zero, in row order.
    pub fn occupied_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&row| self.get(row).is_some_and(|v| v != 0))
    }

    /// A copy of this mask at `width`.
    ///
    /// Widening zero-extends every value. Narrowing keeps the low bits.
    #[must_use]
    pub fn resized(&self, width: MaskWidth) -> Self {
        let values = (0..self.len()).filter_map(|row| self.get(row));
        match width {
            MaskWidth::W8 => Self::U8(values.map(|v| v as u8).collect()),
            MaskWidth::W16 => Self::U16(values.map(|v| v as u16).collect()),
            MaskWidth::W32 => Self::U32(values.map(|v| v as u32).collect()),
            MaskWidth::W64 => Self::U64(values.collect()),
        }
    }
}

fn set_bit<T>(values: &mut [T], row: usize, bit: u32) -> bool
where
    T: Copy + From<u8> + BitOr<Output = T> + Shl<u32, Output = T>,
{
    match values.get_mut(row) {
        Some(value) => {
            *value = *value | (T::from(1) << bit);
            true
        }
        None => false,
    }
}

fn put<T>(values: &mut [T], row: usize, bits: T) -> bool {
    match values.get_mut(row) {
        Some(value) => {
            *value = bits;
            true
        }
        None => false,
    }
}

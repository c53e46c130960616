pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod raw;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod soft;

use bitvec::prelude::*;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Fails with `GpioError::InvalidArgument` if an index appears more than once.
pub(crate) fn check_distinct(indices: &[usize]) -> GpioResult<()> {
    for (i, index) in indices.iter().enumerate() {
        if indices[i + 1..].contains(index) {
            return Err(GpioError::InvalidArgument);
        }
    }
    Ok(())
}

/// Direction of a GPIO line.
///
/// Freshly claimed lines start as inputs, which is also the state they are returned to
/// when released.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioDirection {
    #[default]
    Input,
    Output,
}

pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the GPIO line at the given index.
    ///
    /// The line stays claimed until the returned object is dropped, which releases it back to
    /// the input direction.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the line is already claimed.
    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>>;

    /// Claims a group of GPIO lines at the specific indices, to be driven together.
    ///
    /// The first index is the least significant bit of [GpioLineGroup::write_bits] and
    /// [GpioLineGroup::read_bits].
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if an index is out of range or listed twice.
    /// - `GpioError::AlreadyInUse` if a line is already claimed.
    fn get_line_group<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioLineGroup<N> + '_>>;
}

/// A single claimed GPIO line.
pub trait GpioLine: Debug {
    /// Gets the index of the line on its driver.
    fn index(&self) -> usize;

    /// Gets the current direction of the line.
    fn direction(&self) -> GpioDirection;

    /// Switches the line between input and output.
    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()>;

    /// Drives the line high or low.
    fn write(&mut self, value: bool) -> GpioResult<()>;

    /// Reads the level of the line.
    fn read(&self) -> GpioResult<bool>;
}

/// A group of claimed GPIO lines, switched and written together.
pub trait GpioLineGroup<const N: usize>: Debug {
    /// Gets the indices of the lines, LSb first.
    fn indices(&self) -> [usize; N];

    fn direction(&self) -> GpioDirection;

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()>;

    fn write(&mut self, values: &[bool; N]) -> GpioResult<()>;

    fn read(&self) -> GpioResult<[bool; N]>;

    /// Gets the bitmask of the line positions in the group.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if a line index doesn't fit in 64 bits.
    fn mask(&self) -> GpioResult<u64> {
        self.indices().iter().try_fold(0u64, |mask, &index| {
            u32::try_from(index)
                .ok()
                .and_then(|shift| 1u64.checked_shl(shift))
                .map(|bit| mask | bit)
                .ok_or(GpioError::InvalidArgument)
        })
    }

    /// Writes the low `N` bits of the value to the lines, LSb first.
    /// Higher bits are ignored.
    fn write_bits(&mut self, value: u8) -> GpioResult<()> {
        if N > 8 {
            return Err(GpioError::InvalidArgument);
        }

        let bits = value.view_bits::<Lsb0>();
        let mut values = [false; N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = bits[i];
        }
        self.write(&values)
    }

    /// Reads the lines and returns them as the low `N` bits of a byte, LSb first.
    fn read_bits(&self) -> GpioResult<u8> {
        if N > 8 {
            return Err(GpioError::InvalidArgument);
        }

        let values = self.read()?;
        let mut value = 0u8;
        let bits = value.view_bits_mut::<Lsb0>();
        for (i, &level) in values.iter().enumerate() {
            bits.set(i, level);
        }
        Ok(value)
    }
}

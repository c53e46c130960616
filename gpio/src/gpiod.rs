//! GpiodDriver implementation for managing GPIO lines using the gpiod library.
//!
//! Works on any Linux board exposing a `/dev/gpiochipN` character device. Switching the
//! direction of a line re-requests it from the kernel, so it's noticeably slower than
//! [RawGpioDriver](crate::raw::RawGpioDriver) for bidirectional buses.
use crate::{
    check_distinct, GpioDirection, GpioDriver, GpioError, GpioLine, GpioLineGroup, GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO lines.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_pins: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        let bits = BitVec::repeat(false, n);
        Self {
            chip,
            used_pins: bits,
        }
    }

    /// Opens the chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: &str) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path)?))
    }

    fn request<const N: usize>(
        &self,
        indices: [usize; N],
        direction: GpioDirection,
    ) -> GpioResult<GpiodLines> {
        let offsets = indices.iter().map(|&index| index as u32).collect::<Vec<_>>();
        let lines = match direction {
            GpioDirection::Input => GpiodLines::Input(self.chip.request_lines(
                gpiod::Options::input(offsets).consumer(env!("CARGO_PKG_NAME")),
            )?),
            GpioDirection::Output => GpiodLines::Output(self.chip.request_lines(
                gpiod::Options::output(offsets).consumer(env!("CARGO_PKG_NAME")),
            )?),
        };
        Ok(lines)
    }

    fn claim<const N: usize>(&self, indices: [usize; N]) -> GpioResult<()> {
        let n = self.count()?;

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }
        check_distinct(&indices)?;

        if indices.iter().any(|&index| self.used_pins[index]) {
            return Err(GpioError::AlreadyInUse);
        }

        for index in indices {
            self.used_pins.set_aliased(index, true);
        }
        Ok(())
    }

    fn release(&self, index: usize) {
        self.used_pins.set_aliased(index, false);
        trace!("Released line {}", index);
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        self.claim([index])?;

        let lines = match self.request([index], GpioDirection::Input) {
            Ok(lines) => lines,
            Err(err) => {
                self.release(index);
                return Err(err);
            }
        };

        Ok(Box::new(GpiodLine {
            group: GpiodLineGroup {
                driver: self,
                pin_indices: [index],
                lines: Some(lines),
            },
        }))
    }

    fn get_line_group<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioLineGroup<N> + '_>> {
        self.claim(indices)?;

        let lines = match self.request(indices, GpioDirection::Input) {
            Ok(lines) => lines,
            Err(err) => {
                indices.iter().for_each(|&index| self.release(index));
                return Err(err);
            }
        };

        Ok(Box::new(GpiodLineGroup {
            driver: self,
            pin_indices: indices,
            lines: Some(lines),
        }))
    }
}

/// The kernel request backing a line or group. Its type encodes the direction.
enum GpiodLines {
    Input(gpiod::Lines<gpiod::Input>),
    Output(gpiod::Lines<gpiod::Output>),
}

struct GpiodLineGroup<'a, const N: usize> {
    driver: &'a GpiodDriver,
    pin_indices: [usize; N],
    // Only `None` while being re-requested
    lines: Option<GpiodLines>,
}

impl<const N: usize> Debug for GpiodLineGroup<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}[{:?}]", self.driver, self.pin_indices, self.direction())
    }
}

impl<const N: usize> GpioLineGroup<N> for GpiodLineGroup<'_, N> {
    fn indices(&self) -> [usize; N] {
        self.pin_indices
    }

    fn direction(&self) -> GpioDirection {
        match self.lines {
            Some(GpiodLines::Output(_)) => GpioDirection::Output,
            _ => GpioDirection::Input,
        }
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        if self.lines.is_some() && self.direction() == direction {
            return Ok(());
        }
        // The old request has to be dropped before the kernel lets us take the lines again
        self.lines = None;
        self.lines = Some(self.driver.request(self.pin_indices, direction)?);
        Ok(())
    }

    fn write(&mut self, values: &[bool; N]) -> GpioResult<()> {
        match &self.lines {
            Some(GpiodLines::Output(lines)) => {
                lines.set_values(*values)?;
                Ok(())
            }
            _ => Err(GpioError::NotSupported),
        }
    }

    fn read(&self) -> GpioResult<[bool; N]> {
        match &self.lines {
            Some(GpiodLines::Input(lines)) => Ok(lines.get_values([false; N])?),
            _ => Err(GpioError::NotSupported),
        }
    }
}

impl<const N: usize> Drop for GpiodLineGroup<'_, N> {
    fn drop(&mut self) {
        self.lines = None;
        for &index in &self.pin_indices {
            self.driver.release(index);
        }
    }
}

/// A single line, backed by a one-line request.
struct GpiodLine<'a> {
    group: GpiodLineGroup<'a, 1>,
}

impl Debug for GpiodLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.group.fmt(f)
    }
}

impl GpioLine for GpiodLine<'_> {
    fn index(&self) -> usize {
        self.group.pin_indices[0]
    }

    fn direction(&self) -> GpioDirection {
        self.group.direction()
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        self.group.set_direction(direction)
    }

    fn write(&mut self, value: bool) -> GpioResult<()> {
        self.group.write(&[value])
    }

    fn read(&self) -> GpioResult<bool> {
        Ok(self.group.read()?[0])
    }
}

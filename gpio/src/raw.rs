//! Register-level GPIO driver for the Raspberry Pi, using a memory map of the GPIO peripheral.
use crate::{
    check_distinct, GpioDirection, GpioDriver, GpioError, GpioLine, GpioLineGroup, GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000
    // #[cfg(target_pointer_width = "64")]
    // const GPIO_BASE: u32 = 0xFE200000;
    // #[cfg(target_pointer_width = "32")]
    const GPIO_BASE: u32 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    // Register offsets, in bytes
    const GPSET0: usize = 0x1c;
    const GPCLR0: usize = 0x28;
    const GPLEV0: usize = 0x34;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
                .offset(offset)
                .len(4096)
                .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    /// Maps `/dev/gpiomem`, which exposes only the GPIO block and doesn't need root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block out of `/dev/mem`. Needs root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn check_pin(pin_index: usize) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    pub fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }
        Self::check_pin(pin_index)?;

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift); // Clear the bits for this pin
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    pub(crate) fn raw_set_direction(&self, pin_index: usize, direction: GpioDirection) -> GpioResult<()> {
        match direction {
            GpioDirection::Input => self.raw_set_pin_function(pin_index, 0),
            GpioDirection::Output => self.raw_set_pin_function(pin_index, 1),
        }
    }

    /// Sets and clears the pins in `mask` according to `values`, in one register write per bank.
    pub(crate) fn raw_put_masked(&self, mask: u64, values: u64) -> GpioResult<()> {
        if mask >> Self::PIN_COUNT != 0 {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        for bank in 0..2 {
            let set = ((mask & values) >> (bank * 32)) as u32;
            let clear = ((mask & !values) >> (bank * 32)) as u32;
            // GPSETn/GPCLRn registers, writing 0 bits has no effect
            if set != 0 {
                unsafe { mmap.add(Self::GPSET0 / 4 + bank).write_volatile(set) };
            }
            if clear != 0 {
                unsafe { mmap.add(Self::GPCLR0 / 4 + bank).write_volatile(clear) };
            }
        }

        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        Self::check_pin(pin_index)?;
        self.raw_put_masked(1 << pin_index, if high { u64::MAX } else { 0 })
    }

    pub(crate) fn raw_get_pin_level(&self, pin_index: usize) -> GpioResult<bool> {
        Self::check_pin(pin_index)?;

        let mmap = self.mmap.as_ptr() as *const u32;
        // GPLEVn register
        let register_ptr = unsafe { mmap.add(Self::GPLEV0 / 4 + pin_index / 32) };
        let shift = pin_index % 32;

        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> shift) & 1 != 0)
    }

    pub(crate) fn raw_reset(&self, pin_index: usize) -> GpioResult<()> {
        self.raw_set_pin_function(pin_index, 0)?;
        self.raw_set_pin_output(pin_index, false)?;
        Ok(())
    }

    fn claim(&self, pin_index: usize) {
        self.used_pins.set_aliased(pin_index, true);
    }

    fn release(&self, pin_index: usize) {
        // Back to input, so the line doesn't keep driving anything
        _ = self.raw_set_pin_function(pin_index, 0);
        self.used_pins.set_aliased(pin_index, false);
        trace!("Released pin {}", pin_index);
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.claim(index);
        self.raw_reset(index)?;

        Ok(Box::new(RawGpioLine {
            driver: self,
            pin_index: index,
            direction: GpioDirection::Input,
        }))
    }

    fn get_line_group<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioLineGroup<N> + '_>> {
        let n = self.count()?;

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }
        check_distinct(&indices)?;

        if indices.iter().any(|&index| self.used_pins[index]) {
            return Err(GpioError::AlreadyInUse);
        }

        for &index in &indices {
            self.claim(index);
            self.raw_reset(index)?;
        }

        Ok(Box::new(RawGpioLineGroup {
            driver: self,
            pin_indices: indices,
            direction: GpioDirection::Input,
        }))
    }
}

struct RawGpioLine<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
    direction: GpioDirection,
}

impl Debug for RawGpioLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioLine for RawGpioLine<'_> {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn direction(&self) -> GpioDirection {
        self.direction
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        self.driver.raw_set_direction(self.pin_index, direction)?;
        self.direction = direction;
        Ok(())
    }

    fn write(&mut self, value: bool) -> GpioResult<()> {
        self.driver.raw_set_pin_output(self.pin_index, value)
    }

    fn read(&self) -> GpioResult<bool> {
        self.driver.raw_get_pin_level(self.pin_index)
    }
}

impl Drop for RawGpioLine<'_> {
    fn drop(&mut self) {
        self.driver.release(self.pin_index);
    }
}

struct RawGpioLineGroup<'a, const N: usize> {
    driver: &'a RawGpioDriver,
    pin_indices: [usize; N],
    direction: GpioDirection,
}

impl<const N: usize> Debug for RawGpioLineGroup<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> GpioLineGroup<N> for RawGpioLineGroup<'_, N> {
    fn indices(&self) -> [usize; N] {
        self.pin_indices
    }

    fn direction(&self) -> GpioDirection {
        self.direction
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        if direction == self.direction {
            return Ok(());
        }
        for &pin_index in &self.pin_indices {
            self.driver.raw_set_direction(pin_index, direction)?;
        }
        self.direction = direction;
        Ok(())
    }

    fn write(&mut self, values: &[bool; N]) -> GpioResult<()> {
        let mask = self.mask()?;
        let levels = self
            .pin_indices
            .iter()
            .zip(values)
            .filter(|&(_, &value)| value)
            .fold(0u64, |levels, (&pin_index, _)| levels | (1 << pin_index));
        self.driver.raw_put_masked(mask, levels)
    }

    fn read(&self) -> GpioResult<[bool; N]> {
        let mut values = [false; N];
        for (i, &pin_index) in self.pin_indices.iter().enumerate() {
            values[i] = self.driver.raw_get_pin_level(pin_index)?;
        }
        Ok(values)
    }
}

impl<const N: usize> Drop for RawGpioLineGroup<'_, N> {
    fn drop(&mut self) {
        for &pin_index in &self.pin_indices {
            self.driver.release(pin_index);
        }
    }
}

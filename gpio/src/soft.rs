use crate::{
    check_distinct, GpioDirection, GpioDriver, GpioError, GpioLine, GpioLineGroup, GpioResult,
};
use std::fmt::Debug;

/// A line group made of individually claimed lines, driven one by one.
///
/// Useful when the backend has no native group support, or when the lines of a data bus come
/// from different places.
pub struct SoftGpioGroup<'a, const N: usize> {
    lines: [Box<dyn GpioLine + 'a>; N],
    direction: GpioDirection,
}

impl<'a, const N: usize> SoftGpioGroup<'a, N> {
    pub fn new(lines: [Box<dyn GpioLine + 'a>; N]) -> Self {
        // Lines might not agree yet, the first set_direction call aligns them
        let direction = lines
            .first()
            .map(|line| line.direction())
            .unwrap_or_default();
        Self { lines, direction }
    }

    /// Claims the lines at the given indices one by one.
    pub fn claim<G: GpioDriver>(driver: &'a G, indices: [usize; N]) -> GpioResult<Self> {
        check_distinct(&indices)?;
        let lines = indices
            .iter()
            .map(|&index| driver.get_line(index))
            .collect::<GpioResult<Vec<_>>>()?;
        let lines: [Box<dyn GpioLine + 'a>; N] = lines
            .try_into()
            .map_err(|_| GpioError::InvalidArgument)?;
        Ok(Self::new(lines))
    }
}

impl<const N: usize> Debug for SoftGpioGroup<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftGpioGroup({:?})", self.lines)
    }
}

impl<const N: usize> GpioLineGroup<N> for SoftGpioGroup<'_, N> {
    fn indices(&self) -> [usize; N] {
        let mut indices = [0; N];
        for (i, line) in self.lines.iter().enumerate() {
            indices[i] = line.index();
        }
        indices
    }

    fn direction(&self) -> GpioDirection {
        self.direction
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        for line in self.lines.iter_mut() {
            if line.direction() != direction {
                line.set_direction(direction)?;
            }
        }
        self.direction = direction;
        Ok(())
    }

    fn write(&mut self, values: &[bool; N]) -> GpioResult<()> {
        for (line, &value) in self.lines.iter_mut().zip(values) {
            line.write(value)?;
        }
        Ok(())
    }

    fn read(&self) -> GpioResult<[bool; N]> {
        let mut values = [false; N];
        for (i, line) in self.lines.iter().enumerate() {
            values[i] = line.read()?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimEvent, SimGpioDriver};

    #[test]
    fn claims_lines_individually() {
        let gpio = SimGpioDriver::new(8);
        let group = SoftGpioGroup::<4>::claim(&gpio, [4, 5, 6, 7]).unwrap();

        assert_eq!(group.indices(), [4, 5, 6, 7]);
        assert_eq!(group.mask(), Ok(0b1111_0000));
        assert!(gpio.is_claimed(5));
        assert!(!gpio.is_claimed(3));
    }

    #[test]
    fn claim_fails_on_used_line_and_releases_the_rest() {
        let gpio = SimGpioDriver::new(8);
        let _taken = gpio.get_line(6).unwrap();

        let result = SoftGpioGroup::<4>::claim(&gpio, [4, 5, 6, 7]);

        assert_eq!(result.err(), Some(GpioError::AlreadyInUse));
        assert!(!gpio.is_claimed(4));
        assert!(!gpio.is_claimed(5));
    }

    #[test]
    fn claim_rejects_repeated_line() {
        let gpio = SimGpioDriver::new(8);

        let result = SoftGpioGroup::<4>::claim(&gpio, [4, 4, 5, 6]);

        assert_eq!(result.err(), Some(GpioError::InvalidArgument));
        assert!((0..8).all(|index| !gpio.is_claimed(index)));
        assert_eq!(gpio.events(), vec![]);
    }

    #[test]
    fn mask_fails_past_64_lines() {
        let gpio = SimGpioDriver::new(70);
        let group = gpio.get_line_group([1, 65]).unwrap();

        assert_eq!(group.mask(), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn writes_and_reads_bits_lsb_first() {
        let gpio = SimGpioDriver::new(8);
        let mut group = SoftGpioGroup::<4>::claim(&gpio, [0, 1, 2, 3]).unwrap();

        group.set_direction(GpioDirection::Output).unwrap();
        group.write_bits(0b1010_0110).unwrap();

        assert_eq!(
            [gpio.level(0), gpio.level(1), gpio.level(2), gpio.level(3)],
            [false, true, true, false]
        );
        assert_eq!(group.read_bits().unwrap(), 0b0110);
    }

    #[test]
    fn direction_switch_touches_every_line() {
        let gpio = SimGpioDriver::new(4);
        let mut group = SoftGpioGroup::<2>::claim(&gpio, [1, 2]).unwrap();
        gpio.clear_events();

        group.set_direction(GpioDirection::Output).unwrap();

        assert_eq!(
            gpio.events(),
            vec![
                SimEvent::Direction(1, GpioDirection::Output),
                SimEvent::Direction(2, GpioDirection::Output),
            ]
        );
        assert_eq!(group.direction(), GpioDirection::Output);
    }
}

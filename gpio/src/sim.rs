//! Simulated GPIO backend.
//!
//! [SimGpioDriver] keeps the level and direction of every line in memory, records every
//! operation as a [SimEvent] stamped with a simulated clock, and lets a [SimDevice] react to
//! level changes and drive lines back, like a chip soldered to the other end of the wires.
//! [SimDelay] advances the simulated clock instead of sleeping, so timing can be checked
//! without waiting for it.
use crate::soft::SoftGpioGroup;
use crate::{GpioDirection, GpioDriver, GpioError, GpioLine, GpioLineGroup, GpioResult};
use embedded_hal::delay::DelayNs;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::time::Duration;

/// An operation on a simulated line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimEvent {
    Claim(usize),
    Direction(usize, GpioDirection),
    Write(usize, bool),
    Read(usize, bool),
    Release(usize),
}

/// A simulated device attached to the lines of a [SimGpioDriver].
pub trait SimDevice: Debug {
    /// Called whenever the level seen on a line changes, with the new level.
    fn on_change(&mut self, pins: &mut SimPins<'_>, index: usize, level: bool);
}

#[derive(Copy, Clone, Debug, Default)]
struct SimLine {
    claimed: bool,
    direction: GpioDirection,
    // Output latch, what the host drives
    output: bool,
    // What the attached device drives, seen while the line is an input
    input: bool,
}

impl SimLine {
    fn level(&self) -> bool {
        match self.direction {
            GpioDirection::Output => self.output,
            GpioDirection::Input => self.input,
        }
    }
}

/// The lines, as seen from the device side.
pub struct SimPins<'a> {
    lines: &'a mut [SimLine],
    now: Duration,
    event_index: usize,
}

impl SimPins<'_> {
    /// Gets the level on the line.
    pub fn level(&self, index: usize) -> bool {
        self.lines.get(index).is_some_and(SimLine::level)
    }

    /// Drives the line from the device side. Only visible to the host while the line is an input.
    pub fn drive(&mut self, index: usize, level: bool) {
        if let Some(line) = self.lines.get_mut(index) {
            line.input = level;
        }
    }

    /// Gets the simulated time of the change.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Gets the index of the event that caused the change.
    pub fn event_index(&self) -> usize {
        self.event_index
    }
}

#[derive(Debug, Default)]
struct SimState {
    lines: Vec<SimLine>,
    events: Vec<(Duration, SimEvent)>,
    now: Duration,
    device: Option<Box<dyn SimDevice>>,
}

impl SimState {
    fn record(&mut self, event: SimEvent) {
        self.events.push((self.now, event));
    }

    fn update(&mut self, index: usize, f: impl FnOnce(&mut SimLine)) {
        let before = self.lines[index].level();
        f(&mut self.lines[index]);
        let after = self.lines[index].level();

        if before == after {
            return;
        }

        if let Some(mut device) = self.device.take() {
            let mut pins = SimPins {
                lines: &mut self.lines,
                now: self.now,
                event_index: self.events.len().saturating_sub(1),
            };
            device.on_change(&mut pins, index, after);
            self.device = Some(device);
        }
    }
}

/// A GPIO driver backed by memory. Clones share the same lines.
#[derive(Clone)]
pub struct SimGpioDriver {
    state: Rc<RefCell<SimState>>,
}

impl SimGpioDriver {
    pub fn new(count: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                lines: vec![SimLine::default(); count],
                ..Default::default()
            })),
        }
    }

    /// Attaches a device to the lines, replacing the previous one.
    pub fn attach(&self, device: impl SimDevice + 'static) {
        self.state.borrow_mut().device = Some(Box::new(device));
    }

    /// Creates a delay that advances the simulated clock of this driver.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            state: self.state.clone(),
        }
    }

    /// Gets the simulated time elapsed since the driver was created.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.iter().map(|&(_, event)| event).collect()
    }

    pub fn timed_events(&self) -> Vec<(Duration, SimEvent)> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Gets the level on the line, as the host would read it.
    pub fn level(&self, index: usize) -> bool {
        self.state.borrow().lines[index].level()
    }

    pub fn direction(&self, index: usize) -> GpioDirection {
        self.state.borrow().lines[index].direction
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.state.borrow().lines[index].claimed
    }

    fn set_direction(&self, index: usize, direction: GpioDirection) {
        let mut state = self.state.borrow_mut();
        state.record(SimEvent::Direction(index, direction));
        state.update(index, |line| line.direction = direction);
    }

    fn write(&self, index: usize, value: bool) {
        let mut state = self.state.borrow_mut();
        state.record(SimEvent::Write(index, value));
        state.update(index, |line| line.output = value);
    }

    fn read(&self, index: usize) -> bool {
        let mut state = self.state.borrow_mut();
        let level = state.lines[index].level();
        state.record(SimEvent::Read(index, level));
        level
    }

    fn release(&self, index: usize) {
        let mut state = self.state.borrow_mut();
        state.record(SimEvent::Release(index));
        state.update(index, |line| {
            line.claimed = false;
            line.direction = GpioDirection::Input;
        });
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpioDriver({})", self.state.borrow().lines.len())
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.state.borrow().lines.len())
    }

    fn get_line(&self, index: usize) -> GpioResult<Box<dyn GpioLine + '_>> {
        let mut state = self.state.borrow_mut();
        let line = state
            .lines
            .get_mut(index)
            .ok_or(GpioError::InvalidArgument)?;

        if line.claimed {
            return Err(GpioError::AlreadyInUse);
        }

        line.claimed = true;
        state.record(SimEvent::Claim(index));

        Ok(Box::new(SimGpioLine {
            driver: self,
            index,
        }))
    }

    fn get_line_group<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioLineGroup<N> + '_>> {
        Ok(Box::new(SoftGpioGroup::claim(self, indices)?))
    }
}

struct SimGpioLine<'a> {
    driver: &'a SimGpioDriver,
    index: usize,
}

impl Debug for SimGpioLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.index)
    }
}

impl GpioLine for SimGpioLine<'_> {
    fn index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> GpioDirection {
        self.driver.direction(self.index)
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        self.driver.set_direction(self.index, direction);
        Ok(())
    }

    fn write(&mut self, value: bool) -> GpioResult<()> {
        self.driver.write(self.index, value);
        Ok(())
    }

    fn read(&self) -> GpioResult<bool> {
        Ok(self.driver.read(self.index))
    }
}

impl Drop for SimGpioLine<'_> {
    fn drop(&mut self) {
        self.driver.release(self.index);
    }
}

/// A [DelayNs] that advances the simulated clock of a [SimGpioDriver].
#[derive(Clone)]
pub struct SimDelay {
    state: Rc<RefCell<SimState>>,
}

impl Debug for SimDelay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDelay({:?})", self.state.borrow().now)
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().now += Duration::from_nanos(ns as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes line 0 onto line 1.
    #[derive(Debug)]
    struct Loopback;

    impl SimDevice for Loopback {
        fn on_change(&mut self, pins: &mut SimPins<'_>, index: usize, level: bool) {
            if index == 0 {
                pins.drive(1, level);
            }
        }
    }

    #[test]
    fn lines_are_claimed_exclusively() {
        let gpio = SimGpioDriver::new(4);

        let line = gpio.get_line(2).unwrap();
        assert_eq!(gpio.get_line(2).err(), Some(GpioError::AlreadyInUse));
        assert_eq!(gpio.get_line(4).err(), Some(GpioError::InvalidArgument));

        drop(line);
        assert!(!gpio.is_claimed(2));
        assert!(gpio.get_line(2).is_ok());
    }

    #[test]
    fn release_returns_line_to_input() {
        let gpio = SimGpioDriver::new(2);
        let mut line = gpio.get_line(0).unwrap();
        line.set_direction(GpioDirection::Output).unwrap();
        line.write(true).unwrap();
        drop(line);

        assert_eq!(gpio.direction(0), GpioDirection::Input);
        assert_eq!(gpio.events().last(), Some(&SimEvent::Release(0)));
    }

    #[test]
    fn device_drives_input_lines() {
        let gpio = SimGpioDriver::new(2);
        gpio.attach(Loopback);
        let mut out = gpio.get_line(0).unwrap();
        let input = gpio.get_line(1).unwrap();

        out.set_direction(GpioDirection::Output).unwrap();
        out.write(true).unwrap();
        assert!(input.read().unwrap());

        out.write(false).unwrap();
        assert!(!input.read().unwrap());
    }

    #[test]
    fn delay_advances_clock_and_stamps_events() {
        let gpio = SimGpioDriver::new(1);
        let mut delay = gpio.delay();
        let mut line = gpio.get_line(0).unwrap();

        delay.delay_ms(5);
        delay.delay_us(3);
        line.set_direction(GpioDirection::Output).unwrap();

        assert_eq!(gpio.now(), Duration::from_micros(5003));
        assert_eq!(
            gpio.timed_events().last(),
            Some(&(Duration::from_micros(5003), SimEvent::Direction(0, GpioDirection::Output)))
        );
    }
}

//! HD44780 instruction set.
//!
//! Every instruction is a single byte: the opcode is the highest set bit, and the bits below
//! it are its flags. There is no way to change a single flag on the controller, so the flag
//! groups the driver changes at runtime are kept as whole bytes ([DisplayControl], [EntryMode],
//! [FunctionSet]) and resent in full.

use bitfield::bitfield;

pub const CLEAR_DISPLAY: u8 = 0b0000_0001;
pub const RETURN_HOME: u8 = 0b0000_0010;
pub const ENTRY_MODE_SET: u8 = 0b0000_0100;
pub const DISPLAY_CONTROL: u8 = 0b0000_1000;
pub const CURSOR_SHIFT: u8 = 0b0001_0000;
pub const FUNCTION_SET: u8 = 0b0010_0000;
pub const SET_CGRAM_ADDRESS: u8 = 0b0100_0000;
pub const SET_DDRAM_ADDRESS: u8 = 0b1000_0000;

// Cursor shift flags
pub const SHIFT_DISPLAY: u8 = 0b0000_1000;
pub const SHIFT_RIGHT: u8 = 0b0000_0100;

/// Busy flag bit of the status byte. The rest of the byte is the address counter.
pub const BUSY_FLAG: u8 = 0b1000_0000;
pub const ADDRESS_MASK: u8 = 0b0111_1111;

/// Upper nibble of an 8-bit function set, used to resynchronize a controller in unknown state.
pub const SYNC_8BIT_NIBBLE: u8 = 0b0011;
/// Upper nibble of a 4-bit function set, switching the interface to 4-bit.
pub const SYNC_4BIT_NIBBLE: u8 = 0b0010;

/// Amount of rows the controller can address.
pub const MAX_ROWS: usize = 4;

bitfield! {
    /// Flags of the display on/off control instruction.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct DisplayControl(u8);
    impl Debug;
    pub display_on, set_display_on: 2;
    pub cursor_on, set_cursor_on: 1;
    pub blink_on, set_blink_on: 0;
}

bitfield! {
    /// Flags of the entry mode set instruction.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct EntryMode(u8);
    impl Debug;
    /// Address counter increments after each write, so text flows left to right.
    pub left_to_right, set_left_to_right: 1;
    /// The display shifts on each write instead of the cursor moving.
    pub autoscroll, set_autoscroll: 0;
}

bitfield! {
    /// Flags of the function set instruction.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct FunctionSet(u8);
    impl Debug;
    pub eight_bit, set_eight_bit: 4;
    pub two_lines, set_two_lines: 3;
    /// 5x10 dots font. Only available in one-line mode.
    pub large_font, set_large_font: 2;
}

impl DisplayControl {
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Gets the full instruction byte.
    pub fn command(&self) -> u8 {
        DISPLAY_CONTROL | self.0
    }
}

impl EntryMode {
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn command(&self) -> u8 {
        ENTRY_MODE_SET | self.0
    }
}

impl FunctionSet {
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn command(&self) -> u8 {
        FUNCTION_SET | self.0
    }
}

/// DDRAM base address of every row.
///
/// The controller has two 40-byte lines at `0x00` and `0x40`. Four-row modules are wired as
/// two long lines folded in half, so rows 2 and 3 continue rows 0 and 1 right after the
/// visible columns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RowOffsets([u8; MAX_ROWS]);

impl RowOffsets {
    pub fn for_columns(cols: u8) -> Self {
        RowOffsets([0x00, 0x40, cols, 0x40u8.wrapping_add(cols)])
    }

    pub fn as_array(&self) -> [u8; MAX_ROWS] {
        self.0
    }

    /// Gets the DDRAM address of the position.
    ///
    /// The row is clamped to the last available row, both of the display (`lines`) and of the
    /// controller. The column isn't checked, and the address wraps at 7 bits like the
    /// instruction does.
    pub fn address(&self, col: u8, row: u8, lines: u8) -> u8 {
        let row = (row as usize)
            .min(MAX_ROWS - 1)
            .min(lines.saturating_sub(1) as usize);
        self.0[row].wrapping_add(col) & ADDRESS_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_offsets_follow_memory_map() {
        assert_eq!(RowOffsets::for_columns(16).as_array(), [0x00, 0x40, 0x10, 0x50]);
        assert_eq!(RowOffsets::for_columns(20).as_array(), [0x00, 0x40, 0x14, 0x54]);
    }

    #[test]
    fn address_clamps_row_to_lines() {
        let offsets = RowOffsets::for_columns(16);
        assert_eq!(offsets.address(3, 1, 2), 0x43);
        assert_eq!(offsets.address(3, 7, 2), 0x43);
        assert_eq!(offsets.address(0, 1, 1), 0x00);
    }

    #[test]
    fn address_clamps_row_to_table() {
        let offsets = RowOffsets::for_columns(20);
        assert_eq!(offsets.address(0, 200, 8), 0x54);
        assert_eq!(offsets.address(1, 4, 6), 0x55);
    }

    #[test]
    fn address_wraps_at_seven_bits() {
        let offsets = RowOffsets::for_columns(16);
        assert_eq!(offsets.address(0x40, 1, 2), 0x00);
        assert_eq!(SET_DDRAM_ADDRESS | offsets.address(0x45, 1, 2), 0x85);
    }

    #[test]
    fn flag_bytes_match_instruction_layout() {
        let mut control = DisplayControl::default();
        control.set_display_on(true);
        assert_eq!(control.command(), 0b0000_1100);
        control.set_blink_on(true);
        assert_eq!(control.command(), 0b0000_1101);
        control.set_display_on(false);
        assert_eq!(control.bits(), 0b0000_0001);

        let mut mode = EntryMode::default();
        mode.set_left_to_right(true);
        assert_eq!(mode.command(), 0b0000_0110);
        mode.set_autoscroll(true);
        assert_eq!(mode.command(), 0b0000_0111);

        let mut function = FunctionSet::default();
        function.set_two_lines(true);
        assert_eq!(function.command(), 0b0010_1000);
        function.set_eight_bit(true);
        assert_eq!(function.command(), 0b0011_1000);
    }
}

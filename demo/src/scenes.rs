use embedded_hal::delay::DelayNs;
use hd44780_gpio::GpioResult;
use hd44780_gpio::lcd::hd44780::Hd44780;
use hd44780_gpio::lcd::hd44780::sim::SimHd44780;
use log::info;
use sysinfo::System;
use time::OffsetDateTime;

pub const SMILEY: [u8; 8] = [
    0b00000, 0b10001, 0b00000, 0b00000, 0b10001, 0b01110, 0b00000, 0b00000,
];

const UNKNOWN_STR: &str = "???";

/// Paces the demo, and prints the simulated display after every pause.
pub struct Stage<D> {
    delay: D,
    cols: u8,
    pause_ms: u32,
    model: Option<SimHd44780>,
}

impl<D: DelayNs> Stage<D> {
    pub fn new(delay: D, cols: u8, pause_ms: u32, model: Option<SimHd44780>) -> Self {
        Stage {
            delay,
            cols,
            pause_ms,
            model,
        }
    }

    pub fn wait(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Waits the base pause multiplied by `num / den`.
    pub fn pause<D2: DelayNs>(&mut self, lcd: &Hd44780<'_, D2>, num: u32, den: u32) {
        if let Some(model) = &self.model {
            let offsets = lcd.row_offsets().as_array();
            for (row, &offset) in offsets.iter().take(lcd.lines() as usize).enumerate() {
                info!("LCD {}: |{}|", row, model.ddram_text(offset, self.cols as usize));
            }
        }
        self.delay.delay_ms(self.pause_ms * num / den);
    }
}

/// Greets in the current bus mode, with the smiley in the top right corner.
pub fn hello<D: DelayNs, S: DelayNs>(
    lcd: &mut Hd44780<'_, D>,
    stage: &mut Stage<S>,
    mode: &str,
) -> GpioResult<()> {
    lcd.create_char(0, &SMILEY)?;
    lcd.set_cursor(0, 0)?;
    lcd.write_string("Hello Pi!")?;
    lcd.write_string_at(&format!("LCD {} mode.", mode), 0, 1)?;
    lcd.write_char_at(0, stage.cols.saturating_sub(1), 0)?;
    stage.pause(lcd, 1, 1);
    Ok(())
}

/// Shows the host name and OS on the display.
pub fn banner<D: DelayNs, S: DelayNs>(
    lcd: &mut Hd44780<'_, D>,
    stage: &mut Stage<S>,
) -> GpioResult<()> {
    let host = System::host_name().unwrap_or_else(|| UNKNOWN_STR.to_string());
    let os = System::name().unwrap_or_else(|| UNKNOWN_STR.to_string());
    info!("Host {}, OS {}, arch {}", host, os, System::cpu_arch());

    let cols = stage.cols as usize;
    lcd.clear()?;
    lcd.write_string(&host.chars().take(cols).collect::<String>())?;
    lcd.write_string_at(&os.chars().take(cols).collect::<String>(), 0, 1)?;
    stage.pause(lcd, 1, 1);
    Ok(())
}

/// Runs through the display features one by one.
pub fn tour<D: DelayNs, S: DelayNs>(
    lcd: &mut Hd44780<'_, D>,
    stage: &mut Stage<S>,
) -> GpioResult<()> {
    lcd.write_string_at("Clearing.......", 0, 1)?;
    stage.pause(lcd, 1, 1);
    lcd.clear()?;
    stage.pause(lcd, 1, 1);

    lcd.write_string("Going home!")?;
    stage.pause(lcd, 1, 1);
    lcd.home()?;
    lcd.write_string("Being")?;
    stage.pause(lcd, 1, 1);

    lcd.clear()?;
    lcd.write_string("Display Off/On")?;
    stage.pause(lcd, 1, 1);
    lcd.display_off()?;
    stage.pause(lcd, 1, 2);
    lcd.display_on()?;
    stage.pause(lcd, 1, 2);

    lcd.clear()?;
    lcd.write_string("Cursor On...")?;
    lcd.cursor_on()?;
    stage.pause(lcd, 1, 2);
    lcd.write_string_at("Blinking...", 0, 1)?;
    lcd.blink_on()?;
    stage.pause(lcd, 1, 1);

    lcd.clear()?;
    lcd.write_string("Cursor Off...")?;
    lcd.cursor_off()?;
    lcd.blink_off()?;
    stage.pause(lcd, 1, 1);

    lcd.clear()?;
    lcd.write_string("Scrolling content...")?;
    lcd.write_string_at("To left", 0, 1)?;
    stage.pause(lcd, 1, 2);
    for _ in 0..5 {
        lcd.scroll_display_left()?;
        stage.pause(lcd, 1, 5);
    }
    stage.pause(lcd, 1, 2);
    lcd.write_string_at("To right", 0, 1)?;
    for _ in 0..5 {
        lcd.scroll_display_right()?;
        stage.pause(lcd, 1, 5);
    }
    stage.pause(lcd, 1, 2);

    lcd.clear()?;
    lcd.right_to_left()?;
    lcd.write_string_at("Right to left...", stage.cols.saturating_sub(1), 0)?;
    lcd.left_to_right()?;
    lcd.write_string_at("Left to right...", 0, 1)?;
    stage.pause(lcd, 2, 1);

    lcd.clear()?;
    lcd.write_string("          Autoscroll")?;
    lcd.autoscroll_on()?;
    lcd.set_cursor(10, 1)?;
    for &c in b"enabled..." {
        stage.pause(lcd, 1, 5);
        lcd.write_char(c)?;
    }
    stage.pause(lcd, 1, 1);
    lcd.autoscroll_off()?;
    Ok(())
}

/// Shows the local time, ticking once a second.
pub fn clock<D: DelayNs, S: DelayNs>(
    lcd: &mut Hd44780<'_, D>,
    stage: &mut Stage<S>,
    seconds: u32,
) -> GpioResult<()> {
    lcd.clear()?;
    for _ in 0..seconds {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        lcd.write_string_at(&now.date().to_string(), 0, 0)?;
        lcd.write_string_at(
            &format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second()),
            0,
            1,
        )?;
        stage.delay.delay_ms(1000);
    }
    stage.pause(lcd, 0, 1);
    Ok(())
}

pub fn goodbye<D: DelayNs, S: DelayNs>(
    lcd: &mut Hd44780<'_, D>,
    stage: &mut Stage<S>,
) -> GpioResult<()> {
    lcd.clear()?;
    lcd.write_string("Bye bye!")?;
    stage.pause(lcd, 1, 1);
    Ok(())
}

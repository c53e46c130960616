mod config;
mod scenes;

use crate::config::{Backend, DisplayConfig, Pins};
use crate::scenes::Stage;
use dotenv::{dotenv, var};
use embedded_hal::delay::DelayNs;
use hd44780_gpio::GpioDriver;
use hd44780_gpio::delay::StdDelay;
use hd44780_gpio::gpiod::GpiodDriver;
use hd44780_gpio::lcd::hd44780::Hd44780;
use hd44780_gpio::lcd::hd44780::sim::SimHd44780;
use hd44780_gpio::raw::RawGpioDriver;
use hd44780_gpio::sim::SimGpioDriver;
use log::{debug, info};
use std::fmt::Debug;

fn run<G: GpioDriver, D: DelayNs + Clone + Debug>(
    gpio: &G,
    pins: &Pins,
    display: &DisplayConfig,
    delay: D,
    model: Option<SimHd44780>,
) -> eyre::Result<()> {
    let config = display.lcd_config();
    let mut stage = Stage::new(delay.clone(), display.cols, display.pause_ms, model);

    debug!("Initializing LCD in 4-bit mode...");
    let mut lcd = Hd44780::open_4bit(gpio, &pins.four_bit(), config, delay.clone())?;
    debug!("{:?} initialized.", lcd);
    scenes::hello(&mut lcd, &mut stage, "4-bit")?;
    lcd.deinit()?;
    stage.wait(display.pause_ms / 2);

    let (mut lcd, mode) = match pins.eight_bit() {
        Some(eight_bit) => {
            debug!("Initializing LCD in 8-bit mode...");
            (Hd44780::open_8bit(gpio, &eight_bit, config, delay)?, "8-bit")
        }
        None => {
            info!("Only 4 data pins, staying in 4-bit mode");
            (Hd44780::open_4bit(gpio, &pins.four_bit(), config, delay)?, "4-bit")
        }
    };
    scenes::hello(&mut lcd, &mut stage, mode)?;
    scenes::tour(&mut lcd, &mut stage)?;
    scenes::banner(&mut lcd, &mut stage)?;
    scenes::clock(&mut lcd, &mut stage, 5)?;
    scenes::goodbye(&mut lcd, &mut stage)?;
    lcd.deinit()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    info!("{} v{} starting...", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let backend = Backend::from_env()?;
    let pins = Pins::from_env()?;
    info!(
        "LCD @ {:?}, E: {}, RW: {:?}, RS: {}, Data: {:?}",
        backend, pins.enable, pins.rw, pins.rs, pins.data
    );

    let display = if let Some(display) = DisplayConfig::try_load() {
        info!("Config loaded.");
        display
    } else {
        info!("Config not found. Using default");
        let display = DisplayConfig::default();
        display.save()?;
        info!("Default config saved.");
        display
    };
    debug!("{:?}", display);

    match backend {
        Backend::Raw => {
            let gpio = RawGpioDriver::new_mem()?;
            run(&gpio, &pins, &display, StdDelay::new(), None)?;
        }
        Backend::GpioMem => {
            let gpio = RawGpioDriver::new_gpiomem()?;
            run(&gpio, &pins, &display, StdDelay::new(), None)?;
        }
        Backend::Gpiod => {
            let chip = var("LCD_GPIOCHIP").unwrap_or_else(|_| "/dev/gpiochip0".to_string());
            let gpio = GpiodDriver::open(&chip)?;
            run(&gpio, &pins, &display, StdDelay::new(), None)?;
        }
        Backend::Sim => {
            let count = pins
                .data
                .iter()
                .chain([&pins.rs, &pins.enable])
                .chain(pins.rw.as_ref())
                .max()
                .map_or(0, |&max| max + 1);
            let gpio = SimGpioDriver::new(count);
            let model = match pins.eight_bit() {
                Some(eight_bit) => SimHd44780::wired_to(&gpio, &eight_bit),
                None => SimHd44780::wired_to(&gpio, &pins.four_bit()),
            };
            run(&gpio, &pins, &display, gpio.delay(), Some(model))?;
            info!("Simulated run took {:?}", gpio.now());
        }
    }

    info!("Done.");
    Ok(())
}

use hidapi::HidApi;
use hv_switching_board::{hid::Xr2280xBus, BusProxy, Result};

fn main() -> Result<()> {
    env_logger::init();
    let hid_api = HidApi::new()?;
    let mut bus = Xr2280xBus::open_first(&hid_api)?;
    bus.set_speed_khz(100)?;

    println!("Scanning I2C bus (7-bit addresses 0x08 to 0x77)...");
    let found = bus.scan()?;
    for address in &found {
        let note = match address.value() {
            0x29 => " (bootloader)",
            10 => " (factory default)",
            _ => "",
        };
        println!("Device found at {}{}", address, note);
    }
    if found.is_empty() {
        println!("No I2C devices found.");
    }
    Ok(())
}

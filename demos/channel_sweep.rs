use hidapi::HidApi;
use hv_switching_board::{hid::Xr2280xBus, BusAddress, Error, Result, SwitchingBoard};
use std::{thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();
    let address = match std::env::args().nth(1) {
        Some(arg) => parse_address(&arg)?,
        None => 10,
    };

    let hid_api = HidApi::new()?;
    println!("Opening first XR2280x I2C bridge...");
    let bus = match Xr2280xBus::open_first(&hid_api) {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("Error opening bridge: {}", e);
            eprintln!(
                "Ensure device is connected and permissions are set (e.g., udev rules on Linux)."
            );
            return Err(e);
        }
    };
    bus.set_speed_khz(100)?;

    let mut board = SwitchingBoard::new(bus, BusAddress::new(address)?);
    let registers = board.detect_shift_register_count()?;
    println!(
        "Board at {} has {} shift registers ({} channels)",
        board.address(),
        registers,
        board.channel_count()
    );

    // Walk a single active channel across the board.
    let mut state = vec![false; board.channel_count()];
    for channel in 0..state.len() {
        state.fill(false);
        state[channel] = true;
        board.set_channel_states(&state)?;
        thread::sleep(Duration::from_millis(100));
    }

    state.fill(false);
    board.set_channel_states(&state)?;
    println!("All channels off: {:?}", board.get_channel_states()?.iter().all(|on| !on));
    Ok(())
}

// Decimal by default, hex with a `0x` prefix.
fn parse_address(arg: &str) -> Result<u8> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|e| Error::ArgumentOutOfRange(format!("bad bus address {:?}: {}", arg, e)))
}

//! Command dispatch tests against a scripted bus.

mod common;

use common::{addr, init_logging, MockBus};
use hv_switching_board::{BoardOptions, BusAddress, Error, ShiftRegisterCount, SwitchingBoard};

fn board(bus: MockBus) -> SwitchingBoard<MockBus> {
    init_logging();
    SwitchingBoard::new(bus, addr(10))
}

fn board_with_registers(bus: MockBus, registers: u8) -> SwitchingBoard<MockBus> {
    init_logging();
    let options = BoardOptions {
        shift_register_count: ShiftRegisterCount::new(registers).unwrap(),
        ..BoardOptions::default()
    };
    SwitchingBoard::with_options(bus, addr(10), options)
}

#[test]
fn test_set_channel_states_message() {
    let mut board = board(MockBus::new());
    let mut state = vec![false; 40];
    state[0] = true;
    state[8] = true;
    state[39] = true;
    board.set_channel_states(&state).unwrap();

    let sends = &board.bus().sends;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, addr(10));
    assert_eq!(sends[0].1, vec![0xA0, 0xFE, 0xFE, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn test_set_channel_states_rejects_bad_length_without_bus_traffic() {
    let mut board = board(MockBus::new());
    for len in [0usize, 39, 41] {
        let result = board.set_channel_states(&vec![true; len]);
        assert!(
            matches!(result, Err(Error::InvalidLength { expected: 40, actual }) if actual == len),
            "length {} should be rejected",
            len
        );
    }
    assert!(board.bus().sends.is_empty());
}

#[test]
fn test_get_channel_states_decodes_response() {
    let bus = MockBus::new().respond(0xA1, Ok(Some(vec![0xFE, 0xFF, 0xFF, 0xFF, 0x7F])));
    let mut board = board(bus);
    let state = board.get_channel_states().unwrap();

    assert_eq!(board.bus().sends[0].1, vec![0xA1]);
    assert_eq!(state.len(), 40);
    let on: Vec<usize> = (0..40).filter(|&i| state[i]).collect();
    assert_eq!(on, vec![0, 39]);
}

#[test]
fn test_get_channel_states_short_or_absent_response() {
    let bus = MockBus::new()
        .respond(0xA1, Ok(Some(vec![0xFF; 4])))
        .respond(0xA1, Ok(None));
    let mut board = board(bus);

    match board.get_channel_states() {
        Err(Error::ShortResponse {
            command,
            expected,
            actual,
        }) => {
            assert_eq!(command, 0xA1);
            assert_eq!(expected, 5);
            assert_eq!(actual, 4);
        }
        other => panic!("Expected ShortResponse, got {:?}", other),
    }
    assert!(matches!(
        board.get_channel_states(),
        Err(Error::ShortResponse { actual: 0, .. })
    ));
}

#[test]
fn test_channel_states_follow_geometry() {
    let bus = MockBus::new()
        .respond(0xA0, Ok(None))
        .respond(0xA1, Ok(Some(vec![0x00, 0xFF])));
    let mut board = board_with_registers(bus, 2);
    assert_eq!(board.channel_count(), 16);

    board.set_channel_states(&[true; 16]).unwrap();
    assert_eq!(board.bus().sends[0].1, vec![0xA0, 0x00, 0x00]);

    let state = board.get_channel_states().unwrap();
    assert_eq!(board.bus().sends[1].1, vec![0xA1]);
    assert_eq!(&state[..8], &[true; 8]);
    assert_eq!(&state[8..], &[false; 8]);
}

#[test]
fn test_shift_register_count_reported() {
    let mut board = board(MockBus::new().respond(0xA6, Ok(Some(vec![8]))));
    assert_eq!(board.get_shift_register_count().unwrap(), 8);
    assert_eq!(board.bus().sends[0].1, vec![0xA6]);
}

#[test]
fn test_shift_register_count_falls_back_for_older_firmware() {
    let bus = MockBus::new()
        .respond(0xA6, Ok(Some(Vec::new())))
        .respond(0xA6, Ok(None));
    let mut board = board(bus);
    assert_eq!(board.get_shift_register_count().unwrap(), 5);
    assert_eq!(board.get_shift_register_count().unwrap(), 5);
}

#[test]
fn test_shift_register_count_bus_failure_is_degraded_query() {
    let bus = MockBus::new().respond(0xA6, Err(Error::I2cNack { address: addr(10) }));
    let mut board = board(bus);
    match board.get_shift_register_count() {
        Err(Error::DegradedQuery { address, source }) => {
            assert_eq!(address, addr(10));
            assert!(matches!(*source, Error::I2cNack { .. }));
        }
        other => panic!("Expected DegradedQuery, got {:?}", other),
    }
}

#[test]
fn test_detect_shift_register_count_adopts_geometry() {
    let bus = MockBus::new()
        .respond(0xA6, Ok(Some(vec![3])))
        .respond(0xA6, Ok(Some(vec![0])));
    let mut board = board(bus);

    assert_eq!(board.detect_shift_register_count().unwrap().get(), 3);
    assert_eq!(board.channel_count(), 24);
    board.set_channel_states(&[false; 24]).unwrap();
    assert_eq!(board.bus().sends[1].1, vec![0xA0, 0xFF, 0xFF, 0xFF]);

    // A zero count is not a usable geometry; keep the previous one.
    assert!(matches!(
        board.detect_shift_register_count(),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert_eq!(board.channel_count(), 24);
}

#[test]
fn test_reset_config_restores_factory_address() {
    for previous in [0x10u8, 10, 0x7F] {
        let mut board = SwitchingBoard::new(MockBus::new(), addr(previous));
        board.reset_config().unwrap();
        assert_eq!(board.address(), BusAddress::FACTORY_DEFAULT);
        assert_eq!(board.address().value(), 10);
        assert_eq!(board.bus().writes, vec![(addr(previous), vec![0xA3])]);
    }
}

#[test]
fn test_reset_config_failure_keeps_address() {
    let bus = MockBus {
        fail_writes: true,
        ..MockBus::new()
    };
    let mut board = SwitchingBoard::new(bus, addr(0x20));
    assert!(board.reset_config().is_err());
    assert_eq!(board.address(), addr(0x20));
}

#[test]
fn test_set_port_states() {
    let mut board = board(MockBus::new());
    let mut states = [false; 8];
    states[2] = true;
    board.set_port_states(2, &states).unwrap();
    assert_eq!(board.bus().writes, vec![(addr(10), vec![0x0A, 0xFB])]);
    assert_eq!(board.bus().reads, vec![(addr(10), 1)]);
    assert_eq!(board.bus().registers[2], 0xFB);
    assert!(board.bus().sends.is_empty());

    assert!(matches!(
        board.set_port_states(5, &states),
        Err(Error::PortOutOfRange { port: 5, count: 5 })
    ));
    assert_eq!(board.bus().writes.len(), 1);
}

#[test]
fn test_port_states_reads_register() {
    let bus = MockBus::new().with_registers(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7E]);
    let mut board = board(bus);
    let states = board.port_states(4).unwrap();
    assert_eq!(board.bus().writes[0].1, vec![0x0C]);
    assert_eq!(states, [true, false, false, false, false, false, false, true]);
}

#[test]
fn test_port_register_replies_have_no_length_prefix() {
    // Every channel on reads as a bare 0x00, which a length-prefixed read
    // would mistake for an empty response.
    let bus = MockBus::new().with_registers(&[0x00, 0xFB, 0xFF, 0xFF, 0xFF]);
    let mut board = board(bus);

    assert_eq!(board.port_states(0).unwrap(), [true; 8]);
    let mut expected = [false; 8];
    expected[2] = true;
    assert_eq!(board.port_states(1).unwrap(), expected);
    assert_eq!(board.bus().reads, vec![(addr(10), 1), (addr(10), 1)]);
    assert!(board.bus().sends.is_empty());
}

#[test]
fn test_port_states_without_reply() {
    let bus = MockBus::new().with_registers(&[0xFF]);
    let mut board = board(bus);
    assert!(matches!(
        board.port_states(3),
        Err(Error::ShortResponse {
            command: 0x0B,
            expected: 1,
            actual: 0
        })
    ));
}

#[test]
fn test_set_port_range_uses_auto_increment() {
    let mut board = board(MockBus::new());
    let mut states = vec![false; 16];
    states[0] = true;
    states[15] = true;
    board.set_port_range(1, &states).unwrap();
    assert_eq!(board.bus().writes[0].1, vec![0x89, 0xFE, 0x7F]);
    assert_eq!(board.bus().registers, vec![0xFF, 0xFE, 0x7F, 0xFF, 0xFF]);
    assert_eq!(board.bus().reads, vec![(addr(10), 1)]);
}

#[test]
fn test_set_port_range_validation() {
    let mut board = board(MockBus::new());
    assert!(matches!(
        board.set_port_range(0, &[true; 7]),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        board.set_port_range(0, &[]),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        board.set_port_range(4, &[true; 16]),
        Err(Error::PortOutOfRange { port: 5, count: 5 })
    ));
    assert!(board.bus().writes.is_empty());
}

#[test]
fn test_set_channel_read_modify_write() {
    // Register 1 currently has channel 8 on (bit 0 low).
    let bus = MockBus::new().with_registers(&[0xFF, 0xFE, 0xFF, 0xFF, 0xFF]);
    let mut board = board(bus);
    board.set_channel(11, true).unwrap();

    let writes = &board.bus().writes;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].1, vec![0x09]);
    assert_eq!(writes[1].1, vec![0x09, 0xF6]);
    assert_eq!(board.bus().registers[1], 0xF6);
}

#[test]
fn test_set_channel_out_of_range() {
    let mut board = board(MockBus::new());
    assert!(matches!(
        board.set_channel(40, true),
        Err(Error::ChannelOutOfRange {
            channel: 40,
            count: 40
        })
    ));
    assert!(board.bus().writes.is_empty());
}

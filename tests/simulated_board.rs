extern crate sst39_flashprog;

use std::time::Duration;

use sst39_flashprog::bus::BusDriver;
use sst39_flashprog::sim::{
	SimulatedBoard,
	Violation,
};
use sst39_flashprog::sst39::{
	CommandSequence,
	EraseMode,
	OUTPUT_DISABLE,
	Part,
	WINDOW_SIZE,
};
use sst39_flashprog::wiring::CH32X035_BOARD;
use sst39_flashprog::{
	Flash,
	Timing,
	write_image,
};

fn rom_image() -> Vec<u8> {
	let mut image = vec![0xea; WINDOW_SIZE]; // NOP
	// reset vector -> 0x8000
	image[0x7ffc] = 0x00;
	image[0x7ffd] = 0x80;
	image[0x0000..0x0004].copy_from_slice(&[0xa9, 0x42, 0x85, 0x00]);
	image
}

#[test]
fn full_rom() {
	let image = rom_image();
	let mut board = SimulatedBoard::new(CH32X035_BOARD);
	board.chip_mut().load(0x0000, &[0x00; 0x100]);
	{
		let mut flash = Flash::new(&mut board, CH32X035_BOARD, Timing::default()).unwrap();
		assert_eq!(flash.identify().unwrap(), Part::Sst39sf010a);
		write_image(&mut flash, 0, &image, EraseMode::Chip).unwrap();

		let mut readback = vec![0u8; 16];
		flash.read(0x7ff0, &mut readback).unwrap();
		assert_eq!(&readback[..], &image[0x7ff0..]);
		flash.release();
	}
	assert_eq!(&board.chip().memory()[..WINDOW_SIZE], &image[..]);
	// upper half of the chip is out of reach
	assert!(board.chip().memory()[WINDOW_SIZE..].iter().all(|b| *b == 0xff));
	assert!(board.violations().is_empty(), "{:?}", board.violations());
}

#[test]
fn every_step_carries_output_disable() {
	let mut board = SimulatedBoard::new(CH32X035_BOARD);
	{
		let mut flash = Flash::new(&mut board, CH32X035_BOARD, Timing::default()).unwrap();
		write_image(&mut flash, 0x0100, &[1, 2, 3], EraseMode::None).unwrap();
	}
	let writes = board.writes();
	assert_eq!(writes.len(), 12);
	assert!(writes.iter().all(|(address, _)| 0 != address & OUTPUT_DISABLE));
	assert_eq!(writes[3], (0x8100, 1));
	assert_eq!(writes[11], (0x8102, 3));
}

#[test]
fn early_release_is_flagged() {
	let mut board = SimulatedBoard::new(CH32X035_BOARD);
	let timing = Timing::default();
	{
		let mut bus = BusDriver::new(&mut board, CH32X035_BOARD);
		bus.enable_bus();
		let sequence = CommandSequence::byte_program(0x0000, 0x00);
		// 1 µs instead of T_BP
		let mut tx = bus.start_program_transaction(&timing, Duration::from_micros(1));
		for step in sequence.steps() {
			tx.write(step.address | OUTPUT_DISABLE, step.data);
		}
	}
	match board.violations() {
		[Violation::ProgramReleasedWhileBusy { .. }] => (),
		other => panic!("unexpected violations: {:?}", other),
	}
}

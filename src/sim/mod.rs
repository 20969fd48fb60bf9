//! Simulated programmer board: GPIO port registers with a virtual clock,
//! and a flash chip wired to them according to a `Wiring`.
//!
//! The board watches every register change, records a trace of the control
//! lines, write pulses and delays, and flags protocol violations (short
//! pulses, writes without PROG#, bus contention, access while the chip is
//! busy).

use std::time::Duration;

use crate::bus::{
	Direction,
	Hardware,
	reliable_sleep,
};
use crate::sst39::{
	OUTPUT_DISABLE,
	Part,
};
use crate::wiring::{
	ControlLine,
	ControlPin,
	PORT_COUNT,
	Port,
	PortBits,
	Wiring,
	merge,
};

mod chip;

pub use self::chip::{
	ChipState,
	Sst39Chip,
};

const MIN_WRITE_PULSE: Duration = Duration::from_nanos(40);
const MIN_WRITE_PULSE_HIGH: Duration = Duration::from_nanos(30);

const CONTROL_LINES: [ControlLine; 3] = [
	ControlLine::BusEnable,
	ControlLine::Program,
	ControlLine::WriteEnable,
];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Event {
	Control { line: ControlLine, active: bool, at: Duration },
	/// completed WE# pulse; `address` as seen on the bus (including A15)
	Write { address: u16, data: u8, at: Duration, pulse: Duration },
	Delay { duration: Duration, at: Duration },
}

impl Event {
	pub fn is_program_enable(&self, state: bool) -> bool {
		match self {
			Event::Control { line: ControlLine::Program, active, .. } => *active == state,
			_ => false,
		}
	}

	pub fn is_write(&self) -> bool {
		match self {
			Event::Write { .. } => true,
			_ => false,
		}
	}

	pub fn is_delay_at_least(&self, min: Duration) -> bool {
		match self {
			Event::Delay { duration, .. } => *duration >= min,
			_ => false,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Violation {
	ShortPulse { at: Duration, pulse: Duration },
	ShortRecovery { at: Duration, high: Duration },
	WriteWithoutProgramEnable { at: Duration, address: u16, data: u8 },
	WriteWithoutBus { at: Duration, address: u16, data: u8 },
	WriteWhileBusy { at: Duration, address: u16, data: u8 },
	ReadWhileBusy { at: Duration },
	ProgramReleasedWhileBusy { at: Duration },
	BusContention { at: Duration },
}

pub struct SimulatedBoard {
	wiring: Wiring,
	chip: Sst39Chip,
	output: [u32; PORT_COUNT],
	// set bits are outputs
	direction: [u32; PORT_COUNT],
	// level of pins nobody drives
	pull: [u32; PORT_COUNT],
	lines: [bool; 3],
	we_fall: Option<(Duration, u16)>,
	we_rise: Option<Duration>,
	contention: bool,
	now: Duration,
	realtime: bool,
	events: Vec<Event>,
	violations: Vec<Violation>,
}

impl SimulatedBoard {
	pub fn new(wiring: Wiring) -> Self {
		Self::with_chip(wiring, Sst39Chip::new(Part::Sst39sf010a))
	}

	pub fn with_chip(wiring: Wiring, chip: Sst39Chip) -> Self {
		// control lines have pull-ups
		let pull = wiring.control_mask().0;
		let mut board = SimulatedBoard {
			wiring,
			chip,
			output: [0; PORT_COUNT],
			direction: [0; PORT_COUNT],
			pull,
			lines: [false; 3],
			we_fall: None,
			we_rise: None,
			contention: false,
			now: Duration::from_secs(0),
			realtime: false,
			events: Vec::new(),
			violations: Vec::new(),
		};
		for (i, line) in CONTROL_LINES.iter().enumerate() {
			board.lines[i] = board.line_active(wiring.control(*line));
		}
		board
	}

	/// also sleep for real on every delay
	pub fn set_realtime(&mut self, realtime: bool) {
		self.realtime = realtime;
	}

	pub fn chip(&self) -> &Sst39Chip {
		&self.chip
	}

	pub fn chip_mut(&mut self) -> &mut Sst39Chip {
		&mut self.chip
	}

	/// virtual time since the board was created
	pub fn now(&self) -> Duration {
		self.now
	}

	pub fn events(&self) -> &[Event] {
		&self.events
	}

	pub fn take_events(&mut self) -> Vec<Event> {
		std::mem::replace(&mut self.events, Vec::new())
	}

	pub fn violations(&self) -> &[Violation] {
		&self.violations
	}

	/// (address, data) of every completed write pulse, in order
	pub fn writes(&self) -> Vec<(u16, u8)> {
		self.events.iter().filter_map(|e| match e {
			Event::Write { address, data, .. } => Some((*address, *data)),
			_ => None,
		}).collect()
	}

	fn levels(&self) -> PortBits {
		let mut bits = PortBits::default();
		for port in Port::ALL.iter() {
			let i = port.index();
			bits.set(*port, merge(self.pull[i], self.direction[i], self.output[i]));
		}
		bits
	}

	fn line_active(&self, control: ControlPin) -> bool {
		control.is_active(self.levels().contains(control.pin))
	}

	fn bus_address(&self) -> u16 {
		self.wiring.unmap_address(&self.levels())
	}

	fn bus_data(&self) -> u8 {
		self.wiring.unmap_data(&self.levels())
	}

	fn data_driven(&self) -> bool {
		let data = self.wiring.data_mask();
		Port::ALL.iter().any(|port| 0 != data.get(*port) & self.direction[port.index()])
	}

	// OE# is wired to A15
	fn chip_outputs_enabled(&self) -> bool {
		let [_, program, write_enable] = self.lines;
		!program && !write_enable && 0 == self.bus_address() & OUTPUT_DISABLE
	}

	fn update(&mut self) {
		let now = self.now;
		for (i, line) in CONTROL_LINES.iter().enumerate() {
			let active = self.line_active(self.wiring.control(*line));
			if active == self.lines[i] {
				continue;
			}
			self.lines[i] = active;
			self.events.push(Event::Control { line: *line, active, at: now });
			match (*line, active) {
				(ControlLine::WriteEnable, true) => self.write_enable_fall(),
				(ControlLine::WriteEnable, false) => self.write_enable_rise(),
				(ControlLine::Program, false) if self.chip.is_busy(now) => {
					self.violations.push(Violation::ProgramReleasedWhileBusy { at: now });
				},
				_ => (),
			}
		}

		let contention = self.data_driven() && self.chip_outputs_enabled();
		if contention && !self.contention {
			warn!("simulated bus contention at {:?}", now);
			self.violations.push(Violation::BusContention { at: now });
		}
		self.contention = contention;
	}

	fn write_enable_fall(&mut self) {
		let now = self.now;
		if let Some(rise) = self.we_rise {
			let high = now - rise;
			if high < MIN_WRITE_PULSE_HIGH {
				self.violations.push(Violation::ShortRecovery { at: now, high });
			}
		}
		self.we_fall = Some((now, self.bus_address()));
	}

	fn write_enable_rise(&mut self) {
		let now = self.now;
		self.we_rise = Some(now);
		let (fall, address) = match self.we_fall.take() {
			Some(f) => f,
			None => return,
		};
		let data = self.bus_data();
		let pulse = now - fall;
		self.events.push(Event::Write { address, data, at: now, pulse });

		if pulse < MIN_WRITE_PULSE {
			self.violations.push(Violation::ShortPulse { at: now, pulse });
		}
		let [bus_enable, program, _] = self.lines;
		if !bus_enable {
			self.violations.push(Violation::WriteWithoutBus { at: now, address, data });
		}
		if !program {
			self.violations.push(Violation::WriteWithoutProgramEnable { at: now, address, data });
		}
		if self.chip.is_busy(now) {
			self.violations.push(Violation::WriteWhileBusy { at: now, address, data });
			return;
		}
		// chip A15/A16 are tied low
		self.chip.write((address & !OUTPUT_DISABLE) as u32, data, now);
	}
}

impl Hardware for SimulatedBoard {
	fn set_direction(&mut self, port: Port, mask: u32, direction: Direction) {
		let i = port.index();
		let value = match direction {
			Direction::Input => 0,
			Direction::Output => mask,
		};
		self.direction[i] = merge(self.direction[i], mask, value);
		self.update();
	}

	fn read_input(&mut self, port: Port) -> u32 {
		let i = port.index();
		let mut levels = merge(self.pull[i], self.direction[i], self.output[i]);
		let data_mask = self.wiring.data_mask().get(port);
		if 0 != data_mask && self.chip_outputs_enabled() {
			if self.chip.is_busy(self.now) {
				self.violations.push(Violation::ReadWhileBusy { at: self.now });
			}
			let address = self.bus_address() & !OUTPUT_DISABLE;
			let data = self.wiring.map_data(self.chip.read(address as u32, self.now));
			// chip only reaches pins not driven by the controller
			let mask = data_mask & !self.direction[i];
			levels = merge(levels, mask, data.get(port));
		}
		levels
	}

	fn read_output(&mut self, port: Port) -> u32 {
		self.output[port.index()]
	}

	fn write_output(&mut self, port: Port, value: u32) {
		self.output[port.index()] = value;
		self.update();
	}

	fn delay(&mut self, duration: Duration) {
		self.events.push(Event::Delay { duration, at: self.now });
		self.now += duration;
		if self.realtime {
			reliable_sleep(duration);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wiring::CH32X035_BOARD;

	#[test]
	fn undriven_control_lines_are_inactive() {
		let mut board = SimulatedBoard::new(CH32X035_BOARD);
		assert_eq!(board.read_input(Port::B) & 0x7000, 0x7000);
		board.set_direction(Port::B, 0x7000, Direction::Output);
		// output register is zero: all three lines active
		let lines: Vec<ControlLine> = board.events().iter().filter_map(|e| match e {
			Event::Control { line, active: true, .. } => Some(*line),
			_ => None,
		}).collect();
		assert_eq!(lines, CONTROL_LINES.to_vec());
	}

	#[test]
	fn manual_write_pulse() {
		let wiring = CH32X035_BOARD;
		let mut board = SimulatedBoard::new(wiring);
		let address = wiring.map_address(0xd555);
		let data = wiring.map_data(0xaa);
		let bits = address.union(&data);
		for port in Port::ALL.iter() {
			// WE# and PROG# inactive, BUS_ENABLE active
			let control = if *port == Port::B { 0x6000 } else { 0 };
			board.write_output(*port, bits.get(*port) | control);
		}
		let outputs = wiring.address_mask().union(&wiring.data_mask()).union(&wiring.control_mask());
		for (port, mask) in outputs.ports() {
			board.set_direction(port, mask, Direction::Output);
		}
		// PROG# active, then a 10 ns WE# pulse
		board.write_output(Port::B, 0x4000);
		board.write_output(Port::B, 0x0000);
		board.delay(Duration::from_nanos(10));
		board.write_output(Port::B, 0x4000);

		assert_eq!(board.writes(), vec![(0xd555, 0xaa)]);
		assert_eq!(board.violations(), &[Violation::ShortPulse {
			at: Duration::from_nanos(10),
			pulse: Duration::from_nanos(10),
		}]);
		assert_eq!(board.chip().state(), ChipState::Unlocked1);
	}

	#[test]
	fn contention_detected() {
		let wiring = CH32X035_BOARD;
		let mut board = SimulatedBoard::new(wiring);
		board.write_output(Port::B, 0x6000);
		board.set_direction(Port::B, 0x7000, Direction::Output);
		let outputs = wiring.address_mask();
		for (port, mask) in outputs.ports() {
			board.set_direction(port, mask, Direction::Output);
		}
		assert!(board.violations().is_empty());
		// A15 low and PROG# inactive: the chip drives the data bus
		for (port, mask) in wiring.data_mask().ports() {
			board.set_direction(port, mask, Direction::Output);
		}
		assert_eq!(board.violations().len(), 1);
	}
}

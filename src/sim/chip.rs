use std::time::Duration;

use crate::sst39::{
	Part,
	SECTOR_SIZE,
	SST_MANUFACTURER_ID,
};

// typical completion times; the datasheet maxima are what the programmer waits
const BYTE_PROGRAM_TIME: Duration = Duration::from_micros(14);
const SECTOR_ERASE_TIME: Duration = Duration::from_millis(18);
const CHIP_ERASE_TIME: Duration = Duration::from_millis(70);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ChipState {
	Read,
	Unlocked1,
	Unlocked2,
	Program,
	EraseSetup,
	EraseUnlocked1,
	EraseUnlocked2,
	SoftwareId,
	IdUnlocked1,
	IdUnlocked2,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct Busy {
	until: Duration,
	// what DQ7..DQ0 read as while busy
	status: u8,
}

/// Behavioural model of a SST39SF0x0 flash.
///
/// Commands are decoded on A14..A0; `write` and `read` take the chip
/// address (A16..A0).
pub struct Sst39Chip {
	part: Part,
	memory: Vec<u8>,
	state: ChipState,
	busy: Option<Busy>,
}

impl Sst39Chip {
	pub fn new(part: Part) -> Self {
		Sst39Chip {
			part,
			memory: vec![0xff; part.size()],
			state: ChipState::Read,
			busy: None,
		}
	}

	pub fn state(&self) -> ChipState {
		self.state
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	/// preset memory content, bypassing the command protocol
	pub fn load(&mut self, address: usize, data: &[u8]) {
		self.memory[address..address + data.len()].copy_from_slice(data);
	}

	pub fn is_busy(&self, now: Duration) -> bool {
		match self.busy {
			Some(busy) => now < busy.until,
			None => false,
		}
	}

	fn start(&mut self, duration: Duration, status: u8, now: Duration) {
		self.busy = Some(Busy { until: now + duration, status });
	}

	pub fn write(&mut self, address: u32, data: u8, now: Duration) {
		use self::ChipState::*;

		let address = address as usize % self.memory.len();
		let command_address = address & 0x7fff;
		let next = match (self.state, command_address, data) {
			(Program, _, _) => {
				trace!("chip: program 0x{:02x} @ 0x{:05x}", data, address);
				// programming can only clear bits
				self.memory[address] &= data;
				self.start(BYTE_PROGRAM_TIME, !data & 0x80, now);
				Read
			},
			(Read, 0x5555, 0xaa) => Unlocked1,
			(Unlocked1, 0x2aaa, 0x55) => Unlocked2,
			(Unlocked2, 0x5555, 0xa0) => Program,
			(Unlocked2, 0x5555, 0x80) => EraseSetup,
			(Unlocked2, 0x5555, 0x90) => SoftwareId,
			(EraseSetup, 0x5555, 0xaa) => EraseUnlocked1,
			(EraseUnlocked1, 0x2aaa, 0x55) => EraseUnlocked2,
			(EraseUnlocked2, 0x5555, 0x10) => {
				trace!("chip: chip erase");
				for b in self.memory.iter_mut() {
					*b = 0xff;
				}
				self.start(CHIP_ERASE_TIME, 0x00, now);
				Read
			},
			(EraseUnlocked2, _, 0x30) => {
				let sector = address & !(SECTOR_SIZE - 1);
				trace!("chip: sector erase @ 0x{:05x}", sector);
				for b in self.memory[sector..sector + SECTOR_SIZE].iter_mut() {
					*b = 0xff;
				}
				self.start(SECTOR_ERASE_TIME, 0x00, now);
				Read
			},
			(SoftwareId, 0x5555, 0xaa) => IdUnlocked1,
			(IdUnlocked1, 0x2aaa, 0x55) => IdUnlocked2,
			(SoftwareId, _, 0xf0) | (IdUnlocked2, 0x5555, 0xf0) => Read,
			(SoftwareId, _, _) | (IdUnlocked1, _, _) | (IdUnlocked2, _, _) => SoftwareId,
			(_, _, _) => {
				if self.state != Read || data != 0xf0 {
					debug!("chip: ignored write 0x{:02x} @ 0x{:05x} in state {:?}", data, address, self.state);
				}
				Read
			},
		};
		self.state = next;
	}

	pub fn read(&self, address: u32, now: Duration) -> u8 {
		if let Some(busy) = self.busy {
			if now < busy.until {
				return busy.status;
			}
		}
		let address = address as usize % self.memory.len();
		match self.state {
			ChipState::SoftwareId | ChipState::IdUnlocked1 | ChipState::IdUnlocked2 => match address & 0x1 {
				0 => SST_MANUFACTURER_ID,
				_ => self.part.device_id(),
			},
			_ => self.memory[address],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const T0: Duration = Duration::from_secs(0);

	fn send(chip: &mut Sst39Chip, steps: &[(u32, u8)], now: Duration) {
		for (address, data) in steps {
			chip.write(*address, *data, now);
		}
	}

	#[test]
	fn byte_program() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		send(&mut chip, &[(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0xa0), (0x0042, 0x99)], T0);
		assert!(chip.is_busy(T0));
		assert_eq!(chip.read(0x0042, T0), 0x00); // DQ7 inverted
		let later = Duration::from_micros(20);
		assert!(!chip.is_busy(later));
		assert_eq!(chip.read(0x0042, later), 0x99);
		assert_eq!(chip.state(), ChipState::Read);
	}

	#[test]
	fn program_clears_bits_only() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		chip.load(0x10, &[0x0f]);
		send(&mut chip, &[(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0xa0), (0x0010, 0xf3)], T0);
		assert_eq!(chip.memory()[0x10], 0x03);
	}

	#[test]
	fn chip_erase() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		chip.load(0x1_0000, &[0, 1, 2, 3]);
		send(&mut chip, &[
			(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0x80),
			(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0x10),
		], T0);
		assert!(chip.is_busy(Duration::from_millis(69)));
		assert!(!chip.is_busy(Duration::from_millis(100)));
		assert!(chip.memory().iter().all(|b| *b == 0xff));
	}

	#[test]
	fn sector_erase() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		chip.load(0x0fff, &[0, 0]);
		send(&mut chip, &[
			(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0x80),
			(0x5555, 0xaa), (0x2aaa, 0x55), (0x1234, 0x30),
		], T0);
		assert_eq!(chip.memory()[0x0fff], 0x00);
		assert_eq!(chip.memory()[0x1000], 0xff);
	}

	#[test]
	fn software_id() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		send(&mut chip, &[(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0x90)], T0);
		assert_eq!(chip.read(0, T0), 0xbf);
		assert_eq!(chip.read(1, T0), 0xb5);
		send(&mut chip, &[(0x5555, 0xaa), (0x2aaa, 0x55), (0x5555, 0xf0)], T0);
		assert_eq!(chip.state(), ChipState::Read);
		assert_eq!(chip.read(0, T0), 0xff);
	}

	#[test]
	fn broken_sequence_resets() {
		let mut chip = Sst39Chip::new(Part::Sst39sf010a);
		send(&mut chip, &[(0x5555, 0xaa), (0x2aaa, 0x54), (0x5555, 0xa0), (0x0000, 0x00)], T0);
		assert_eq!(chip.memory()[0], 0xff);
		assert_eq!(chip.state(), ChipState::Read);
	}
}

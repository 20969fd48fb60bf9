use std::time::Duration;

use crate::bus::Timing;

use super::consts::*;
use super::SECTOR_SIZE;

/// How long the chip needs after the last step of a sequence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Completion {
	ByteProgram,
	SectorErase,
	ChipErase,
	IdAccess,
}

impl Completion {
	pub fn duration(self, timing: &Timing) -> Duration {
		match self {
			Completion::ByteProgram => timing.byte_program,
			Completion::SectorErase => timing.sector_erase,
			Completion::ChipErase => timing.chip_erase,
			Completion::IdAccess => timing.id_access,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Step {
	pub address: u16,
	pub data: u8,
}

impl Step {
	pub const fn new(address: u16, data: u8) -> Self {
		Step { address, data }
	}
}

const UNLOCK: [Step; 2] = [
	Step::new(UNLOCK_ADDRESS_1, UNLOCK_DATA_1),
	Step::new(UNLOCK_ADDRESS_2, UNLOCK_DATA_2),
];

/// Software command sequence: JEDEC addresses (A14..A0) and data, in the
/// order they have to appear on the bus.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CommandSequence {
	name: &'static str,
	steps: Vec<Step>,
	completion: Completion,
}

impl CommandSequence {
	fn unlocked(name: &'static str, command: u8, completion: Completion) -> Self {
		let mut steps = UNLOCK.to_vec();
		steps.push(Step::new(UNLOCK_ADDRESS_1, command));
		CommandSequence { name, steps, completion }
	}

	fn erase(name: &'static str, address: u16, command: u8, completion: Completion) -> Self {
		let mut sequence = Self::unlocked(name, ERASE_SETUP, completion);
		sequence.steps.extend_from_slice(&UNLOCK);
		sequence.steps.push(Step::new(address, command));
		sequence
	}

	pub fn chip_erase() -> Self {
		Self::erase("chip erase", UNLOCK_ADDRESS_1, CHIP_ERASE, Completion::ChipErase)
	}

	/// `address` may point anywhere into the sector
	pub fn sector_erase(address: u16) -> Self {
		let sector = address & !(SECTOR_SIZE as u16 - 1);
		Self::erase("sector erase", sector, SECTOR_ERASE, Completion::SectorErase)
	}

	pub fn byte_program(address: u16, data: u8) -> Self {
		let mut sequence = Self::unlocked("byte program", BYTE_PROGRAM, Completion::ByteProgram);
		sequence.steps.push(Step::new(address, data));
		sequence
	}

	pub fn software_id_entry() -> Self {
		Self::unlocked("software ID entry", SOFTWARE_ID_ENTRY, Completion::IdAccess)
	}

	pub fn software_id_exit() -> Self {
		Self::unlocked("software ID exit", SOFTWARE_ID_EXIT, Completion::IdAccess)
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn steps(&self) -> &[Step] {
		&self.steps
	}

	pub fn completion(&self) -> Completion {
		self.completion
	}
}

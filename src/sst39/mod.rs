/* Chip documentation: SST39SF010A/020A/040 data sheet (Microchip DS20005022) */

use std::fmt;

use crate::bus::{
	BusDriver,
	Hardware,
	Timing,
};
use crate::wiring::Wiring;

mod sequence;

pub use self::sequence::{
	CommandSequence,
	Completion,
	Step,
};

mod consts {
	pub const UNLOCK_ADDRESS_1: u16 = 0x5555;
	pub const UNLOCK_ADDRESS_2: u16 = 0x2aaa;
	pub const UNLOCK_DATA_1: u8 = 0xaa;
	pub const UNLOCK_DATA_2: u8 = 0x55;

	pub const BYTE_PROGRAM: u8 = 0xa0;
	pub const ERASE_SETUP: u8 = 0x80;
	pub const CHIP_ERASE: u8 = 0x10;
	pub const SECTOR_ERASE: u8 = 0x30;
	pub const SOFTWARE_ID_ENTRY: u8 = 0x90;
	pub const SOFTWARE_ID_EXIT: u8 = 0xf0;

	// readable while in software ID mode
	pub const MANUFACTURER_ID_ADDRESS: u16 = 0x0000;
	pub const DEVICE_ID_ADDRESS: u16 = 0x0001;
}

use self::consts::*;

/// A15 of the bus drives OE# of the chip on this board: set on every
/// command step to keep the chip outputs off, cleared for reads.
pub const OUTPUT_DISABLE: u16 = 0x8000;

/// Bytes reachable with A15 reserved for OE#.
pub const WINDOW_SIZE: usize = 0x8000;

pub const SECTOR_SIZE: usize = 0x1000;

pub const SST_MANUFACTURER_ID: u8 = 0xbf;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Part {
	Sst39sf010a,
	Sst39sf020a,
	Sst39sf040,
}

impl Part {
	pub fn from_device_id(id: u8) -> Option<Part> {
		match id {
			0xb5 => Some(Part::Sst39sf010a),
			0xb6 => Some(Part::Sst39sf020a),
			0xb7 => Some(Part::Sst39sf040),
			_ => None,
		}
	}

	pub fn device_id(self) -> u8 {
		match self {
			Part::Sst39sf010a => 0xb5,
			Part::Sst39sf020a => 0xb6,
			Part::Sst39sf040 => 0xb7,
		}
	}

	pub fn size(self) -> usize {
		match self {
			Part::Sst39sf010a => 128 * 1024,
			Part::Sst39sf020a => 256 * 1024,
			Part::Sst39sf040 => 512 * 1024,
		}
	}
}

impl fmt::Display for Part {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Part::Sst39sf010a => write!(f, "SST39SF010A"),
			Part::Sst39sf020a => write!(f, "SST39SF020A"),
			Part::Sst39sf040 => write!(f, "SST39SF040"),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChipId {
	pub manufacturer: u8,
	pub device: u8,
}

impl fmt::Display for ChipId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:02x}:{:02x}", self.manufacturer, self.device)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EraseMode {
	/// target must already be blank
	None,
	/// erase the sectors the image touches
	Sectors,
	Chip,
}

impl std::str::FromStr for EraseMode {
	type Err = failure::Error;

	fn from_str(s: &str) -> crate::AResult<Self> {
		match s {
			"none" => Ok(EraseMode::None),
			"sectors" => Ok(EraseMode::Sectors),
			"chip" => Ok(EraseMode::Chip),
			_ => bail!("unknown erase mode {:?} (expected none, sectors or chip)", s),
		}
	}
}

fn check_range(address: u16, len: usize) -> crate::AResult<()> {
	ensure!(address as usize + len <= WINDOW_SIZE,
		"range 0x{:04x}..0x{:05x} outside of the 0x{:04x} byte window", address, address as usize + len, WINDOW_SIZE
	);
	Ok(())
}

/// Flash chip on the bus.
///
/// Creating it takes the bus over from the CPU; `release` hands it back.
/// No status polling: every command just waits out the datasheet maximum.
pub struct Flash<H: Hardware> {
	bus: BusDriver<H>,
	timing: Timing,
}

impl<H: Hardware> Flash<H> {
	pub fn new(hardware: H, wiring: Wiring, timing: Timing) -> crate::AResult<Self> {
		with_context!("invalid wiring", wiring.validate())?;
		with_context!("invalid timing", timing.validate())?;

		let mut bus = BusDriver::new(hardware, wiring);
		bus.enable_bus();
		Ok(Flash { bus, timing })
	}

	pub fn bus(&mut self) -> &mut BusDriver<H> {
		&mut self.bus
	}

	pub fn release(mut self) -> H {
		self.bus.disable_bus();
		self.bus.into_inner()
	}

	/// Emit all steps with PROG# held, then wait for completion.
	pub fn run(&mut self, sequence: &CommandSequence) {
		let completion = sequence.completion().duration(&self.timing);
		debug!("{}: {} steps, completion after {:?}", sequence.name(), sequence.steps().len(), completion);
		let mut tx = self.bus.start_program_transaction(&self.timing, completion);
		for step in sequence.steps() {
			tx.write(step.address | OUTPUT_DISABLE, step.data);
		}
	}

	pub fn erase_chip(&mut self) {
		info!("erasing chip");
		self.run(&CommandSequence::chip_erase());
	}

	/// Erase the 4 KiB sector containing `address`.
	///
	/// A15 doubles as OE# and is always driven high for commands, so
	/// `address` is taken modulo `WINDOW_SIZE`.
	pub fn erase_sector(&mut self, address: u16) {
		debug!("erasing sector @ 0x{:04x}", address);
		self.run(&CommandSequence::sector_erase(address));
	}

	/// `address` is taken modulo `WINDOW_SIZE` (A15 is OE#, high for commands).
	pub fn program_byte(&mut self, address: u16, data: u8) {
		self.run(&CommandSequence::byte_program(address, data));
	}

	/// program all bytes that aren't 0xff (the erased value)
	pub fn program(&mut self, address: u16, data: &[u8]) -> crate::AResult<()> {
		check_range(address, data.len())?;
		for (i, b) in data.iter().enumerate() {
			if *b == 0xff {
				continue;
			}
			let target = address + i as u16;
			if 0 == target as usize % SECTOR_SIZE {
				debug!("programming 0x{:04x}", target);
			}
			self.program_byte(target, *b);
		}
		Ok(())
	}

	/// `address` is taken modulo `WINDOW_SIZE`: reads need A15 (OE#) low.
	pub fn read_byte(&mut self, address: u16) -> u8 {
		self.bus.set_program_enable(false);
		self.bus.release_data();
		self.bus.set_address(address & !OUTPUT_DISABLE);
		self.bus.delay(self.timing.read_access);
		let data = self.bus.read_data();
		trace!("read 0x{:02x} @ 0x{:04x}", data, address);
		data
	}

	pub fn read(&mut self, address: u16, target: &mut [u8]) -> crate::AResult<()> {
		check_range(address, target.len())?;
		for (i, t) in target.iter_mut().enumerate() {
			*t = self.read_byte(address + i as u16);
		}
		Ok(())
	}

	pub fn read_id(&mut self) -> ChipId {
		self.run(&CommandSequence::software_id_entry());
		let manufacturer = self.read_byte(MANUFACTURER_ID_ADDRESS);
		let device = self.read_byte(DEVICE_ID_ADDRESS);
		self.run(&CommandSequence::software_id_exit());
		ChipId { manufacturer, device }
	}

	pub fn identify(&mut self) -> crate::AResult<Part> {
		let id = self.read_id();
		ensure!(id.manufacturer == SST_MANUFACTURER_ID,
			"Unexpected manufacturer id 0x{:02x} (expected 0x{:02x})", id.manufacturer, SST_MANUFACTURER_ID
		);
		let part = Part::from_device_id(id.device)
			.ok_or_else(|| format_err!("Unknown device id 0x{:02x}", id.device))?;
		info!("found {} ({})", part, id);
		Ok(part)
	}

	pub fn verify_byte(&mut self, address: u16, expected: u8) -> crate::AResult<()> {
		let actual = self.read_byte(address);
		ensure!(actual == expected,
			"Verify failed at {:04x}: expected {:02x}, flash is {:02x}", address, expected, actual
		);
		Ok(())
	}

	pub fn verify(&mut self, address: u16, expected: &[u8]) -> crate::AResult<()> {
		check_range(address, expected.len())?;
		for (i, b) in expected.iter().enumerate() {
			self.verify_byte(address + i as u16, *b)?;
		}
		Ok(())
	}

	pub fn blank_check(&mut self, address: u16, len: usize) -> crate::AResult<()> {
		check_range(address, len)?;
		for i in 0..len {
			let target = address + i as u16;
			let data = self.read_byte(target);
			ensure!(data == 0xff, "Not blank at {:04x}: 0x{:02x}", target, data);
		}
		Ok(())
	}
}

pub fn write_image<H: Hardware>(flash: &mut Flash<H>, offset: u16, image: &[u8], erase: EraseMode) -> crate::AResult<()> {
	check_range(offset, image.len())?;
	if image.is_empty() {
		warn!("empty image, nothing to write");
		return Ok(());
	}

	match erase {
		EraseMode::Chip => flash.erase_chip(),
		EraseMode::Sectors => {
			let first = offset as usize / SECTOR_SIZE;
			let last = (offset as usize + image.len() - 1) / SECTOR_SIZE;
			if 0 != offset as usize % SECTOR_SIZE || 0 != (offset as usize + image.len()) % SECTOR_SIZE {
				warn!("image doesn't cover whole sectors; surrounding data gets erased too");
			}
			for sector in first..=last {
				flash.erase_sector((sector * SECTOR_SIZE) as u16);
			}
		},
		EraseMode::None => {
			with_context!("target not blank", flash.blank_check(offset, image.len()))?;
		},
	}

	flash.program(offset, image)?;
	with_context!(("verifying image at 0x{:04x}", offset), flash.verify(offset, image))?;
	info!("wrote and verified {} bytes at 0x{:04x}", image.len(), offset);

	Ok(())
}

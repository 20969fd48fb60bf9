//! Mapping between the logical bus lines and the physical GPIO pins they are
//! soldered to.
//!
//! The bus lines are wired to non-contiguous, reordered pins which may even
//! live on different ports. A `Wiring` is plain data: it lists the pin for
//! every logical line, and the mapping functions scatter/gather logical
//! values to/from per-port bit patterns (`PortBits`).

use std::fmt;

mod ch32x035;

pub use self::ch32x035::CH32X035_BOARD;

pub const PORT_COUNT: usize = 3;
pub const ADDRESS_LINES: usize = 16;
pub const DATA_LINES: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Port {
	A,
	B,
	C,
}

impl Port {
	pub const ALL: [Port; PORT_COUNT] = [Port::A, Port::B, Port::C];

	pub fn index(self) -> usize {
		self as usize
	}
}

impl fmt::Display for Port {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Port::A => write!(f, "PA"),
			Port::B => write!(f, "PB"),
			Port::C => write!(f, "PC"),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pin {
	pub port: Port,
	pub bit: u8,
}

impl Pin {
	pub const fn new(port: Port, bit: u8) -> Self {
		Pin { port, bit }
	}

	// bit positions >= 32 don't exist; `Wiring::validate` rejects them
	pub fn mask(self) -> u32 {
		1u32.checked_shl(self.bit as u32).unwrap_or(0)
	}
}

impl fmt::Display for Pin {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}{}", self.port, self.bit)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ControlLine {
	/// BE input of the CPU; the programmer owns the bus while it is active
	BusEnable,
	/// PROG#: forces the flash outputs off while programming
	Program,
	/// WE# of the flash chip
	WriteEnable,
}

impl fmt::Display for ControlLine {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ControlLine::BusEnable => write!(f, "BUS_ENABLE"),
			ControlLine::Program => write!(f, "PROG#"),
			ControlLine::WriteEnable => write!(f, "WE#"),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ControlPin {
	pub pin: Pin,
	pub active_low: bool,
}

impl ControlPin {
	/// electrical level (`true` = high) to drive for the given logical state
	pub fn level(&self, active: bool) -> bool {
		active != self.active_low
	}

	/// logical state for an electrical level
	pub fn is_active(&self, level: bool) -> bool {
		level != self.active_low
	}
}

/// Bit pattern per port, indexed by `Port`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortBits(pub [u32; PORT_COUNT]);

impl PortBits {
	pub fn get(&self, port: Port) -> u32 {
		self.0[port.index()]
	}

	pub fn set(&mut self, port: Port, bits: u32) {
		self.0[port.index()] = bits;
	}

	pub fn insert(&mut self, pin: Pin) {
		self.0[pin.port.index()] |= pin.mask();
	}

	pub fn contains(&self, pin: Pin) -> bool {
		0 != self.get(pin.port) & pin.mask()
	}

	pub fn union(&self, other: &PortBits) -> PortBits {
		let mut result = *self;
		for port in Port::ALL.iter() {
			result.0[port.index()] |= other.get(*port);
		}
		result
	}

	pub fn intersects(&self, other: &PortBits) -> bool {
		Port::ALL.iter().any(|port| 0 != self.get(*port) & other.get(*port))
	}

	/// ports with at least one bit set
	pub fn ports(&self) -> impl Iterator<Item = (Port, u32)> {
		let bits = *self;
		(0..PORT_COUNT)
			.map(move |i| (Port::ALL[i], bits.0[i]))
			.filter(|(_, b)| 0 != *b)
	}
}

impl fmt::Debug for PortBits {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "PortBits(")?;
		for (i, port) in Port::ALL.iter().enumerate() {
			if i > 0 { write!(f, ", ")?; }
			write!(f, "{}: 0x{:08x}", port, self.get(*port))?;
		}
		write!(f, ")")
	}
}

/// Replace the bits selected by `mask` in `register` with those of `value`,
/// leaving all other bits alone.
pub fn merge(register: u32, mask: u32, value: u32) -> u32 {
	(register & !mask) | (value & mask)
}

fn scatter(pins: &[Pin], value: u32) -> PortBits {
	let mut bits = PortBits::default();
	for (line, pin) in pins.iter().enumerate() {
		if 0 != value & (1 << line) {
			bits.insert(*pin);
		}
	}
	bits
}

fn gather(pins: &[Pin], bits: &PortBits) -> u32 {
	let mut value = 0u32;
	for (line, pin) in pins.iter().enumerate() {
		if bits.contains(*pin) {
			value |= 1 << line;
		}
	}
	value
}

fn collect(pins: &[Pin]) -> PortBits {
	let mut bits = PortBits::default();
	for pin in pins {
		bits.insert(*pin);
	}
	bits
}

/// Pin assignment for one hardware revision.
///
/// `address[n]` is the pin carrying `An`, `data[n]` the pin carrying `Dn`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Wiring {
	pub address: [Pin; ADDRESS_LINES],
	pub data: [Pin; DATA_LINES],
	pub bus_enable: ControlPin,
	pub program: ControlPin,
	pub write_enable: ControlPin,
}

impl Wiring {
	pub fn control(&self, line: ControlLine) -> ControlPin {
		match line {
			ControlLine::BusEnable => self.bus_enable,
			ControlLine::Program => self.program,
			ControlLine::WriteEnable => self.write_enable,
		}
	}

	pub fn address_mask(&self) -> PortBits {
		collect(&self.address)
	}

	pub fn data_mask(&self) -> PortBits {
		collect(&self.data)
	}

	pub fn control_mask(&self) -> PortBits {
		collect(&[self.bus_enable.pin, self.program.pin, self.write_enable.pin])
	}

	pub fn map_address(&self, address: u16) -> PortBits {
		scatter(&self.address, address as u32)
	}

	pub fn unmap_address(&self, bits: &PortBits) -> u16 {
		gather(&self.address, bits) as u16
	}

	pub fn map_data(&self, data: u8) -> PortBits {
		scatter(&self.data, data as u32)
	}

	pub fn unmap_data(&self, bits: &PortBits) -> u8 {
		gather(&self.data, bits) as u8
	}

	/// all lines with their names, in table order
	pub fn assignments(&self) -> Vec<(String, Pin)> {
		let mut result = Vec::with_capacity(ADDRESS_LINES + DATA_LINES + 3);
		for (line, pin) in self.address.iter().enumerate() {
			result.push((format!("A{}", line), *pin));
		}
		for (line, pin) in self.data.iter().enumerate() {
			result.push((format!("D{}", line), *pin));
		}
		for line in [ControlLine::BusEnable, ControlLine::Program, ControlLine::WriteEnable].iter() {
			result.push((line.to_string(), self.control(*line).pin));
		}
		result
	}

	/// Check that every pin exists and that no pin carries two lines.
	pub fn validate(&self) -> crate::AResult<()> {
		let assignments = self.assignments();
		for (i, (name, pin)) in assignments.iter().enumerate() {
			ensure!(pin.bit < 32, "{} assigned to {}: no such pin", name, pin);
			if let Some((other, _)) = assignments[..i].iter().find(|(_, p)| p == pin) {
				bail!("{} and {} are both assigned to {}", other, name, pin);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn address_round_trip() {
		let wiring = CH32X035_BOARD;
		for address in 0..=0xffffu16 {
			assert_eq!(wiring.unmap_address(&wiring.map_address(address)), address);
		}
	}

	#[test]
	fn data_round_trip() {
		let wiring = CH32X035_BOARD;
		for data in 0..=0xffu8 {
			assert_eq!(wiring.unmap_data(&wiring.map_data(data)), data);
		}
	}

	#[test]
	fn board_masks() {
		let wiring = CH32X035_BOARD;
		assert_eq!(wiring.address_mask(), PortBits([0x01ff_803f, 0, 0]));
		assert_eq!(wiring.data_mask(), PortBits([0x0000_7f00, 0, 0x8000]));
		assert_eq!(wiring.control_mask(), PortBits([0, 0x7000, 0]));
		assert!(!wiring.address_mask().intersects(&wiring.data_mask()));
	}

	#[test]
	fn scattered_lines() {
		let wiring = CH32X035_BOARD;
		// A0 on PA15, A10 on PA0, A15 on PA5
		assert_eq!(wiring.map_address(0x0001), PortBits([1 << 15, 0, 0]));
		assert_eq!(wiring.map_address(0x0400), PortBits([1 << 0, 0, 0]));
		assert_eq!(wiring.map_address(0x8000), PortBits([1 << 5, 0, 0]));
		// D0 is the only line on port C
		assert_eq!(wiring.map_data(0x01), PortBits([0, 0, 1 << 15]));
		assert_eq!(wiring.map_data(0x80), PortBits([1 << 14, 0, 0]));
		assert_eq!(wiring.map_data(0x81).ports().collect::<Vec<_>>(), vec![(Port::A, 1 << 14), (Port::C, 1 << 15)]);
	}

	#[test]
	fn unmap_ignores_unrelated_bits() {
		let wiring = CH32X035_BOARD;
		let mut bits = wiring.map_data(0x5a);
		bits.set(Port::A, bits.get(Port::A) | 0xfe00_00ff);
		bits.set(Port::B, 0xffff_ffff);
		assert_eq!(wiring.unmap_data(&bits), 0x5a);
	}

	#[test]
	fn merge_keeps_other_bits() {
		assert_eq!(merge(0xffff_0000, 0x00ff_ff00, 0x1234_5678), 0xff34_5600);
		assert_eq!(merge(0x0000_00ff, 0, 0xffff_ffff), 0x0000_00ff);
	}

	#[test]
	fn board_is_valid() {
		CH32X035_BOARD.validate().unwrap();
	}

	#[test]
	fn duplicate_pin_rejected() {
		let mut wiring = CH32X035_BOARD;
		wiring.data[3] = wiring.address[7];
		let err = wiring.validate().unwrap_err();
		assert!(err.to_string().contains("A7 and D3"), "{}", err);
	}

	#[test]
	fn missing_pin_rejected() {
		let mut wiring = CH32X035_BOARD;
		wiring.write_enable.pin = Pin::new(Port::B, 32);
		assert!(wiring.validate().is_err());
	}

	#[test]
	fn control_polarity() {
		let we = CH32X035_BOARD.write_enable;
		assert!(we.active_low);
		assert_eq!(we.level(true), false);
		assert_eq!(we.level(false), true);
		assert!(we.is_active(false));
	}
}

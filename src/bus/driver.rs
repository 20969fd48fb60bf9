use std::time::Duration;

use crate::wiring::{
	ControlLine,
	PortBits,
	Wiring,
	merge,
};

use super::{
	Direction,
	Hardware,
};

/// Logical address/data bus on top of the raw ports.
///
/// All register updates are read-modify-write: pins not owned by the line
/// being driven keep their state.
pub struct BusDriver<H> {
	hardware: H,
	wiring: Wiring,
}

impl<H: Hardware> BusDriver<H> {
	pub fn new(hardware: H, wiring: Wiring) -> Self {
		BusDriver { hardware, wiring }
	}

	pub fn hardware(&mut self) -> &mut H {
		&mut self.hardware
	}

	pub fn into_inner(self) -> H {
		self.hardware
	}

	fn write_masked(&mut self, mask: &PortBits, value: &PortBits) {
		for (port, port_mask) in mask.ports() {
			let current = self.hardware.read_output(port);
			self.hardware.write_output(port, merge(current, port_mask, value.get(port)));
		}
	}

	fn set_directions(&mut self, mask: &PortBits, direction: Direction) {
		for (port, port_mask) in mask.ports() {
			self.hardware.set_direction(port, port_mask, direction);
		}
	}

	pub fn set_address(&mut self, address: u16) {
		trace!("address bus: 0x{:04x}", address);
		let wiring = self.wiring;
		self.write_masked(&wiring.address_mask(), &wiring.map_address(address));
	}

	pub fn set_data(&mut self, data: u8) {
		trace!("data bus: 0x{:02x}", data);
		let wiring = self.wiring;
		self.write_masked(&wiring.data_mask(), &wiring.map_data(data));
	}

	pub fn read_data(&mut self) -> u8 {
		let mut bits = PortBits::default();
		for (port, port_mask) in self.wiring.data_mask().ports() {
			bits.set(port, self.hardware.read_input(port) & port_mask);
		}
		self.wiring.unmap_data(&bits)
	}

	/// drive a control line to its active (or inactive) level
	pub fn set_line(&mut self, line: ControlLine, active: bool) {
		let control = self.wiring.control(line);
		let mut mask = PortBits::default();
		mask.insert(control.pin);
		let value = if control.level(active) { mask } else { PortBits::default() };
		self.write_masked(&mask, &value);
	}

	pub fn drive_data(&mut self) {
		let mask = self.wiring.data_mask();
		self.set_directions(&mask, Direction::Output);
	}

	pub fn release_data(&mut self) {
		let mask = self.wiring.data_mask();
		self.set_directions(&mask, Direction::Input);
	}

	/// Take the bus away from the CPU.
	///
	/// Data pins stay inputs until `drive_data`.
	pub fn enable_bus(&mut self) {
		debug!("taking over the bus");
		// output registers first, so the pins come up inactive
		self.set_line(ControlLine::WriteEnable, false);
		self.set_line(ControlLine::Program, false);
		self.set_line(ControlLine::BusEnable, true);
		let wiring = self.wiring;
		self.set_directions(&wiring.control_mask(), Direction::Output);
		self.set_directions(&wiring.address_mask(), Direction::Output);
	}

	/// Hand the bus back to the CPU.
	pub fn disable_bus(&mut self) {
		debug!("releasing the bus");
		self.set_line(ControlLine::WriteEnable, false);
		self.set_line(ControlLine::Program, false);
		let wiring = self.wiring;
		self.set_directions(&wiring.data_mask().union(&wiring.address_mask()), Direction::Input);
		self.set_line(ControlLine::BusEnable, false);
	}

	pub fn delay(&mut self, duration: Duration) {
		self.hardware.delay(duration);
	}
}

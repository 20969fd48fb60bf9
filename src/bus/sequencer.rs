use std::time::Duration;

use crate::wiring::ControlLine;

use super::{
	BusDriver,
	Hardware,
};

/// Delays used while driving the bus.
///
/// `Timing::DATASHEET` holds the minimum values the chip accepts (70 ns
/// part); software delays may be longer, never shorter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Timing {
	/// address and data stable before WE# goes active (T_AS, T_DS)
	pub setup: Duration,
	/// WE# active (T_WP)
	pub write_pulse: Duration,
	/// WE# inactive after a pulse (T_WPH)
	pub write_pulse_high: Duration,
	/// address to valid data when reading (T_AA)
	pub read_access: Duration,
	/// software ID entry/exit to valid data (T_IDA)
	pub id_access: Duration,
	/// T_BP
	pub byte_program: Duration,
	/// T_SE
	pub sector_erase: Duration,
	/// T_SCE
	pub chip_erase: Duration,
}

impl Timing {
	pub const DATASHEET: Timing = Timing {
		setup: Duration::from_nanos(40),
		write_pulse: Duration::from_nanos(40),
		write_pulse_high: Duration::from_nanos(30),
		read_access: Duration::from_nanos(70),
		id_access: Duration::from_nanos(150),
		byte_program: Duration::from_micros(20),
		sector_erase: Duration::from_millis(25),
		chip_erase: Duration::from_millis(100),
	};

	/// use `pulse` for setup and both WE# levels
	pub fn with_pulse(mut self, pulse: Duration) -> Self {
		self.setup = pulse;
		self.write_pulse = pulse;
		self.write_pulse_high = pulse;
		self
	}

	/// Reject any delay shorter than the datasheet minimum.
	pub fn validate(&self) -> crate::AResult<()> {
		let min = Timing::DATASHEET;
		let checks = [
			("setup", self.setup, min.setup),
			("write pulse", self.write_pulse, min.write_pulse),
			("write pulse high", self.write_pulse_high, min.write_pulse_high),
			("read access", self.read_access, min.read_access),
			("software ID access", self.id_access, min.id_access),
			("byte program", self.byte_program, min.byte_program),
			("sector erase", self.sector_erase, min.sector_erase),
			("chip erase", self.chip_erase, min.chip_erase),
		];
		for (name, value, min) in checks.iter() {
			ensure!(value >= min, "{} time {:?} below datasheet minimum {:?}", name, value, min);
		}
		Ok(())
	}
}

impl Default for Timing {
	fn default() -> Self {
		Timing {
			setup: Duration::from_micros(1),
			write_pulse: Duration::from_micros(1),
			write_pulse_high: Duration::from_micros(1),
			read_access: Duration::from_micros(1),
			id_access: Duration::from_micros(1),
			byte_program: Duration::from_micros(20),
			sector_erase: Duration::from_millis(25),
			chip_erase: Duration::from_millis(100),
		}
	}
}

impl<H: Hardware> BusDriver<H> {
	pub fn set_program_enable(&mut self, enabled: bool) {
		trace!("PROG# {}", if enabled { "active" } else { "inactive" });
		self.set_line(ControlLine::Program, enabled);
	}

	/// One WE# strobe. The chip latches the address on the falling and the
	/// data on the rising edge.
	pub fn pulse_write(&mut self, timing: &Timing) {
		self.set_line(ControlLine::WriteEnable, false);
		self.delay(timing.setup);
		self.set_line(ControlLine::WriteEnable, true);
		self.delay(timing.write_pulse);
		self.set_line(ControlLine::WriteEnable, false);
		self.delay(timing.write_pulse_high);
	}

	/// Assert PROG# and drive the data bus until the transaction is dropped.
	///
	/// PROG# goes active before the data pins become outputs, so the flash
	/// never drives the bus at the same time.
	pub fn start_program_transaction(&mut self, timing: &Timing, completion: Duration) -> ProgramTransaction<'_, H> {
		self.set_program_enable(true);
		self.drive_data();
		ProgramTransaction {
			bus: self,
			timing: *timing,
			completion,
		}
	}
}

/// Sequence of write pulses with PROG# held active.
///
/// Dropping it waits `completion` and only then releases PROG#.
pub struct ProgramTransaction<'a, H: Hardware + 'a> {
	bus: &'a mut BusDriver<H>,
	timing: Timing,
	completion: Duration,
}

impl<'a, H: Hardware> ProgramTransaction<'a, H> {
	pub fn write(&mut self, address: u16, data: u8) {
		trace!("write 0x{:02x} @ 0x{:04x}", data, address);
		self.bus.set_address(address);
		self.bus.set_data(data);
		self.bus.pulse_write(&self.timing);
	}
}

impl<'a, H: Hardware> Drop for ProgramTransaction<'a, H> {
	fn drop(&mut self) {
		debug!("waiting {:?} for completion", self.completion);
		self.bus.delay(self.completion);
		self.bus.set_program_enable(false);
	}
}

use std::thread;
use std::time::{
	Duration,
	Instant,
};

use crate::wiring::Port;

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// Raw access to the GPIO ports of the microcontroller.
///
/// Registers are 32 bits wide, one bit per pin.
pub trait Hardware {
	/// configure all pins in `mask` on `port`; other pins keep their direction
	fn set_direction(&mut self, port: Port, mask: u32, direction: Direction);

	/// pin levels (input data register)
	fn read_input(&mut self, port: Port) -> u32;

	/// current content of the output data register
	fn read_output(&mut self, port: Port) -> u32;

	fn write_output(&mut self, port: Port, value: u32);

	// block for (at least) `duration`
	fn delay(&mut self, duration: Duration) {
		reliable_sleep(duration);
	}
}

impl<H: Hardware + ?Sized> Hardware for &mut H {
	fn set_direction(&mut self, port: Port, mask: u32, direction: Direction) {
		(**self).set_direction(port, mask, direction)
	}

	fn read_input(&mut self, port: Port) -> u32 {
		(**self).read_input(port)
	}

	fn read_output(&mut self, port: Port) -> u32 {
		(**self).read_output(port)
	}

	fn write_output(&mut self, port: Port, value: u32) {
		(**self).write_output(port, value)
	}

	fn delay(&mut self, duration: Duration) {
		(**self).delay(duration)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sleep_never_returns_early() {
		let duration = Duration::from_millis(3);
		let start = Instant::now();
		reliable_sleep(duration);
		assert!(start.elapsed() >= duration);
	}
}

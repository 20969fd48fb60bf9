//! Bus emulation on plain GPIO pins.
//!
//! - `Hardware`: raw port access and busy waiting, supplied by the board
//! - `BusDriver`: logical address/data bus and control lines, mapped through
//!   a `Wiring`
//! - sequencer: WE# pulses and PROG# transactions with their timing

mod driver;
mod hardware;
mod sequencer;

pub use self::driver::BusDriver;

pub use self::hardware::{
	Direction,
	Hardware,
	reliable_sleep,
};

pub use self::sequencer::{
	ProgramTransaction,
	Timing,
};

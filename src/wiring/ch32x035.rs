/* CH32X035 programmer board for the 6502 flash socket */

use super::{
	ControlPin,
	Pin,
	Port,
	Wiring,
};

const fn pa(bit: u8) -> Pin {
	Pin::new(Port::A, bit)
}

const fn pb(bit: u8) -> Pin {
	Pin::new(Port::B, bit)
}

const fn pc(bit: u8) -> Pin {
	Pin::new(Port::C, bit)
}

/// Final board revision.
///
/// - A0..A9 on PA15..PA24, A10..A15 on PA0..PA5
/// - D0 on PC15 (PA15 is taken by A0), D1..D7 on PA8..PA14
/// - BUS_ENABLE on PB12: pulled low the 6502 releases the bus
/// - PROG# on PB13, WE# on PB14, both active low
///
/// A15 is routed to OE# of the flash chip, not to an address input.
pub const CH32X035_BOARD: Wiring = Wiring {
	address: [
		pa(15), pa(16), pa(17), pa(18), pa(19), pa(20), pa(21), pa(22),
		pa(23), pa(24), pa(0), pa(1), pa(2), pa(3), pa(4), pa(5),
	],
	data: [
		pc(15), pa(8), pa(9), pa(10), pa(11), pa(12), pa(13), pa(14),
	],
	bus_enable: ControlPin { pin: pb(12), active_low: true },
	program: ControlPin { pin: pb(13), active_low: true },
	write_enable: ControlPin { pin: pb(14), active_low: true },
};

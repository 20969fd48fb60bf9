#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate sst39_flashprog;
use sst39_flashprog::*;

use std::fs;
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use sst39_flashprog::sim::{
	Event,
	SimulatedBoard,
	Violation,
};
use sst39_flashprog::sst39::EraseMode;
use sst39_flashprog::wiring::CH32X035_BOARD;

// decimal or 0x-prefixed hex
struct Number(u32);

impl FromStr for Number {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.starts_with("0x") || s.starts_with("0X") {
			u32::from_str_radix(&s[2..], 16).map(Number)
		} else {
			s.parse().map(Number)
		}
	}
}

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_number(matches: &clap::ArgMatches, name: &str, max: u32) -> AResult<u32> {
	let Number(n) = get_param(matches, name)?;
	ensure!(n <= max, "parameter {} out of range: 0x{:x} (max 0x{:x})", name, n, max);
	Ok(n)
}

fn timing(matches: &clap::ArgMatches) -> AResult<Timing> {
	let mut timing = Timing::default();
	if matches.is_present("pulse_us") {
		let us: u64 = get_param(matches, "pulse_us")?;
		timing = timing.with_pulse(Duration::from_micros(us));
	}
	Ok(timing)
}

fn erase_mode(matches: &clap::ArgMatches) -> AResult<EraseMode> {
	if matches.is_present("no_erase") {
		Ok(EraseMode::None)
	} else if matches.is_present("erase") {
		get_param(matches, "erase")
	} else {
		Ok(EraseMode::Chip)
	}
}

fn report_violations(violations: &[Violation]) -> AResult<()> {
	for v in violations {
		error!("protocol violation: {:?}", v);
	}
	ensure!(violations.is_empty(), "{} protocol violations on the simulated bus", violations.len());
	Ok(())
}

fn wiring() -> AResult<()> {
	CH32X035_BOARD.validate()?;
	for (name, pin) in CH32X035_BOARD.assignments() {
		println!("{:<10} {}", name, pin);
	}
	Ok(())
}

fn print_event(event: &Event) {
	match event {
		Event::Control { line, active, at } => {
			let at = format!("{:?}", at);
			println!("{:>14} {} {}", at, line, if *active { "active" } else { "inactive" });
		},
		Event::Write { address, data, at, pulse } => {
			let at = format!("{:?}", at);
			println!("{:>14} write 0x{:02x} @ 0x{:04x} (WE# active for {:?})", at, data, address, pulse);
		},
		Event::Delay { duration, at } => {
			let at = format!("{:?}", at);
			println!("{:>14} wait {:?}", at, duration);
		},
	}
}

fn trace(timing: Timing, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut flash = Flash::new(SimulatedBoard::new(CH32X035_BOARD), CH32X035_BOARD, timing)?;
	// skip taking over the bus
	flash.bus().hardware().take_events();

	match sub_m.subcommand() {
		("erase", _) => flash.erase_chip(),
		("sector", Some(sub_m)) => {
			let address = get_number(sub_m, "ADDRESS", 0x7fff)? as u16;
			flash.erase_sector(address);
		},
		("program", Some(sub_m)) => {
			let address = get_number(sub_m, "ADDRESS", 0x7fff)? as u16;
			let data = get_number(sub_m, "DATA", 0xff)? as u8;
			flash.program_byte(address, data);
		},
		("id", _) => {
			let id = flash.read_id();
			println!("software ID: {}", id);
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand for 'trace' {:?}", cmd),
	}

	let board = flash.release();
	for event in board.events() {
		print_event(event);
	}
	report_violations(board.violations())
}

fn flash_image(timing: Timing, sub_m: &clap::ArgMatches) -> AResult<()> {
	let path = match sub_m.value_of("IMAGE") {
		Some(p) => p,
		None => bail!("missing parameter IMAGE"),
	};
	let image = fs::read(path).map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("failed to read {}: {}", path, e);
		failure::Error::from(e.context(msg))
	})?;
	let offset = if sub_m.is_present("offset") {
		get_number(sub_m, "offset", 0x7fff)? as u16
	} else {
		0
	};
	let erase = erase_mode(sub_m)?;

	let mut board = SimulatedBoard::new(CH32X035_BOARD);
	board.set_realtime(sub_m.is_present("realtime"));

	let mut flash = Flash::new(board, CH32X035_BOARD, timing)?;
	let part = flash.identify()?;
	write_image(&mut flash, offset, &image, erase)?;
	let board = flash.release();

	info!("{}: {} bytes at 0x{:04x}, {:?} of bus time", part, image.len(), offset, board.now());
	report_violations(board.violations())
}

fn flash_subcommand() -> clap::App<'static, 'static> {
	clap::SubCommand::with_name("flash")
		.about("write and verify an image on the simulated board")
		.arg(clap::Arg::with_name("offset")
			.short("o")
			.long("offset")
			.takes_value(true)
			.help("start address (default 0)"))
		.arg(clap::Arg::with_name("no_erase")
			.long("no-erase")
			.help("program without erasing first"))
		.arg(clap::Arg::with_name("erase")
			.short("e")
			.long("erase")
			.takes_value(true)
			.conflicts_with("no_erase")
			.help("chip, sectors or none (default chip)"))
		.arg(clap::Arg::with_name("realtime")
			.long("realtime")
			.help("sleep for every bus delay"))
		.arg(clap::Arg::with_name("IMAGE")
			.required(true)
			.help("image file"))
}

fn app() -> clap::App<'static, 'static> {
	clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@subcommand wiring =>
			(about: "print the pin assignment table")
		)
		(@subcommand trace =>
			(about: "run one command on the simulated board and print the bus trace")
			(@setting SubcommandRequiredElseHelp)
			(@subcommand erase =>
				(about: "chip erase")
			)
			(@subcommand sector =>
				(about: "sector erase")
				(@arg ADDRESS: +required "any address in the sector")
			)
			(@subcommand program =>
				(about: "byte program")
				(@arg ADDRESS: +required "target address")
				(@arg DATA: +required "byte to program")
			)
			(@subcommand id =>
				(about: "software ID entry, read, exit")
			)
		)
	)
	.arg(clap::Arg::with_name("pulse_us")
		.long("pulse-us")
		.takes_value(true)
		.help("setup and WE# hold times in µs (default 1)"))
	.subcommand(flash_subcommand())
}

fn main_app() -> AResult<()> {
	let matches = app().get_matches();

	let timing = timing(&matches)?;

	match matches.subcommand() {
		("wiring", _) => {
			wiring()
		},
		("trace", Some(sub_m)) => {
			trace(timing, sub_m)
		},
		("flash", Some(sub_m)) => {
			flash_image(timing, sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> clap::ArgMatches<'static> {
		let mut argv = vec!["sst39-flashprog-sim"];
		argv.extend_from_slice(args);
		app().get_matches_from_safe(argv).unwrap()
	}

	#[test]
	fn pulse_in_microseconds() {
		let matches = parse(&["--pulse-us", "2", "wiring"]);
		let t = timing(&matches).unwrap();
		assert_eq!(t.write_pulse, Duration::from_micros(2));
		assert_eq!(t.setup, Duration::from_micros(2));

		let matches = parse(&["wiring"]);
		assert_eq!(timing(&matches).unwrap(), Timing::default());
	}

	#[test]
	fn bad_pulse_named_in_error() {
		let matches = parse(&["--pulse-us", "fast", "wiring"]);
		let err = timing(&matches).unwrap_err();
		assert!(err.to_string().starts_with("invalid parameter pulse_us"), "{}", err);
	}

	#[test]
	fn flash_erase_flags() {
		let matches = parse(&["flash", "--no-erase", "rom.bin"]);
		let (_, sub_m) = matches.subcommand();
		assert_eq!(erase_mode(sub_m.unwrap()).unwrap(), EraseMode::None);

		let matches = parse(&["flash", "-o", "0x100", "--erase", "sectors", "--realtime", "rom.bin"]);
		let (_, sub_m) = matches.subcommand();
		let sub_m = sub_m.unwrap();
		assert_eq!(erase_mode(sub_m).unwrap(), EraseMode::Sectors);
		assert_eq!(get_number(sub_m, "offset", 0x7fff).unwrap(), 0x100);
		assert!(sub_m.is_present("realtime"));

		let matches = parse(&["flash", "rom.bin"]);
		let (_, sub_m) = matches.subcommand();
		assert_eq!(erase_mode(sub_m.unwrap()).unwrap(), EraseMode::Chip);
	}

	#[test]
	fn no_erase_conflicts_with_erase() {
		let argv = vec!["sst39-flashprog-sim", "flash", "--no-erase", "--erase", "chip", "rom.bin"];
		assert!(app().get_matches_from_safe(argv).is_err());
	}
}

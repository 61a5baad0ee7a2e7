use clap::{Parser, Subcommand};

use crate::{compose::Compose, info::Info};

mod common;
mod compose;
mod info;
mod input;

#[derive(Parser)]
struct Options {
	#[clap(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	Compose(Compose),
	Info(Info),
}

fn main() -> anyhow::Result<()> {
	env_logger::init();

	let opts: Options = Options::parse();
	match opts.command {
		Command::Compose(compose) => compose::compose(compose),
		Command::Info(info) => info::info(info),
	}
}

//! isobench demo suites
//!
//! Run with:
//!   cargo run -p isobench-demos                                  # All suites, one process each
//!   cargo run -p isobench-demos -- --in-process                  # Everything in this process
//!   cargo run -p isobench-demos -- list                          # List suites
//!   cargo run -p isobench-demos -- codec -D codec.items=1,8,64   # One suite, custom runs
//!   cargo run -p isobench-demos -- faulty -D faulty.abort=true   # Crash a suite process

mod codec;
mod collections;
mod faulty;
mod overhead;

use codec::Codec;
use collections::Collections;
use faulty::Faulty;
use isobench::prelude::*;
use overhead::Overhead;

register_suite!("collections" => RecordingSuite::new(Collections::default()),
    description = "HashMap, BTreeMap and Vec operations per container size");

register_suite!("codec" => RecordingSuite::new(Codec::default()),
    description = "serde_json encoding and decoding per item count");

register_suite!("faulty" => RecordingSuite::new(Faulty::default()),
    description = "Failing groups, optionally aborting the process");

register_suite!("overhead" => Overhead::default(),
    description = "Empty operations with a time-scaled run");

fn main() -> anyhow::Result<()> {
    isobench::run()
}

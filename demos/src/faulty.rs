//! Groups that fail on purpose
//!
//! `panics` and `refuses` fail inside the engine and leave error files next
//! to the record files. `aborts` takes the whole process down when
//! `faulty.abort=true`, which only an isolated batch survives.

use isobench::prelude::*;
use std::hint::black_box;

/// Set to `true` to let the `aborts` group kill the process
pub const ABORT_KEY: &str = "faulty.abort";

#[derive(Default)]
pub struct Faulty {
    abort: bool,
    counter: u64,
}

impl RecordedSuite for Faulty {
    fn title(&self) -> Option<String> {
        Some("Fault isolation".into())
    }

    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.abort = ctx.property(ABORT_KEY) == Some("true");
        Ok(())
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![
            Operation::infallible("steady", |f: &mut Faulty| {
                f.counter = black_box(f.counter.wrapping_add(1));
            }),
            Operation::infallible("panics", |f: &mut Faulty| {
                if f.counter > 0 {
                    panic!("counter was {}", f.counter);
                }
            }),
            Operation::new("refuses", |_: &mut Faulty| {
                Err(BenchError::msg("connection refused"))
            }),
            Operation::new("aborts", |f: &mut Faulty| {
                if f.abort {
                    std::process::abort();
                }
                Err(BenchError::msg(format!("{ABORT_KEY} is not set")))
            }),
        ]
    }
}

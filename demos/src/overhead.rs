//! Measurement overhead, subtracted through time scaling
//!
//! Implements [`Suite`] directly: results go to stdout instead of record
//! files. The `compensated` run removes a fixed per-batch offset
//! (`overhead.offset_ns`, default 0) from every raw batch time.

use isobench::prelude::*;
use std::hint::black_box;

/// Nanoseconds subtracted from every raw batch time
pub const OFFSET_KEY: &str = "overhead.offset_ns";

#[derive(Default)]
pub struct Overhead {
    offset_ns: i64,
    value: u64,
}

impl Suite for Overhead {
    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.offset_ns = match ctx.property(OFFSET_KEY) {
            Some(value) => value
                .parse()
                .map_err(|_| BenchError::msg(format!("invalid {OFFSET_KEY} {value:?}")))?,
            None => 0,
        };
        Ok(())
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![
            Operation::infallible("empty", |_: &mut Overhead| {}),
            Operation::infallible("black_box", |o: &mut Overhead| {
                o.value = black_box(o.value ^ 0x5bd1_e995);
            }),
        ]
    }

    fn on_group_start(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        Ok(vec![
            RunDescriptor::new(format!("{group}-raw")),
            RunDescriptor::new(format!("{group}-compensated")).with_time_scaling(1.0, -self.offset_ns),
        ])
    }

    fn on_run_end(&mut self, ctx: &mut SuiteContext, run: &RunDescriptor) -> Result<(), BenchError> {
        println!(
            "[{}] {}: {} ns/call (sd {:.3}, total {} ns)",
            ctx.formatted_progress(),
            run.name(),
            run.call_average_duration(),
            run.call_standard_deviation(),
            run.run_duration()
        );
        Ok(())
    }
}

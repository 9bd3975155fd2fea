//! Collection inserts and lookups, one run per container size
//!
//! Sizes come from the `collections.sizes` property (comma separated). Every
//! repetition starts from a freshly filled container so repetitions of a run
//! measure the same state.

use isobench::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::hint::black_box;

/// Comma separated container sizes
pub const SIZES_KEY: &str = "collections.sizes";

const DEFAULT_SIZES: [usize; 3] = [16, 256, 4096];

#[derive(Default)]
pub struct Collections {
    sizes: Vec<usize>,
    run_sizes: BTreeMap<String, usize>,
    size: u64,
    cursor: u64,
    hash: HashMap<u64, u64>,
    tree: BTreeMap<u64, u64>,
    vec: Vec<u64>,
}

fn parse_sizes(value: &str) -> Result<Vec<usize>, BenchError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(BenchError::msg(format!("invalid {SIZES_KEY} entry {s:?}"))),
            Ok(n) => Ok(n),
        })
        .collect()
}

impl Collections {
    fn next_key(&mut self) -> u64 {
        self.cursor = (self.cursor + 1) % self.size.max(1);
        self.cursor
    }
}

impl RecordedSuite for Collections {
    fn title(&self) -> Option<String> {
        Some("Collections".into())
    }

    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.sizes = match ctx.property(SIZES_KEY) {
            Some(value) => parse_sizes(value)?,
            None => DEFAULT_SIZES.to_vec(),
        };
        if self.sizes.is_empty() {
            return Err(BenchError::msg(format!("{SIZES_KEY} names no size")));
        }
        Ok(())
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![
            Operation::infallible("hashmap_insert", |c: &mut Collections| {
                let key = c.next_key();
                black_box(c.hash.insert(key, key));
            }),
            Operation::infallible("hashmap_lookup", |c: &mut Collections| {
                let key = c.next_key();
                black_box(c.hash.get(&key));
            }),
            Operation::infallible("btreemap_insert", |c: &mut Collections| {
                let key = c.next_key();
                black_box(c.tree.insert(key, key));
            }),
            Operation::infallible("vec_push", |c: &mut Collections| {
                if c.vec.len() as u64 >= c.size {
                    c.vec.clear();
                }
                let key = c.next_key();
                c.vec.push(black_box(key));
            }),
        ]
    }

    fn determine_runs(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        self.run_sizes.clear();
        Ok(self
            .sizes
            .iter()
            .map(|&size| {
                let name = format!("{group}-{size}");
                self.run_sizes.insert(name.clone(), size);
                RunDescriptor::new(name)
            })
            .collect())
    }

    fn on_repetition_start(
        &mut self,
        _ctx: &mut SuiteContext,
        run: &RunDescriptor,
        _repetition: usize,
    ) -> Result<(), BenchError> {
        let size = self
            .run_sizes
            .get(run.name())
            .copied()
            .ok_or_else(|| BenchError::msg(format!("no size for run {}", run.name())))?;

        self.size = size as u64;
        self.cursor = 0;
        self.hash = (0..self.size).map(|k| (k, k)).collect();
        self.tree = (0..self.size).map(|k| (k, k)).collect();
        self.vec = Vec::with_capacity(size);
        Ok(())
    }
}

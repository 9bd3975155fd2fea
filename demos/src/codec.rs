//! JSON encoding and decoding of an order document
//!
//! One run per item count (`codec.items`, comma separated). Rows carry the
//! encoded payload size next to the timing columns.

use isobench::prelude::*;
use serde::{Deserialize, Serialize};
use std::hint::black_box;

/// Comma separated item counts
pub const ITEMS_KEY: &str = "codec.items";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Item {
    sku: String,
    quantity: u32,
    unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Order {
    id: u64,
    customer: String,
    items: Vec<Item>,
    notes: Option<String>,
}

fn order_with(items: usize) -> Order {
    Order {
        id: 42,
        customer: "ACME Corporation".to_string(),
        items: (0..items)
            .map(|i| Item {
                sku: format!("SKU-{i:05}"),
                quantity: (i % 7) as u32 + 1,
                unit_price: 9.99 + i as f64,
            })
            .collect(),
        notes: (items % 2 == 0).then(|| "leave at the front desk".to_string()),
    }
}

#[derive(Default)]
pub struct Codec {
    counts: Vec<usize>,
    order: Option<Order>,
    encoded: String,
}

impl Codec {
    fn order(&self) -> Result<&Order, BenchError> {
        self.order
            .as_ref()
            .ok_or_else(|| BenchError::msg("no document prepared"))
    }

    fn items_of(run: &RunDescriptor) -> Result<usize, BenchError> {
        run.name()
            .rsplit('-')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| BenchError::msg(format!("run {} names no item count", run.name())))
    }
}

impl RecordedSuite for Codec {
    fn title(&self) -> Option<String> {
        Some("JSON codec".into())
    }

    fn headers(&self) -> Vec<String> {
        [
            "Order",
            "Name",
            "Payload (bytes)",
            "Operation Duration (ns)",
            "Operation Standard Deviation",
        ]
        .map(String::from)
        .to_vec()
    }

    fn initialize(&mut self, ctx: &mut SuiteContext) -> Result<(), BenchError> {
        self.counts = ctx
            .property(ITEMS_KEY)
            .unwrap_or("1,32")
            .split(',')
            .map(|s| {
                s.trim()
                    .parse::<usize>()
                    .map_err(|_| BenchError::msg(format!("invalid {ITEMS_KEY} entry {s:?}")))
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn operations(&self) -> Vec<Operation<Self>> {
        vec![
            Operation::new("encode", |c: &mut Codec| {
                let json = serde_json::to_string(c.order()?)
                    .map_err(|e| BenchError::msg(format!("encode failed: {e}")))?;
                black_box(json);
                Ok(())
            }),
            Operation::new("decode", |c: &mut Codec| {
                let order: Order = serde_json::from_str(&c.encoded)
                    .map_err(|e| BenchError::msg(format!("decode failed: {e}")))?;
                black_box(order);
                Ok(())
            }),
        ]
    }

    fn determine_runs(
        &mut self,
        _ctx: &mut SuiteContext,
        group: &str,
    ) -> Result<Vec<RunDescriptor>, BenchError> {
        Ok(self
            .counts
            .iter()
            .map(|n| RunDescriptor::new(format!("{group}-{n}")))
            .collect())
    }

    fn on_repetition_start(
        &mut self,
        _ctx: &mut SuiteContext,
        run: &RunDescriptor,
        _repetition: usize,
    ) -> Result<(), BenchError> {
        let order = order_with(Self::items_of(run)?);
        self.encoded = serde_json::to_string(&order)
            .map_err(|e| BenchError::msg(format!("encode failed: {e}")))?;
        self.order = Some(order);
        Ok(())
    }

    fn on_run_end(
        &mut self,
        _ctx: &mut SuiteContext,
        run: &RunDescriptor,
        records: &mut GroupRecorder,
    ) -> Result<(), BenchError> {
        let order = records.rows_written();
        records.write_record([
            order.to_string(),
            run.name().to_string(),
            self.encoded.len().to_string(),
            run.call_average_duration().to_string(),
            format!("{:.3}", run.call_standard_deviation()),
        ])
    }

    fn on_group_end(
        &mut self,
        _ctx: &mut SuiteContext,
        _group: &str,
        _records: &mut GroupRecorder,
    ) -> Result<(), BenchError> {
        Ok(())
    }
}

//! Distributed join across an in-process worker group.
//!
//! Every worker owns a random shard of the two input tables; the join
//! shuffles both sides so matching keys colocate, then joins locally.
//!
//! Usage: distributed_join [TOTAL_ROWS]

use std::sync::Arc;
use std::thread;

use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rand::Rng;
use table_api::{Context, Table};
use table_comm::{MemoryCommunicator, MemoryFabric};
use table_core::Result;
use table_ops::join::JoinConfig;

const WORLD_SIZE: usize = 2;

fn main() {
    tracing_subscriber::fmt::init();

    let total_rows: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1_000);
    println!("=== Distributed Join ({} rows, {} workers) ===", total_rows, WORLD_SIZE);

    let mut handles = Vec::new();
    for comm in MemoryFabric::new(WORLD_SIZE) {
        handles.push(thread::spawn(move || worker(comm, total_rows)));
    }
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                eprintln!("worker failed: {}", err);
                std::process::exit(1);
            }
            Err(_) => {
                eprintln!("worker panicked");
                std::process::exit(1);
            }
        }
    }
    println!("done");
}

fn worker(comm: MemoryCommunicator, total_rows: usize) -> Result<()> {
    let ctx = Context::init_distributed(comm);
    let count = total_rows / ctx.world_size();
    let range = total_rows as i64;
    let mut rng = rand::thread_rng();

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("cost", DataType::Int64, false),
    ]));

    let mut shard = |_: usize| -> Result<Table> {
        let ids: Vec<i64> = (0..count).map(|_| rng.gen_range(0..range)).collect();
        let costs: Vec<i64> = (0..count as i64).collect();
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(Int64Array::from(costs)),
            ],
        )
        .map_err(table_core::TableError::from)?;
        Table::from_batch(&ctx, batch)
    };
    let left = shard(0)?;
    let right = shard(1)?;

    let joined = left.distributed_join(&right, &JoinConfig::inner(0, 0))?;
    println!(
        "worker {}: {} left x {} right -> {} joined rows",
        ctx.rank(),
        left.rows()?,
        right.rows()?,
        joined.rows()?
    );

    ctx.finalize();
    Ok(())
}

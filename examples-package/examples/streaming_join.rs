//! Streaming join: workers interleave producing batches with driving the
//! exchange, and a callback receives the joined table once per worker.
//!
//! Usage: streaming_join [TOTAL_ROWS]

use std::sync::Arc;
use std::thread;

use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rand::Rng;
use table_comm::{run_until_complete, Communicator, MemoryCommunicator, MemoryFabric, StreamingJoin};
use table_core::Result;
use table_ops::join::JoinConfig;

const WORLD_SIZE: usize = 2;

fn main() {
    tracing_subscriber::fmt::init();

    let total_rows: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1_000);
    println!("=== Streaming Join ({} rows, {} workers) ===", total_rows, WORLD_SIZE);

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

fn make_batch(schema: &SchemaRef, count: usize, range: i64) -> Result<RecordBatch> {
    let mut rng = rand::thread_rng();
    let ids: Vec<i64> = (0..count).map(|_| rng.gen_range(0..range)).collect();
    let costs: Vec<i64> = (0..count as i64).collect();
    RecordBatch::try_new(
        Arc::clone(schema),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Int64Array::from(costs)),
        ],
    )
    .map_err(table_core::TableError::from)
}

fn worker(comm: MemoryCommunicator, total_rows: usize) -> Result<()> {
    let rank = comm.rank();
    let world = comm.world_size();
    let count = total_rows / world / world;
    let range = total_rows as i64;

    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("cost", DataType::Int64, false),
    ]));

    let neighbours: Vec<usize> = (0..world).collect();
    let mut join = StreamingJoin::new(
        &comm,
        neighbours.clone(),
        neighbours,
        0,
        1,
        JoinConfig::inner(0, 0),
        move |result: RecordBatch| {
            println!("worker {}: joined {} rows", rank, result.num_rows());
            true
        },
        Arc::clone(&schema),
    )?;

    for round in 0..world {
        let target = (round + rank) % world;
        let left = make_batch(&schema, count, range)?;
        let right = make_batch(&schema, count, range)?;
        while !join.left_insert(&left, target)? {
            join.is_complete()?;
        }
        while !join.right_insert(&right, target)? {
            join.is_complete()?;
        }
        // keep the transport moving while generating data
        join.is_complete()?;
    }

    join.finish();
    run_until_complete(&mut join)?;
    join.close();
    Ok(())
}

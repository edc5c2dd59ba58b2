//! Local pipeline: write two CSV files, read them back concurrently, join,
//! sort and print the result.

use std::fs::File;
use std::io::Write;

use table_api::{ops, Context};
use table_core::Result;
use table_ops::join::JoinConfig;
use table_storage::csv::{CsvReadOptions, CsvWriteOptions};

fn main() {
    tracing_subscriber::fmt::init();
    if let Err(err) = run() {
        eprintln!("pipeline failed: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let dir = std::env::temp_dir().join("table-engine-csv-pipeline");
    std::fs::create_dir_all(&dir)?;

    let users = dir.join("users.csv");
    let mut file = File::create(&users)?;
    writeln!(file, "user_id,name")?;
    writeln!(file, "3,charlie")?;
    writeln!(file, "1,alice")?;
    writeln!(file, "2,bob")?;

    let orders = dir.join("orders.csv");
    let mut file = File::create(&orders)?;
    writeln!(file, "user_id,amount")?;
    writeln!(file, "2,125")?;
    writeln!(file, "1,80")?;
    writeln!(file, "2,42")?;

    let ctx = Context::init_local();
    let options = CsvReadOptions {
        concurrent_file_reads: true,
        ..Default::default()
    };
    let paths = vec![
        users.to_string_lossy().into_owned(),
        orders.to_string_lossy().into_owned(),
    ];
    let ids = vec!["users".to_string(), "orders".to_string()];
    ops::read_csv_list(&ctx, &paths, &ids, &options)?;
    println!(
        "read {} users and {} orders",
        ops::row_count(&ctx, "users")?,
        ops::row_count(&ctx, "orders")?
    );

    ops::join_tables(&ctx, "users", "orders", &JoinConfig::inner(0, 0), "joined")?;
    ops::sort_table(&ctx, "joined", "sorted", 0)?;
    println!("joined orders, sorted by user id:");
    ops::print(&ctx, "sorted")?;

    let out = dir.join("joined.csv");
    ops::write_csv(
        &ctx,
        "sorted",
        &out.to_string_lossy(),
        &CsvWriteOptions::default(),
    )?;
    println!("wrote {}", out.display());

    ctx.finalize();
    Ok(())
}

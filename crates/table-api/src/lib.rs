//! Distributed relational table engine API.
//!
//! Tables live in a context-owned registry and are addressed by UUID
//! strings; every worker of the group holds a horizontal shard of each
//! logical table. Local operators run columnar kernels in place, the
//! distributed ones hash-partition their inputs and swap partitions over
//! the all-to-all exchange before running the local equivalent.
//!
//! # Example
//!
//! ```ignore
//! use table_api::{Context, Table};
//! use table_ops::join::JoinConfig;
//!
//! let ctx = Context::init_distributed(communicator);
//! let left = Table::from_csv(&ctx, "left.csv", &Default::default())?;
//! let right = Table::from_csv(&ctx, "right.csv", &Default::default())?;
//! let joined = left.distributed_join(&right, &JoinConfig::inner(0, 0))?;
//! joined.print()?;
//! ctx.finalize();
//! ```

pub mod context;
pub mod ops;
pub mod registry;
pub mod table;

pub use context::Context;
pub use registry::{TableData, TableRegistry};
pub use table::Table;

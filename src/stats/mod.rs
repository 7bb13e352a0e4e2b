//! Parsers for cgroup statistic and bandwidth files.
//!
//! - [`KeyValueStat`]: trait for multi-line `<key> <value>` files.
//! - [`CpuStat`] / [`CpuMax`]: v2 `cpu.stat` and `cpu.max`.
//! - [`MemoryStat`]: `memory.stat` of either backend.

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::{CpuMax, CpuStat};
pub use error::StatParseError;
pub use memory::{MemoryStat, V1MemoryStat, V2MemoryStat};
pub use parser::KeyValueStat;

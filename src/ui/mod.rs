pub mod table;

pub use table::{TableBuilder, stats_table};

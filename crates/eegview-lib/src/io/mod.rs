pub mod raw;

pub use raw::{parse_raw_table, read_raw_table, RawRow, RawTable, ReaderOptions};

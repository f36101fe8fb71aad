pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    error, header, human_bytes, muted, record_deleted, record_modified, record_new, success, summary_row, warn,
};
pub use table::{TableBuilder, entries_table, stats_table};
pub use theme::{Theme, theme};

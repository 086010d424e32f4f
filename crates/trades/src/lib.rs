pub mod day_grouping;
pub mod duplicates;
pub mod files;
pub mod loader;
pub mod movements;
pub mod report;
pub mod trade;

// Re-export commonly used items
pub use crate::day_grouping::{
    fold_by_day, group_by_day, read_grouped_days, write_grouped_days, DayGroupingSummary, DayLayout,
    DayRecord, GroupedDays,
};
pub use crate::duplicates::{duplicate_report, find_duplicates, DuplicateReport};
pub use crate::files::{count_entries, read_json_file, write_json_file};
pub use crate::loader::{
    load_trades_from_csv, load_trades_from_file, load_trades_from_json_str, load_trades_from_value,
    LoadOutcome, RejectedEntry,
};
pub use crate::movements::{
    movements_match, reconcile_movements, AmbiguousMovement, MovementReport,
};
pub use crate::report::to_pretty_json;
pub use crate::trade::{sort_by_time, FieldError, TradeError, TradeKey, TradeRecord, TradeType};

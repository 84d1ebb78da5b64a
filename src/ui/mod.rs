pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    error, header, muted, section, status, success, summary_row, warn,
};
pub use progress::ImportProgress;
pub use table::{stats_table, url_table, user_table, visit_table, TableBuilder};
pub use theme::{theme, Theme};

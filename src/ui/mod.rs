pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{banner, edge_line, error, match_line, node_line, section, status, success, summary_row, warn};
pub use progress::Spinner;
pub use table::{nodes_table, stats_table};
pub use theme::{Theme, theme};

pub struct Icons;

impl Icons {
    pub const SEARCH: &str = "🔍";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const EDGE: &str = "🔗";
    pub const GRAPH: &str = "🕸️";
    pub const NODE: &str = "🔵";
    pub const DEL: &str = "🗑️";
    pub const DATABASE: &str = "🗄️";
    pub const MERGE: &str = "🧬";
    pub const RIGHT: &str = "➡️";
    pub const PACKAGE: &str = "📦";
}

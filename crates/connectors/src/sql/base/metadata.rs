use serde::Serialize;

/// Shape of a table as seen at discovery time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub rows: u64,
    pub avg_row_bytes: u64,
}

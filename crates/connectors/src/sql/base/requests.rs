/// One page of a table, read in the adapter's stable row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRowsRequest {
    pub table: String,
    pub limit: u64,
    pub offset: u64,
}

impl FetchRowsRequest {
    pub fn new(table: impl Into<String>, limit: u64, offset: u64) -> Self {
        FetchRowsRequest {
            table: table.into(),
            limit,
            offset,
        }
    }
}

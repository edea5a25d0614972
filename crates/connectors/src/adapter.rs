use crate::{
    error::AdapterError,
    sql::{base::adapter::SqlAdapter, memory::adapter::MemoryAdapter, mysql::adapter::MySqlAdapter},
};
use std::sync::Arc;

#[derive(Clone)]
pub enum Adapter {
    MySql(MySqlAdapter),
    Memory(MemoryAdapter),
}

impl Adapter {
    /// Picks the adapter from the URL scheme: `mysql://…` or `memory://`.
    pub async fn connect(url: &str) -> Result<Self, AdapterError> {
        let scheme = url.split("://").next().unwrap_or_default();
        match scheme {
            "mysql" => Ok(Adapter::MySql(MySqlAdapter::connect(url).await?)),
            "memory" => Ok(Adapter::Memory(MemoryAdapter::new())),
            other => Err(AdapterError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn get_sql(&self) -> &(dyn SqlAdapter + Send + Sync) {
        match self {
            Adapter::MySql(adapter) => adapter,
            Adapter::Memory(adapter) => adapter,
        }
    }

    pub fn into_shared(self) -> Arc<dyn SqlAdapter> {
        match self {
            Adapter::MySql(adapter) => Arc::new(adapter),
            Adapter::Memory(adapter) => Arc::new(adapter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_scheme() {
        let err = Adapter::connect("postgres://localhost/db").await.err();
        assert!(matches!(err, Some(AdapterError::UnsupportedScheme(s)) if s == "postgres"));
    }

    #[tokio::test]
    async fn memory_scheme_needs_no_server() {
        let adapter = Adapter::connect("memory://").await.unwrap();
        assert!(matches!(adapter, Adapter::Memory(_)));
    }
}

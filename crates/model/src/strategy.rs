use crate::options::DbExportMode;
use serde::{Deserialize, Serialize};

/// Thresholds for grouping and sizing tables in adaptive mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePlanConfig {
    /// Tables below this row count are dumped whole and may be grouped.
    pub small_table_rows: u64,
    pub group_max_tables: usize,
    pub group_max_rows: u64,
    pub min_rows: u64,
    pub max_rows: u64,
    pub medium_table_rows: u64,
    pub large_table_rows: u64,
    pub wide_row_bytes: u64,
}

impl Default for TablePlanConfig {
    fn default() -> Self {
        TablePlanConfig {
            small_table_rows: 1_000,
            group_max_tables: 5,
            group_max_rows: 5_000,
            min_rows: 100,
            max_rows: 50_000,
            medium_table_rows: 100_000,
            large_table_rows: 1_000_000,
            wide_row_bytes: 4_096,
        }
    }
}

/// How rows per chunk are chosen. Picked once at session start and carried
/// in the session so a resumed run keeps the same plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchingStrategy {
    Uniform {
        rows_per_step: u64,
    },
    Adaptive {
        memory_budget_bytes: u64,
        plan: TablePlanConfig,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertStyle {
    PerRow,
    Bulk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpStrategy {
    pub batching: BatchingStrategy,
    pub inserts: InsertStyle,
}

impl DumpStrategy {
    pub fn uniform(rows_per_step: u64) -> Self {
        DumpStrategy {
            batching: BatchingStrategy::Uniform { rows_per_step },
            inserts: InsertStyle::PerRow,
        }
    }

    /// Maps the user-facing export mode onto a concrete strategy.
    /// `memory_fraction` of `memory_limit_bytes` bounds a chunk in adaptive mode.
    pub fn for_mode(
        mode: DbExportMode,
        rows_per_step: u64,
        memory_limit_bytes: u64,
        memory_fraction: f64,
        plan: TablePlanConfig,
    ) -> Self {
        match mode {
            DbExportMode::Standard => DumpStrategy::uniform(rows_per_step),
            DbExportMode::Optimized => DumpStrategy {
                batching: BatchingStrategy::Uniform { rows_per_step },
                inserts: InsertStyle::Bulk,
            },
            DbExportMode::Adaptive => DumpStrategy {
                batching: BatchingStrategy::Adaptive {
                    memory_budget_bytes: ((memory_limit_bytes as f64) * memory_fraction) as u64,
                    plan,
                },
                inserts: InsertStyle::Bulk,
            },
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self.batching, BatchingStrategy::Adaptive { .. })
    }
}

/// Mean-file-size breakpoints that map a look-ahead window onto a file
/// batch size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBatchTiers {
    pub small_mean_bytes: u64,
    pub large_mean_bytes: u64,
    /// Mean size at which the large tier bottoms out.
    pub huge_mean_bytes: u64,
    pub small_batch: usize,
    pub medium_batch: (usize, usize),
    pub large_batch: (usize, usize),
}

impl Default for FileBatchTiers {
    fn default() -> Self {
        FileBatchTiers {
            small_mean_bytes: 100 * 1024,
            large_mean_bytes: 5 * 1024 * 1024,
            huge_mean_bytes: 50 * 1024 * 1024,
            small_batch: 100,
            medium_batch: (25, 75),
            large_batch: (10, 25),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_map_to_strategies() {
        let plan = TablePlanConfig::default();
        let s = DumpStrategy::for_mode(DbExportMode::Standard, 5000, 0, 0.25, plan.clone());
        assert_eq!(s, DumpStrategy::uniform(5000));

        let s = DumpStrategy::for_mode(DbExportMode::Optimized, 5000, 0, 0.25, plan.clone());
        assert_eq!(s.inserts, InsertStyle::Bulk);
        assert!(!s.is_adaptive());

        let s = DumpStrategy::for_mode(DbExportMode::Adaptive, 5000, 1000, 0.25, plan);
        match s.batching {
            BatchingStrategy::Adaptive {
                memory_budget_bytes,
                ..
            } => assert_eq!(memory_budget_bytes, 250),
            _ => panic!("expected adaptive"),
        }
    }
}

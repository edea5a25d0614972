use engine_core::state::models::{TableBatch, TableInfo};
use model::strategy::{BatchingStrategy, DumpStrategy, TablePlanConfig};

/// Orders the discovered tables into dump batches.
///
/// Uniform plans give every table its own batch with a fixed chunk size.
/// Adaptive plans size chunks per table and pack runs of small tables into
/// grouped batches that are dumped whole in one tick.
pub fn plan_batches(tables: &[TableInfo], strategy: &DumpStrategy) -> Vec<TableBatch> {
    match &strategy.batching {
        BatchingStrategy::Uniform { rows_per_step } => tables
            .iter()
            .map(|t| TableBatch {
                tables: vec![t.name.clone()],
                rows_per_chunk: (*rows_per_step).max(1),
                grouped: false,
            })
            .collect(),
        BatchingStrategy::Adaptive {
            memory_budget_bytes,
            plan,
        } => plan_adaptive(tables, *memory_budget_bytes, plan),
    }
}

fn plan_adaptive(tables: &[TableInfo], budget: u64, plan: &TablePlanConfig) -> Vec<TableBatch> {
    let mut batches = Vec::new();
    let mut group: Vec<String> = Vec::new();
    let mut group_rows = 0u64;

    let flush = |group: &mut Vec<String>, group_rows: &mut u64, batches: &mut Vec<TableBatch>| {
        if group.is_empty() {
            return;
        }
        batches.push(TableBatch {
            grouped: group.len() > 1,
            tables: std::mem::take(group),
            rows_per_chunk: plan.small_table_rows.max(1),
        });
        *group_rows = 0;
    };

    for table in tables {
        if table.rows < plan.small_table_rows {
            if group.len() >= plan.group_max_tables
                || (!group.is_empty() && group_rows + table.rows > plan.group_max_rows)
            {
                flush(&mut group, &mut group_rows, &mut batches);
            }
            group.push(table.name.clone());
            group_rows += table.rows;
        } else {
            flush(&mut group, &mut group_rows, &mut batches);
            batches.push(TableBatch {
                tables: vec![table.name.clone()],
                rows_per_chunk: adaptive_chunk_rows(table, budget, plan),
                grouped: false,
            });
        }
    }
    flush(&mut group, &mut group_rows, &mut batches);
    batches
}

/// Rows per chunk for one table: as many average rows as fit the memory
/// budget, cut down for wide rows and very large tables.
pub fn adaptive_chunk_rows(table: &TableInfo, budget: u64, plan: &TablePlanConfig) -> u64 {
    let avg = table.avg_row_bytes.max(1);
    let mut rows = budget / avg;
    if avg >= plan.wide_row_bytes || table.rows >= plan.large_table_rows {
        rows /= 4;
    } else if table.rows >= plan.medium_table_rows {
        rows /= 2;
    }
    rows.clamp(plan.min_rows, plan.max_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, rows: u64, avg: u64) -> TableInfo {
        TableInfo {
            name: name.into(),
            rows,
            avg_row_bytes: avg,
        }
    }

    fn adaptive(budget: u64) -> DumpStrategy {
        DumpStrategy {
            batching: BatchingStrategy::Adaptive {
                memory_budget_bytes: budget,
                plan: TablePlanConfig::default(),
            },
            inserts: model::strategy::InsertStyle::Bulk,
        }
    }

    #[test]
    fn uniform_is_one_batch_per_table() {
        let tables = [table("a", 10, 1), table("b", 50_000, 1)];
        let batches = plan_batches(&tables, &DumpStrategy::uniform(5000));
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.rows_per_chunk == 5000 && !b.grouped));
    }

    #[test]
    fn groups_small_tables_within_limits() {
        let mut tables: Vec<TableInfo> = (0..7).map(|i| table(&format!("s{i}"), 10, 100)).collect();
        tables.push(table("big", 200_000, 200));
        tables.push(table("m1", 900, 100));
        tables.push(table("m2", 900, 100));
        tables.push(table("m3", 900, 100));
        tables.push(table("m4", 900, 100));
        tables.push(table("m5", 900, 100));
        tables.push(table("m6", 900, 100));

        let batches = plan_batches(&tables, &adaptive(64 * 1024 * 1024));
        let shapes: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.tables.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(
            shapes,
            vec![
                vec!["s0", "s1", "s2", "s3", "s4"],
                vec!["s5", "s6"],
                vec!["big"],
                // 5 * 900 = 4500 fits, a sixth would exceed 5000 rows
                vec!["m1", "m2", "m3", "m4", "m5"],
                vec!["m6"],
            ]
        );
        assert!(batches[0].grouped);
        assert!(!batches[4].grouped);
    }

    #[test]
    fn chunk_rows_follow_table_shape() {
        let plan = TablePlanConfig::default();
        let budget = 64 * 1024 * 1024;
        // narrow rows, clamped to the ceiling
        assert_eq!(adaptive_chunk_rows(&table("t", 5_000, 100), budget, &plan), 50_000);
        // wide rows get a quarter of what fits
        assert_eq!(
            adaptive_chunk_rows(&table("t", 5_000, 8192), budget, &plan),
            (budget / 8192) / 4
        );
        // medium table halves
        assert_eq!(
            adaptive_chunk_rows(&table("t", 150_000, 2048), budget, &plan),
            (budget / 2048) / 2
        );
        // never below the floor
        assert_eq!(adaptive_chunk_rows(&table("t", 5_000, 1 << 30), budget, &plan), 100);
    }
}

#![allow(dead_code)]

use connectors::archive::reader::ArchiveReader;
use engine_runtime::{
    controller::TickHandler,
    protocol::{TickRequest, TickResponse},
};
use std::path::Path;

/// Ticks `handler` until its session is terminal and returns every response.
pub async fn drive(handler: &mut dyn TickHandler, max_ticks: usize) -> Vec<TickResponse> {
    let kind = handler.kind();
    let mut responses = Vec::new();
    for _ in 0..max_ticks {
        let response = handler.handle(TickRequest::advance(kind, None)).await;
        let terminal = response.status.is_terminal();
        responses.push(response);
        if terminal {
            return responses;
        }
    }
    panic!("{} session not terminal after {max_ticks} ticks", kind.as_str());
}

/// Ticks `handler` until the reported step differs from `step` or the
/// session ends, returning how many ticks ran while on `step`.
pub async fn ticks_on_step(handler: &mut dyn TickHandler, step: &str, max_ticks: usize) -> usize {
    let kind = handler.kind();
    let mut count = 0;
    for _ in 0..max_ticks {
        let before = handler.handle(TickRequest::status(kind)).await;
        if before.status.step.as_deref() != Some(step) || before.status.is_terminal() {
            return count;
        }
        let response = handler.handle(TickRequest::advance(kind, None)).await;
        assert!(response.success, "tick failed: {}", response.message);
        count += 1;
    }
    panic!("still on {step} after {max_ticks} ticks");
}

pub fn archive_entries(path: &Path) -> Vec<String> {
    ArchiveReader::open(path).expect("open archive").entry_names()
}

pub fn archive_entry(path: &Path, name: &str) -> Vec<u8> {
    ArchiveReader::open(path)
        .expect("open archive")
        .read_entry(name)
        .expect("read entry")
}

pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

use crate::error::ProcessingError;
use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

/// One statement and the file offset just past its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub end_offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementBatch {
    pub statements: Vec<SqlStatement>,
    /// Where the next read should start.
    pub next_offset: u64,
    pub eof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Splits SQL text on `;` outside string literals, quoted identifiers and
/// comments. Comments are dropped from the statement text.
struct StatementScanner {
    state: ScanState,
    buffer: Vec<u8>,
}

impl StatementScanner {
    fn new() -> Self {
        StatementScanner {
            state: ScanState::Normal,
            buffer: Vec::new(),
        }
    }

    /// Scans `line[start..]` and returns the index just past the next
    /// terminator together with the finished statement.
    fn scan(&mut self, line: &[u8], start: usize) -> Option<(usize, String)> {
        let mut i = start;
        while i < line.len() {
            let b = line[i];
            let next = line.get(i + 1).copied();
            match self.state {
                ScanState::Normal => match b {
                    b'\'' | b'"' | b'`' => {
                        self.state = ScanState::Quoted(b);
                        self.buffer.push(b);
                    }
                    b'-' if next == Some(b'-')
                        && line.get(i + 2).is_none_or(|c| c.is_ascii_whitespace()) =>
                    {
                        self.state = ScanState::LineComment;
                    }
                    b'#' => self.state = ScanState::LineComment,
                    b'/' if next == Some(b'*') => {
                        self.state = ScanState::BlockComment;
                        i += 2;
                        continue;
                    }
                    b';' => return Some((i + 1, self.take())),
                    _ => self.buffer.push(b),
                },
                ScanState::Quoted(q) => {
                    self.buffer.push(b);
                    if b == b'\\' && q != b'`' {
                        if let Some(escaped) = next {
                            self.buffer.push(escaped);
                            i += 2;
                            continue;
                        }
                    } else if b == q {
                        self.state = ScanState::Normal;
                    }
                }
                ScanState::LineComment => {
                    if b == b'\n' {
                        self.state = ScanState::Normal;
                        self.buffer.push(b'\n');
                    }
                }
                ScanState::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        self.state = ScanState::Normal;
                        self.buffer.push(b' ');
                        i += 2;
                        continue;
                    }
                }
            }
            i += 1;
        }
        None
    }

    /// No partial statement is pending.
    fn is_idle(&self) -> bool {
        self.state == ScanState::Normal && self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    fn take(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        text
    }
}

/// Reads up to `max` complete statements from `path` starting at byte
/// `offset`. A trailing statement without terminator is returned at EOF.
pub fn read_statements(
    path: &Path,
    offset: u64,
    max: usize,
) -> Result<StatementBatch, ProcessingError> {
    let max = max.max(1);
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut scanner = StatementScanner::new();
    let mut batch = StatementBatch {
        next_offset: offset,
        ..StatementBatch::default()
    };
    let mut line = Vec::new();
    let mut line_start = offset;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }

        let mut pos = 0;
        while let Some((end, sql)) = scanner.scan(&line, pos) {
            pos = end;
            let end_offset = line_start + end as u64;
            batch.next_offset = end_offset;
            if !sql.is_empty() {
                batch.statements.push(SqlStatement { sql, end_offset });
                if batch.statements.len() >= max {
                    return Ok(batch);
                }
            }
        }

        line_start += read as u64;
        if scanner.is_idle() {
            batch.next_offset = line_start;
        }
    }

    let tail = scanner.take();
    if !tail.is_empty() {
        batch.statements.push(SqlStatement {
            sql: tail,
            end_offset: line_start,
        });
    }
    batch.next_offset = line_start;
    batch.eof = true;
    Ok(batch)
}

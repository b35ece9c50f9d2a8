//! Trace operations: the input stream consumed by a [`ProcessorCore`](crate::core::ProcessorCore).
//!
//! The trace reader itself is an external collaborator; this module owns
//! only the record shape and a couple of readers useful for tests and for
//! the CLI's file-backed input.

use std::io::BufRead;
use std::path::Path;

use crate::error::SimError;

/// The kind of operation a trace record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// A load from memory.
    MemLoad,
    /// A store to memory.
    MemStore,
    /// A conditional or unconditional branch.
    Branch,
    /// A single-cycle ALU operation.
    Alu,
    /// A multi-cycle ("long") ALU operation, e.g. multiply/divide.
    AluLong,
}

/// One immutable trace record, as produced by the trace reader and consumed
/// exactly once by the core that fetches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOp {
    /// The operation kind.
    pub kind: TraceKind,
    /// Program counter of this instruction.
    pub pc_address: u64,
    /// Program counter of the (statically) following instruction.
    pub next_pc_address: u64,
    /// Memory address touched by a `MemLoad`/`MemStore`; unused otherwise.
    pub mem_address: u64,
    /// Access size in bytes for a memory op.
    pub size: u32,
    /// Source register numbers (`None` if the operand is unused).
    pub src_reg: [Option<u32>; 2],
    /// Destination register number (`None` if the op has no destination).
    pub dest_reg: Option<u32>,
}

/// Supplies a sequence of [`TraceOp`]s, one at a time, until exhausted.
///
/// Trace exhaustion is not an error: a `None` return means the core stops
/// fetching for that processor while letting in-flight work drain, per the
/// simulator's termination rule.
pub trait TraceReader {
    /// Returns the next operation, or `None` once the trace is exhausted.
    fn next_op(&mut self) -> Option<TraceOp>;
}

/// An in-memory trace, primarily useful for tests.
#[derive(Debug, Clone, Default)]
pub struct VecTraceReader {
    ops: std::collections::VecDeque<TraceOp>,
}

impl VecTraceReader {
    /// Builds a reader that replays `ops` in order.
    #[must_use]
    pub fn new(ops: impl IntoIterator<Item = TraceOp>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
        }
    }
}

impl TraceReader for VecTraceReader {
    fn next_op(&mut self) -> Option<TraceOp> {
        self.ops.pop_front()
    }
}

/// A trace backed by a flat text file, one record per line.
///
/// Line format (whitespace-separated): `kind pc next_pc mem_addr size src0 src1 dest`,
/// where `kind` is one of `L`, `S`, `B`, `A`, `AL` (load, store, branch, alu,
/// long-alu) and a register field of `-` means "unused".
#[derive(Debug)]
pub struct FileTraceReader {
    lines: std::io::Lines<std::io::BufReader<std::fs::File>>,
}

impl FileTraceReader {
    /// Opens `path` as a trace file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| SimError::Config(format!("cannot open trace {}: {e}", path.display())))?;
        Ok(Self {
            lines: std::io::BufReader::new(file).lines(),
        })
    }

    fn parse_reg(field: &str) -> Option<u32> {
        if field == "-" {
            None
        } else {
            field.parse().ok()
        }
    }

    fn parse_line(line: &str) -> Option<TraceOp> {
        let mut fields = line.split_whitespace();
        let kind = match fields.next()? {
            "L" => TraceKind::MemLoad,
            "S" => TraceKind::MemStore,
            "B" => TraceKind::Branch,
            "A" => TraceKind::Alu,
            "AL" => TraceKind::AluLong,
            _ => return None,
        };
        let pc_address = u64::from_str_radix(fields.next()?.trim_start_matches("0x"), 16).ok()?;
        let next_pc_address =
            u64::from_str_radix(fields.next()?.trim_start_matches("0x"), 16).ok()?;
        let mem_address = u64::from_str_radix(fields.next()?.trim_start_matches("0x"), 16).ok()?;
        let size = fields.next()?.parse().ok()?;
        let src0 = Self::parse_reg(fields.next()?);
        let src1 = Self::parse_reg(fields.next()?);
        let dest_reg = Self::parse_reg(fields.next()?);
        Some(TraceOp {
            kind,
            pc_address,
            next_pc_address,
            mem_address,
            size,
            src_reg: [src0, src1],
            dest_reg,
        })
    }
}

impl TraceReader for FileTraceReader {
    fn next_op(&mut self) -> Option<TraceOp> {
        for line in self.lines.by_ref() {
            let line = line.ok()?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(op) = Self::parse_line(line) {
                return Some(op);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_reader_replays_in_order() {
        let op = TraceOp {
            kind: TraceKind::Alu,
            pc_address: 0,
            next_pc_address: 4,
            mem_address: 0,
            size: 0,
            src_reg: [None, None],
            dest_reg: Some(1),
        };
        let mut r = VecTraceReader::new([op, op]);
        assert_eq!(r.next_op(), Some(op));
        assert_eq!(r.next_op(), Some(op));
        assert_eq!(r.next_op(), None);
    }

    #[test]
    fn file_reader_parses_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(f, "L 0x0 0x4 0x100 8 - - r1").unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "A 0x4 0x8 0x0 0 r1 r2 r3").unwrap();
        let mut reader = FileTraceReader::open(f.path()).unwrap();
        let first = reader.next_op().unwrap();
        assert_eq!(first.kind, TraceKind::MemLoad);
        assert_eq!(first.mem_address, 0x100);
        assert_eq!(first.dest_reg, Some(1));
        let second = reader.next_op().unwrap();
        assert_eq!(second.kind, TraceKind::Alu);
        assert_eq!(second.src_reg, [Some(1), Some(2)]);
        assert_eq!(reader.next_op(), None);
    }
}

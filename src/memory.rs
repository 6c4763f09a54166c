use crate::error::{Error, Result};

/// A single memory cell.
///
/// Cells are 64-bit two's-complement integers and all arithmetic on them
/// wraps. Operands, addresses, and character codes are all cells.
pub type Cell = i64;

/// Operand value with a special meaning: "read a character" in the A slot,
/// "write a character" in the B slot, and "halt" as a branch target.
pub const SPECIAL: Cell = -1;

/// Default upper bound on the memory extent, in cells.
pub const DEFAULT_MEMORY_LIMIT: usize = 1 << 24;

/// Largest memory limit the command line accepts: 2 GiB of cells.
pub const MAX_MEMORY_LIMIT: usize = 1 << 28;

/// The flat code-and-data store.
///
/// Conceptually unbounded and zero-initialized. Backed by a dense buffer
/// that grows on write and zero-fills any gap; reads past the end yield 0.
#[derive(Debug, Clone)]
pub struct Memory {
    cells: Vec<Cell>,
    limit: usize,
}

impl Memory {
    pub fn new(limit: usize) -> Self {
        Self {
            cells: Vec::new(),
            limit,
        }
    }

    /// Largest number of cells this memory may hold.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of cells currently backed by the buffer. Every address at or
    /// beyond this reads as zero.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }

    /// Zero every cell and release the buffer.
    pub fn clear(&mut self) {
        self.cells = Vec::new();
    }

    /// Validate that `address` may be written, without writing it.
    pub fn check(&self, address: Cell) -> Result<usize> {
        let index = index_of(address)?;
        if index >= self.limit {
            return Err(Error::MemoryLimit {
                address,
                limit: self.limit,
            });
        }
        Ok(index)
    }

    #[inline]
    pub fn read(&self, address: Cell) -> Result<Cell> {
        let index = index_of(address)?;
        Ok(self.cells.get(index).copied().unwrap_or(0))
    }

    #[inline]
    pub fn write(&mut self, address: Cell, value: Cell) -> Result<()> {
        let index = self.check(address)?;
        if index < self.cells.len() {
            self.cells[index] = value;
        } else if value != 0 {
            self.cells.resize(index + 1, 0);
            self.cells[index] = value;
        }
        Ok(())
    }

    /// Copy `values` into consecutive cells starting at `base`.
    ///
    /// The whole range is validated first, so either every cell is written
    /// or none is.
    pub fn write_slice(&mut self, base: Cell, values: &[Cell]) -> Result<()> {
        let start = index_of(base)?;
        let end = start.saturating_add(values.len());
        if end > self.limit {
            return Err(Error::MemoryLimit {
                address: base.saturating_add(values.len().saturating_sub(1) as Cell),
                limit: self.limit,
            });
        }
        if end > self.cells.len() {
            self.cells.resize(end, 0);
        }
        self.cells[start..end].copy_from_slice(values);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

fn index_of(address: Cell) -> Result<usize> {
    usize::try_from(address).map_err(|_| Error::InvalidAddress { address })
}

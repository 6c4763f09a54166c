use tracing::debug;

use crate::error::{Error, Result};
use crate::io::Console;
use crate::machine::Machine;
use crate::memory::Cell;

/// Parse program text: whitespace-separated signed decimal integers, one
/// per cell.
///
/// The whole text is parsed before anything is returned, so a bad token
/// anywhere means no cells at all.
pub fn parse_program(text: &str) -> Result<Vec<Cell>> {
    let mut cells = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            let value = token.parse::<Cell>().map_err(|_| Error::Parse {
                line: line_no + 1,
                token: token.to_string(),
            })?;
            cells.push(value);
        }
    }
    Ok(cells)
}

impl<C: Console> Machine<C> {
    /// Clear memory, move the program counter to 0, and drop any staged
    /// input.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.pc = 0;
        self.bridge.discard_staged();
    }

    /// Load a program from text at address 0.
    ///
    /// With `reset`, the machine is reset first and starts at the new
    /// program. Without it, the cells are overlaid on the current memory and
    /// the program counter is left alone.
    ///
    /// Loading is all-or-nothing: on a parse error the machine is not
    /// touched, whether or not `reset` was requested.
    pub fn load_from_text(&mut self, text: &str, reset: bool) -> Result<usize> {
        let cells = parse_program(text)?;
        if reset {
            self.load(&cells)
        } else {
            self.load_at(0, &cells)
        }
    }

    /// Reset the machine and install `values` as the complete program.
    pub fn load(&mut self, values: &[Cell]) -> Result<usize> {
        if values.len() > self.memory.limit() {
            return Err(Error::MemoryLimit {
                address: values.len() as Cell - 1,
                limit: self.memory.limit(),
            });
        }
        self.reset();
        self.memory.write_slice(0, values)?;
        debug!(cells = values.len(), "program loaded");
        Ok(values.len())
    }

    /// Write `values` starting at `base` without resetting.
    ///
    /// Callers arrange for the range not to collide with the running
    /// program; nothing is checked beyond the address range itself.
    pub fn load_at(&mut self, base: Cell, values: &[Cell]) -> Result<usize> {
        self.memory.write_slice(base, values)?;
        debug!(base, cells = values.len(), "cells placed");
        Ok(values.len())
    }
}

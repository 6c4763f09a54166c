use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::memory::{Cell, SPECIAL};

/// Scratch cell that holds zero between macros.
pub const Z: &str = "Z";
/// Scratch cell used by [`Asm::beq`].
const T: &str = "T";
/// Scratch cell used by the `*_const` comparisons.
const U: &str = "U";

/// One operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A literal value, placed as is.
    Lit(Cell),
    /// The address of a label.
    Label(String),
    /// The address of the following instruction.
    Next,
}

impl From<Cell> for Operand {
    fn from(value: Cell) -> Self {
        Operand::Lit(value)
    }
}

impl From<&str> for Operand {
    fn from(label: &str) -> Self {
        Operand::Label(label.to_string())
    }
}

impl From<&String> for Operand {
    fn from(label: &String) -> Self {
        Operand::Label(label.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Place {
    Code(usize),
    Data(usize),
}

/// An assembler for SUBLEQ programs with symbolic operands.
///
/// Code is emitted from address 0 in order. Data cells (variables and the
/// constant pool) are placed after the last instruction. Labels may be used
/// before they are defined; they are resolved by [`finish`](Self::finish).
///
/// The macros keep [`Z`] at zero on exit and may clobber two further
/// private scratch cells.
pub struct Asm {
    code: Vec<Operand>,
    data: Vec<Cell>,
    labels: HashMap<String, Place>,
    constants: HashMap<Cell, String>,
    fresh: usize,
    duplicate: Option<String>,
}

impl Asm {
    pub fn new() -> Self {
        let mut asm = Self {
            code: Vec::new(),
            data: Vec::new(),
            labels: HashMap::new(),
            constants: HashMap::new(),
            fresh: 0,
            duplicate: None,
        };
        asm.var(Z, 0);
        asm.var(T, 0);
        asm.var(U, 0);
        asm
    }

    fn define(&mut self, name: &str, place: Place) {
        if self.labels.insert(name.to_string(), place).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
    }

    /// Define `name` at the next instruction.
    pub fn label(&mut self, name: &str) {
        self.define(name, Place::Code(self.code.len()));
    }

    /// A label name no other call to `fresh` returns.
    pub fn fresh(&mut self, stem: &str) -> String {
        self.fresh += 1;
        format!("{stem}@{}", self.fresh)
    }

    /// Reserve a data cell named `name` holding `init`.
    pub fn var(&mut self, name: &str, init: Cell) {
        self.define(name, Place::Data(self.data.len()));
        self.data.push(init);
    }

    /// Label of a read-only data cell holding `value`. Equal values share
    /// one cell.
    pub fn constant(&mut self, value: Cell) -> String {
        if let Some(label) = self.constants.get(&value) {
            return label.clone();
        }
        let label = format!("#{value}");
        self.var(&label, value);
        self.constants.insert(value, label.clone());
        label
    }

    /// `mem[b] -= mem[a]; if mem[b] <= 0 goto c`
    pub fn subleq(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        c: impl Into<Operand>,
    ) {
        self.code.push(a.into());
        self.code.push(b.into());
        self.code.push(c.into());
    }

    pub fn clear(&mut self, x: &str) {
        self.subleq(x, x, Operand::Next);
    }

    pub fn jmp(&mut self, target: &str) {
        self.subleq(Z, Z, target);
    }

    pub fn halt(&mut self) {
        self.subleq(Z, Z, SPECIAL);
    }

    /// `dst -= src`
    pub fn sub(&mut self, src: &str, dst: &str) {
        self.subleq(src, dst, Operand::Next);
    }

    /// `dst += src`
    pub fn add(&mut self, src: &str, dst: &str) {
        self.subleq(src, Z, Operand::Next);
        self.subleq(Z, dst, Operand::Next);
        self.subleq(Z, Z, Operand::Next);
    }

    /// `dst = src`
    pub fn mov(&mut self, src: &str, dst: &str) {
        self.clear(dst);
        self.add(src, dst);
    }

    /// Read one character into `dst`.
    pub fn getc(&mut self, dst: &str) {
        self.subleq(SPECIAL, dst, Operand::Next);
    }

    /// Write the character held in `src`.
    pub fn putc(&mut self, src: &str) {
        self.subleq(src, SPECIAL, Operand::Next);
    }

    /// Branch to `target` if `x <= 0`.
    pub fn ble(&mut self, x: &str, target: &str) {
        self.subleq(Z, x, target);
    }

    /// Branch to `target` if `x == 0`.
    pub fn beq(&mut self, x: &str, target: &str) {
        let non_positive = self.fresh("beq");
        let done = self.fresh("beq");
        self.subleq(Z, x, &non_positive);
        self.subleq(Z, Z, &done);
        self.label(&non_positive);
        self.clear(T);
        // T = -x <= 0 means x >= 0, and x <= 0 already holds.
        self.subleq(x, T, target);
        self.label(&done);
    }

    /// Branch to `target` if `x <= k`.
    pub fn ble_const(&mut self, x: &str, k: Cell, target: &str) {
        let k = self.constant(k);
        self.mov(x, U);
        self.sub(&k, U);
        self.ble(U, target);
    }

    /// Branch to `target` if `x == k`.
    pub fn beq_const(&mut self, x: &str, k: Cell, target: &str) {
        let k = self.constant(k);
        self.mov(x, U);
        self.sub(&k, U);
        self.beq(U, target);
    }

    /// Resolve every label and lay out code followed by data.
    pub fn finish(self) -> Result<Vec<Cell>> {
        if let Some(name) = self.duplicate {
            return Err(Error::Assemble(format!("label '{name}' defined twice")));
        }
        let code_len = self.code.len();
        let mut cells = Vec::with_capacity(code_len + self.data.len());
        for (i, operand) in self.code.iter().enumerate() {
            let value = match operand {
                Operand::Lit(value) => *value,
                Operand::Next => (i - i % 3 + 3) as Cell,
                Operand::Label(name) => match self.labels.get(name) {
                    Some(Place::Code(at)) => *at as Cell,
                    Some(Place::Data(at)) => (code_len + at) as Cell,
                    None => return Err(Error::Assemble(format!("undefined label '{name}'"))),
                },
            };
            cells.push(value);
        }
        cells.extend_from_slice(&self.data);
        Ok(cells)
    }
}

impl Default for Asm {
    fn default() -> Self {
        Self::new()
    }
}

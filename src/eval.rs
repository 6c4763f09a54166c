use tracing::debug;

use crate::error::Result;
use crate::io::{Console, Fallback};
use crate::machine::{Exit, Machine};

impl<C: Console> Machine<C> {
    /// Feed `text` to the running program and let it react.
    ///
    /// The bytes of `text` are staged as input, followed by a newline if the
    /// text does not already end with one. The machine then runs until it
    /// halts, or until it wants another character and the staged input is
    /// used up. In the second case the reading instruction is not executed
    /// and the console is not consulted, so the call returns instead of
    /// blocking; the program counter rests on that instruction.
    ///
    /// Output is delivered to the console as it is produced.
    pub fn eval(&mut self, text: &str) -> Result<Exit> {
        self.eval_bytes(line_bytes(text), None)
    }

    /// Like [`eval`](Self::eval), but stages exactly the bytes of `text`.
    pub fn eval_raw(&mut self, text: &str) -> Result<Exit> {
        self.eval_bytes(text.bytes(), None)
    }

    /// Like [`eval`](Self::eval), but gives up with
    /// [`Error::NoProgress`](crate::Error::NoProgress) after `budget`
    /// instructions.
    pub fn eval_for(&mut self, text: &str, budget: u64) -> Result<Exit> {
        self.eval_bytes(line_bytes(text), Some(budget))
    }

    /// Characters staged by `eval` that the program has not read yet.
    pub fn pending_input(&self) -> usize {
        self.bridge.pending()
    }

    fn eval_bytes(&mut self, bytes: impl Iterator<Item = u8>, budget: Option<u64>) -> Result<Exit> {
        if self.is_halted() {
            debug!("eval on a halted machine");
            return Ok(Exit::Halted);
        }
        self.bridge.stage(bytes);
        debug!(pending = self.bridge.pending(), pc = self.pc, "eval");
        self.execute(Fallback::Staged, budget)
    }
}

/// The bytes of `text`, ending in a newline.
fn line_bytes(text: &str) -> impl Iterator<Item = u8> + '_ {
    let newline = (!text.ends_with('\n')).then_some(b'\n');
    text.bytes().chain(newline)
}

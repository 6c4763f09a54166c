use tracing::debug;

use crate::error::{Error, Result};
use crate::io::{Bridge, Console, Fallback, IoStats};
use crate::memory::{Cell, DEFAULT_MEMORY_LIMIT, Memory, SPECIAL};

/// The SUBLEQ machine.
///
/// SUBLEQ ("subtract and branch if less than or equal to zero") has a
/// single instruction. Each instruction is three consecutive cells
/// `A B C` starting at the program counter, and executes (in C-like syntax):
///
///   mem[B] -= mem[A]; if (mem[B] <= 0) { goto C; } else { goto pc + 3; }
///
/// Two operand shapes are reserved for I/O: `A == -1` reads one character
/// into `mem[B]`, and `B == -1` writes `mem[A]` as a character. Both fall
/// through to `pc + 3`. A program halts by branching to `-1`.
///
/// Code and data share one memory, and operands are re-fetched on every
/// step, so self-modifying programs behave as written.
pub struct Machine<C> {
    pub(crate) memory: Memory,
    pub(crate) pc: Cell,
    pub(crate) bridge: Bridge<C>,
    steps: u64,
}

/// Configuration for a machine instance.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Largest memory extent, in cells. Writes at or beyond it fail.
    pub memory_limit: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

/// Why a run returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The program counter is `-1`.
    Halted,
    /// Staged input ran dry and the next instruction reads a character.
    /// The program counter rests on that instruction.
    AwaitingInput,
}

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(Exit),
}

impl<C: Console> Machine<C> {
    pub fn new(console: C) -> Self {
        Self::with_config(console, MachineConfig::default())
    }

    pub fn with_config(console: C, config: MachineConfig) -> Self {
        Self {
            memory: Memory::new(config.memory_limit),
            pc: 0,
            bridge: Bridge::new(console),
            steps: 0,
        }
    }

    pub fn pc(&self) -> Cell {
        self.pc
    }

    /// Move the program counter. `-1` halts the machine.
    pub fn set_pc(&mut self, pc: Cell) {
        self.pc = pc;
    }

    pub fn is_halted(&self) -> bool {
        self.pc == SPECIAL
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Total instructions executed by this machine.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn io_stats(&self) -> IoStats {
        self.bridge.stats()
    }

    pub fn console(&self) -> &C {
        self.bridge.console()
    }

    pub fn console_mut(&mut self) -> &mut C {
        self.bridge.console_mut()
    }

    pub fn into_console(self) -> C {
        self.bridge.into_console()
    }

    /// Write one character straight to the console.
    pub fn putch(&mut self, ch: Cell) {
        self.bridge.write(ch);
    }

    /// Execute exactly one instruction. Input falls through to the console
    /// once staged input is exhausted.
    ///
    /// Returns `Exit::Halted` if the machine is (or just became) halted.
    pub fn step(&mut self) -> Result<Option<Exit>> {
        if self.is_halted() {
            return Ok(Some(Exit::Halted));
        }
        match self.step_once(Fallback::Live)? {
            Flow::Continue if self.is_halted() => Ok(Some(Exit::Halted)),
            Flow::Continue => Ok(None),
            Flow::Stop(exit) => Ok(Some(exit)),
        }
    }

    /// Run until the program halts. Input falls through to the console once
    /// staged input is exhausted. There is no step limit: a program that
    /// never halts runs forever.
    ///
    /// Running a halted machine is a no-op.
    pub fn run(&mut self) -> Result<Exit> {
        self.execute(Fallback::Live, None)
    }

    /// Like [`run`](Self::run), but gives up with [`Error::NoProgress`]
    /// after `budget` instructions. The machine is left intact and may be
    /// resumed.
    pub fn run_for(&mut self, budget: u64) -> Result<Exit> {
        self.execute(Fallback::Live, Some(budget))
    }

    pub(crate) fn execute(&mut self, fallback: Fallback, budget: Option<u64>) -> Result<Exit> {
        let start_pc = self.pc;
        let start_steps = self.steps;
        let mut executed: u64 = 0;

        let exit = loop {
            if self.is_halted() {
                break Exit::Halted;
            }
            if budget.is_some_and(|b| executed >= b) {
                debug!(steps = executed, pc = self.pc, "step budget exhausted");
                return Err(Error::NoProgress { steps: executed });
            }
            if let Flow::Stop(exit) = self.step_once(fallback)? {
                break exit;
            }
            executed += 1;
        };

        debug!(
            ?exit,
            start_pc,
            pc = self.pc,
            steps = self.steps - start_steps,
            "run stopped"
        );
        Ok(exit)
    }

    /// Fetch, decode and execute the instruction at `pc`.
    ///
    /// On error nothing has been modified and `pc` still points at the
    /// failing instruction.
    fn step_once(&mut self, fallback: Fallback) -> Result<Flow> {
        let pc = self.pc;
        let a = self.memory.read(pc)?;
        let b = self.memory.read(pc.wrapping_add(1))?;
        let c = self.memory.read(pc.wrapping_add(2))?;

        let next = if a == SPECIAL {
            // Validate the destination before consuming a character.
            self.memory.check(b)?;
            let Some(ch) = self.bridge.read(fallback) else {
                return Ok(Flow::Stop(Exit::AwaitingInput));
            };
            self.memory.write(b, ch)?;
            pc.wrapping_add(3)
        } else if b == SPECIAL {
            let ch = self.memory.read(a)?;
            self.bridge.write(ch);
            pc.wrapping_add(3)
        } else {
            let value = self.memory.read(b)?.wrapping_sub(self.memory.read(a)?);
            self.memory.write(b, value)?;
            if value <= 0 { c } else { pc.wrapping_add(3) }
        };

        // A negative branch target other than -1 is reported by the next
        // fetch.
        self.pc = next;
        self.steps += 1;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{HELLO, HI};
    use crate::io::{Callbacks, EOF, Transcript};

    //  0: ch = getch
    //  3: tmp = 0
    //  6: tmp -= ch; ch >= 0 => goto 12
    //  9: halt (ch was EOF)
    // 12: putch ch
    // 15: goto 0
    const ECHO_TO_EOF: [Cell; 21] = [
        -1, 18, 3, //
        19, 19, 6, //
        18, 19, 12, //
        20, 20, -1, //
        18, -1, 0, //
        20, 20, 0, //
        0, 0, 0, // ch, tmp, zero
    ];

    /// Build a machine with `program` loaded at address 0.
    fn machine(program: &[Cell]) -> Machine<Transcript> {
        let mut m = Machine::new(Transcript::new());
        m.load(program).unwrap();
        m
    }

    #[test]
    fn test_subtract_no_branch() {
        // mem[4] -= mem[3] => 10 - 3 = 7. 7 > 0 => pc += 3.
        let mut m = machine(&[3, 4, 99, 3, 10]);
        assert_eq!(m.step().unwrap(), None);
        assert_eq!(m.memory().read(4).unwrap(), 7);
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn test_branch_on_zero() {
        // mem[4] -= mem[3] => 5 - 5 = 0. 0 <= 0 => goto 9.
        let mut m = machine(&[3, 4, 9, 5, 5]);
        m.step().unwrap();
        assert_eq!(m.memory().read(4).unwrap(), 0);
        assert_eq!(m.pc(), 9);
    }

    #[test]
    fn test_no_branch_on_one() {
        // 6 - 5 = 1 > 0 => fall through.
        let mut m = machine(&[3, 4, 9, 5, 6]);
        m.step().unwrap();
        assert_eq!(m.memory().read(4).unwrap(), 1);
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn test_branch_on_negative() {
        let mut m = machine(&[3, 4, 9, 5, 2]);
        m.step().unwrap();
        assert_eq!(m.memory().read(4).unwrap(), -3);
        assert_eq!(m.pc(), 9);
    }

    #[test]
    fn test_subtraction_wraps() {
        let mut m = machine(&[3, 4, 9, 1, Cell::MIN]);
        m.step().unwrap();
        assert_eq!(m.memory().read(4).unwrap(), Cell::MAX);
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn test_branch_target_fetched_before_subtraction() {
        // B == pc + 2, so the subtraction rewrites C: mem[2] = 6 - 6 = 0.
        // The branch goes to the C fetched before the write.
        let mut m = machine(&[3, 2, 6, 6]);
        m.step().unwrap();
        assert_eq!(m.memory().read(2).unwrap(), 0);
        assert_eq!(m.pc(), 6);
    }

    #[test]
    fn test_self_modifying() {
        // Instruction 0 rewrites instruction 1's A operand from 9 to 10
        // (mem[3] -= mem[12] = 9 - (-1)), so the output instruction emits
        // mem[10] instead of mem[9].
        let mut m = machine(&[12, 3, 3, 9, -1, 6, 11, 11, -1, 65, 66, 0, -1]);
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert_eq!(m.console().output(), &[66]);
    }

    #[test]
    fn test_input_writes_to_b() {
        let mut m = Machine::new(Transcript::with_input("A"));
        m.load(&[-1, 5, 3]).unwrap();
        m.step().unwrap();
        assert_eq!(m.memory().read(5).unwrap(), 65);
        assert_eq!(m.pc(), 3);
        assert_eq!(m.console().reads(), 1);
    }

    #[test]
    fn test_input_eof_is_minus_one() {
        let mut m = machine(&[-1, 5, 3]);
        m.step().unwrap();
        assert_eq!(m.memory().read(5).unwrap(), EOF);
    }

    #[test]
    fn test_output_does_not_mutate_memory() {
        let program = [3, -1, 6, 42, 0, 0];
        let mut m = machine(&program);
        m.step().unwrap();
        assert_eq!(m.console().output(), &[42]);
        assert_eq!(m.memory().as_slice(), &program[..]);
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn test_input_to_special_is_invalid() {
        let mut m = Machine::new(Transcript::with_input("A"));
        m.load(&[-1, -1, 3]).unwrap();
        assert!(matches!(
            m.step(),
            Err(Error::InvalidAddress { address: -1 })
        ));
        // Nothing consumed, nothing moved.
        assert_eq!(m.console().reads(), 0);
        assert_eq!(m.pc(), 0);
    }

    #[test]
    fn test_negative_operand_is_invalid() {
        let mut m = machine(&[-5, 4, 3, 0, 1]);
        assert!(matches!(
            m.run(),
            Err(Error::InvalidAddress { address: -5 })
        ));
        assert_eq!(m.pc(), 0);
        assert_eq!(m.memory().read(4).unwrap(), 1);
    }

    #[test]
    fn test_negative_branch_target_is_invalid() {
        let mut m = machine(&[3, 3, -7, 1]);
        assert!(matches!(
            m.run(),
            Err(Error::InvalidAddress { address: -7 })
        ));
        assert_eq!(m.pc(), -7);
    }

    #[test]
    fn test_halt_stops_before_fetch() {
        let mut m = machine(&[3, 3, -1, 1]);
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert!(m.is_halted());
        assert_eq!(m.steps(), 1);
    }

    #[test]
    fn test_run_halted_is_noop() {
        let mut m = machine(&[3, 3, -1, 1]);
        m.run().unwrap();
        let snapshot = m.memory().as_slice().to_vec();
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert_eq!(m.step().unwrap(), Some(Exit::Halted));
        assert_eq!(m.steps(), 1);
        assert_eq!(m.memory().as_slice(), &snapshot[..]);
    }

    #[test]
    fn test_preset_halt() {
        let mut m = machine(&[0, -1, 3]);
        m.set_pc(-1);
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert!(m.console().output().is_empty());
    }

    #[test]
    fn test_run_for_budget() {
        // Infinite loop: mem[0] -= mem[0] => 0, goto 0.
        let mut m = machine(&[0, 0, 0]);
        assert!(matches!(
            m.run_for(50),
            Err(Error::NoProgress { steps: 50 })
        ));
        assert_eq!(m.steps(), 50);
        // Resumable.
        assert!(matches!(m.run_for(5), Err(Error::NoProgress { steps: 5 })));
        assert_eq!(m.steps(), 55);
    }

    #[test]
    fn test_run_for_halts_within_budget() {
        let mut m = machine(&[3, 3, -1, 1]);
        assert_eq!(m.run_for(10).unwrap(), Exit::Halted);
    }

    #[test]
    fn test_memory_limit_during_run() {
        let config = MachineConfig { memory_limit: 8 };
        let mut m = Machine::with_config(Transcript::new(), config);
        // mem[100] -= mem[3] => 0 - 1 = -1 at an address past the limit.
        m.load(&[3, 100, -1, 1]).unwrap();
        assert!(matches!(
            m.run(),
            Err(Error::MemoryLimit {
                address: 100,
                limit: 8
            })
        ));
        assert_eq!(m.pc(), 0);
    }

    #[test]
    fn test_putch_goes_to_sink() {
        let mut m = machine(&[]);
        m.putch(10);
        assert_eq!(m.console().output(), &[10]);
        assert_eq!(m.io_stats().writes, 1);
    }

    #[test]
    fn test_hi_program() {
        let mut m = Machine::new(Transcript::new());
        m.load_from_text(HI, true).unwrap();
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert_eq!(m.console().output(), &[72, 105]);
        assert_eq!(m.console().output_string(), "Hi");
    }

    #[test]
    fn test_hello_world_program() {
        let mut m = Machine::new(Transcript::new());
        m.load_from_text(HELLO, true).unwrap();
        assert_eq!(m.run().unwrap(), Exit::Halted);
        assert_eq!(m.console().output_string(), "Hello, World!\n");
    }

    #[test]
    fn test_echo_until_eof_with_callbacks() {
        let input = b"hey".to_vec();
        let mut cursor = 0;
        let mut output = Vec::new();
        {
            let console = Callbacks::new(
                || {
                    let ch = input.get(cursor).map_or(EOF, |&b| Cell::from(b));
                    cursor += 1;
                    ch
                },
                |ch| output.push(ch as u8),
            );
            let mut m = Machine::new(console);
            m.load(&ECHO_TO_EOF).unwrap();
            assert_eq!(m.run().unwrap(), Exit::Halted);
        }
        assert_eq!(output, b"hey");
        assert_eq!(cursor, 4);
    }

    #[test]
    fn test_machines_are_isolated() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(7);
        let mut a = Machine::new(Transcript::with_input("first machine"));
        let mut b = Machine::new(Transcript::with_input("second"));
        a.load(&ECHO_TO_EOF).unwrap();
        b.load(&ECHO_TO_EOF).unwrap();

        while !(a.is_halted() && b.is_halted()) {
            if rng.gen_bool(0.5) {
                a.step().unwrap();
            } else {
                b.step().unwrap();
            }
        }
        assert_eq!(a.console().output_string(), "first machine");
        assert_eq!(b.console().output_string(), "second");
    }
}

use std::collections::VecDeque;
use std::io::{BufWriter, Read, Stdin, Stdout, Write};

use tracing::{trace, warn};

use crate::memory::Cell;

/// Character code a source returns when no further input is available.
pub const EOF: Cell = -1;

/// The character source and sink a machine talks to.
///
/// A machine owns exactly one console, supplied at construction. `getch`
/// may block for as long as it likes; `putch` delivers one character
/// synchronously.
pub trait Console {
    /// Next character code, or [`EOF`].
    fn getch(&mut self) -> Cell;

    /// Deliver one character code.
    fn putch(&mut self, ch: Cell);
}

impl<C: Console + ?Sized> Console for &mut C {
    fn getch(&mut self) -> Cell {
        (**self).getch()
    }

    fn putch(&mut self, ch: Cell) {
        (**self).putch(ch)
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn getch(&mut self) -> Cell {
        (**self).getch()
    }

    fn putch(&mut self, ch: Cell) {
        (**self).putch(ch)
    }
}

/// A console built from a source closure and a sink closure.
pub struct Callbacks<G, P> {
    getch: G,
    putch: P,
}

impl<G, P> Callbacks<G, P>
where
    G: FnMut() -> Cell,
    P: FnMut(Cell),
{
    pub fn new(getch: G, putch: P) -> Self {
        Self { getch, putch }
    }
}

impl<G, P> Console for Callbacks<G, P>
where
    G: FnMut() -> Cell,
    P: FnMut(Cell),
{
    fn getch(&mut self) -> Cell {
        (self.getch)()
    }

    fn putch(&mut self, ch: Cell) {
        (self.putch)(ch)
    }
}

/// Byte-wise console over the process's stdin and stdout.
///
/// Output is buffered and flushed at every newline and before every read,
/// so prompts are visible while the machine blocks on input. Codes outside
/// `0..=255` are written as their low byte.
pub struct Stdio {
    stdin: Stdin,
    stdout: BufWriter<Stdout>,
}

impl Stdio {
    pub fn new() -> Self {
        Self {
            stdin: std::io::stdin(),
            stdout: BufWriter::new(std::io::stdout()),
        }
    }

    pub fn flush(&mut self) {
        if let Err(err) = self.stdout.flush() {
            warn!(%err, "failed to flush stdout");
        }
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for Stdio {
    fn getch(&mut self) -> Cell {
        self.flush();
        let mut byte = [0u8; 1];
        match self.stdin.lock().read(&mut byte) {
            Ok(1) => Cell::from(byte[0]),
            Ok(_) => EOF,
            Err(err) => {
                warn!(%err, "failed to read stdin, treating as end of input");
                EOF
            }
        }
    }

    fn putch(&mut self, ch: Cell) {
        let byte = ch as u8;
        if let Err(err) = self.stdout.write_all(&[byte]) {
            warn!(%err, ch, "failed to write stdout");
            return;
        }
        if byte == b'\n' {
            self.flush();
        }
    }
}

impl Drop for Stdio {
    fn drop(&mut self) {
        self.flush();
    }
}

/// A scripted console: input comes from a fixed script and output is
/// recorded. Returns [`EOF`] once the script is used up.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    input: VecDeque<Cell>,
    output: Vec<Cell>,
    reads: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript whose input script is the bytes of `script`.
    pub fn with_input(script: &str) -> Self {
        let mut transcript = Self::new();
        transcript.push_input(script);
        transcript
    }

    pub fn push_input(&mut self, script: &str) {
        self.input.extend(script.bytes().map(Cell::from));
    }

    /// Every code written so far.
    pub fn output(&self) -> &[Cell] {
        &self.output
    }

    /// The recorded output as text. Codes outside `0..=255` are written as
    /// their low byte and invalid UTF-8 is replaced.
    pub fn output_string(&self) -> String {
        let bytes: Vec<u8> = self.output.iter().map(|&ch| ch as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Take the recorded output, leaving the record empty.
    pub fn take_output(&mut self) -> Vec<Cell> {
        std::mem::take(&mut self.output)
    }

    /// Number of times `getch` was called, including reads that hit EOF.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl Console for Transcript {
    fn getch(&mut self) -> Cell {
        self.reads += 1;
        self.input.pop_front().unwrap_or(EOF)
    }

    fn putch(&mut self, ch: Cell) {
        self.output.push(ch);
    }
}

/// Where an INPUT instruction takes its character from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fallback {
    /// Staged input first, then the console.
    Live,
    /// Staged input only; report a stall when it runs dry.
    Staged,
}

/// Diagnostic counters kept by the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Characters taken from staged input.
    pub staged_reads: u64,
    /// Characters taken from the console.
    pub live_reads: u64,
    /// Characters delivered to the console.
    pub writes: u64,
}

/// Sits between the executor and the console. Staged characters are
/// served in FIFO order before the console is consulted.
pub(crate) struct Bridge<C> {
    console: C,
    staged: VecDeque<Cell>,
    stats: IoStats,
}

impl<C: Console> Bridge<C> {
    pub(crate) fn new(console: C) -> Self {
        Self {
            console,
            staged: VecDeque::new(),
            stats: IoStats::default(),
        }
    }

    pub(crate) fn stage(&mut self, bytes: impl IntoIterator<Item = u8>) {
        self.staged.extend(bytes.into_iter().map(Cell::from));
    }

    pub(crate) fn pending(&self) -> usize {
        self.staged.len()
    }

    pub(crate) fn discard_staged(&mut self) {
        self.staged.clear();
    }

    /// Next input character, or `None` if only staged input is allowed and
    /// none is left.
    pub(crate) fn read(&mut self, fallback: Fallback) -> Option<Cell> {
        if let Some(ch) = self.staged.pop_front() {
            self.stats.staged_reads += 1;
            trace!(ch, "staged input");
            return Some(ch);
        }
        match fallback {
            Fallback::Staged => None,
            Fallback::Live => {
                let ch = self.console.getch();
                self.stats.live_reads += 1;
                trace!(ch, "live input");
                Some(ch)
            }
        }
    }

    pub(crate) fn write(&mut self, ch: Cell) {
        self.stats.writes += 1;
        trace!(ch, "output");
        self.console.putch(ch);
    }

    pub(crate) fn stats(&self) -> IoStats {
        self.stats
    }

    pub(crate) fn console(&self) -> &C {
        &self.console
    }

    pub(crate) fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub(crate) fn into_console(self) -> C {
        self.console
    }
}

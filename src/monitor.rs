//! The bundled bootstrap image: a small Forth-flavored line monitor.
//!
//! Input is a stream of blank-separated words. Blanks are any code up to and
//! including space. Words, case-insensitive:
//!
//! - `.( text)` prints `text`. The blank after `.(` is the delimiter and is
//!   not printed.
//! - `cr` prints a newline.
//! - `bye` halts.
//!
//! Anything else is skipped up to the next blank. End of input halts.
//! A word takes effect when the blank that ends it is read.

use crate::asm::Asm;
use crate::error::Result;
use crate::io::EOF;
use crate::memory::Cell;

const BLANK: Cell = b' ' as Cell;
const NEWLINE: Cell = b'\n' as Cell;

/// Character register.
const CH: &str = "ch";

pub(crate) fn assemble() -> Result<Vec<Cell>> {
    let mut asm = Asm::new();
    asm.var(CH, 0);
    let newline = asm.constant(NEWLINE);

    // Between words.
    asm.label("skip");
    read(&mut asm);
    asm.ble_const(CH, BLANK, "skip");
    asm.beq_const(CH, b'.' as Cell, "dot");
    dispatch(&mut asm, b"cC", "cr");
    dispatch(&mut asm, b"bB", "b");
    asm.jmp("rest");

    // .(
    asm.label("dot");
    letter(&mut asm, b"(", "dot(");
    asm.label("dot(");
    delimiter(&mut asm, "echo");

    asm.label("echo");
    read(&mut asm);
    asm.beq_const(CH, b')' as Cell, "skip");
    asm.putc(CH);
    asm.jmp("echo");

    // cr
    asm.label("cr");
    letter(&mut asm, b"rR", "cr.");
    asm.label("cr.");
    delimiter(&mut asm, "newline");
    asm.label("newline");
    asm.putc(&newline);
    asm.jmp("skip");

    // bye
    asm.label("b");
    letter(&mut asm, b"yY", "by");
    asm.label("by");
    letter(&mut asm, b"eE", "bye");
    asm.label("bye");
    delimiter(&mut asm, "halt");

    // The rest of a word nobody knows.
    asm.label("rest");
    read(&mut asm);
    asm.ble_const(CH, BLANK, "skip");
    asm.jmp("rest");

    asm.label("halt");
    asm.halt();

    asm.finish()
}

/// Read the next character into `ch`, halting at end of input.
fn read(asm: &mut Asm) {
    asm.getc(CH);
    asm.beq_const(CH, EOF, "halt");
}

fn dispatch(asm: &mut Asm, letters: &[u8], target: &str) {
    for &letter in letters {
        asm.beq_const(CH, Cell::from(letter), target);
    }
}

/// Read the next letter of a word and continue at `next` if it is one of
/// `letters`. A blank ends the word early, and the word is ignored.
fn letter(asm: &mut Asm, letters: &[u8], next: &str) {
    read(asm);
    asm.ble_const(CH, BLANK, "skip");
    dispatch(asm, letters, next);
    asm.jmp("rest");
}

/// Read the blank that ends a word, then continue at `then`. Anything else
/// means the word is longer than expected and is ignored.
fn delimiter(asm: &mut Asm, then: &str) {
    read(asm);
    asm.ble_const(CH, BLANK, then);
    asm.jmp("rest");
}

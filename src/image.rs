use std::io::Read;
use std::ops::Deref;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::loader::parse_program;
use crate::memory::Cell;

/// Prints "Hi" and halts.
pub const HI: &str = "9 -1 3 10 -1 6 0 0 -1 72 105 0";

/// Prints "Hello, World!" and a newline, then halts. The output loop
/// rewrites the A operand of its own output instruction.
pub const HELLO: &str = "12 12 3 36 37 6 37 12 9 37 37 12 0 -1 15 38 36 18
12 12 21 53 37 24 37 12 27 37 37 30 36 12 -1 37 37 0 39 0 -1 72 101 108
108 111 44 32 87 111 114 108 100 33 10 53";

/// A complete program ready to be installed with
/// [`Machine::load`](crate::Machine::load).
///
/// Images are opaque: nothing here looks at what the cells mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    cells: Vec<Cell>,
}

impl Image {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Parse an image in program text format.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self::new(parse_program(text)?))
    }

    /// Decompress brotli-compressed program text and parse it.
    pub fn from_brotli(bytes: &[u8]) -> Result<Self> {
        let text = decompress(bytes).map_err(|source| Error::Io {
            path: "<brotli>".into(),
            source,
        })?;
        Self::from_text(&text)
    }

    /// Read an image from disk. Files ending in `.br` are brotli-compressed
    /// program text; anything else is plain program text.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(path).map_err(io_err)?;
        let text = if path.extension().is_some_and(|ext| ext == "br") {
            decompress(&bytes).map_err(io_err)?
        } else {
            String::from_utf8(bytes).map_err(|e| {
                io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?
        };
        let image = Self::from_text(&text)?;
        debug!(path = %path.display(), cells = image.len(), "image read");
        Ok(image)
    }

    /// The bundled image: a small Forth-flavored line monitor.
    ///
    /// It understands `.( text)`, which prints `text`; `cr`, which prints a
    /// newline; and `bye`, which halts. Other words are skipped, and end of
    /// input halts. Between lines it waits for input without halting.
    pub fn monitor() -> Self {
        Self::new(crate::monitor::assemble().expect("the monitor image assembles"))
    }

    /// Render the image in program text format, sixteen cells per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in self.cells.chunks(16) {
            let line: Vec<String> = row.iter().map(Cell::to_string).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }
}

impl Deref for Image {
    type Target = [Cell];

    fn deref(&self) -> &[Cell] {
        &self.cells
    }
}

impl From<Vec<Cell>> for Image {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

/// Brotli-compress image text for shipping.
pub fn compress(text: &str) -> std::io::Result<Vec<u8>> {
    let mut compressed = Vec::new();
    let params = brotli::enc::BrotliEncoderParams {
        quality: 11,
        ..Default::default()
    };
    brotli::BrotliCompress(&mut text.as_bytes(), &mut compressed, &params)?;
    Ok(compressed)
}

fn decompress(bytes: &[u8]) -> std::io::Result<String> {
    let mut text = String::new();
    brotli::Decompressor::new(bytes, 4096).read_to_string(&mut text)?;
    Ok(text)
}

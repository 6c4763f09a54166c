pub mod asm;
pub mod error;
pub mod eval;
pub mod image;
pub mod io;
pub mod loader;
pub mod machine;
pub mod memory;
mod monitor;

pub use error::{Error, Result};
pub use image::Image;
pub use io::{Callbacks, Console, EOF, Stdio, Transcript};
pub use machine::{Exit, Machine, MachineConfig};
pub use memory::{Cell, Memory};

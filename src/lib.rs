//! An embeddable preprocessor for shader-like and C-family source
//! text, covering a practical subset of the classical C preprocessor:
//! object- and function-like macros, fully nested conditional
//! compilation, file inclusion through a host callback,
//! stringification, token concatenation, line continuation and
//! commentary handling.
//!
//! The engine is a pure transform over injected streams: the host
//! supplies a root [`InputStream`], optionally an include resolver
//! and an error sink, and [`Preprocessor::process`] returns the
//! expanded text. There is no global state and no I/O inside the
//! engine.
//!
//! ```
//! use shpp::{Lexer, Options, Preprocessor, StringInputStream};
//!
//! let lexer = Lexer::new(Box::new(StringInputStream::new("#define VALUE 42\nreturn VALUE;")));
//! let mut pp = Preprocessor::new(lexer, Options::default());
//! assert_eq!(pp.process(), "return 42;");
//! ```
#[macro_use]
extern crate log;

pub mod token;
pub mod stream;
pub mod lexer;
pub mod preproc;

pub use crate::lexer::Lexer;
pub use crate::preproc::{ErrorCallback, ErrorInfo, ErrorKind, IncludeCallback};
pub use crate::preproc::{DirectiveHandler, MacroDesc, Options, Preprocessor};
pub use crate::stream::{InputStream, StringInputStream};
pub use crate::token::{Token, TokenKind};

/// One-shot convenience: preprocess an in-memory string
pub fn process_str(source: &str, options: Options) -> String
{
	let lexer = Lexer::new(Box::new(StringInputStream::new(source)));
	Preprocessor::new(lexer, options).process()
}

// vim: ft=rust

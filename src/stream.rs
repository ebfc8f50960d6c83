//! Input stream capability
//!
//! The lexer never performs I/O itself; the host installs objects
//! satisfying [`InputStream`] and the lexer pulls physical lines from
//! whichever stream is on top of its stack.

/// A producer of physical source lines
pub trait InputStream
{
	/// Returns the next physical line including its trailing newline
	/// (if any), or an empty string once the stream is exhausted
	fn read_line(&mut self) -> String;
	/// True while at least one more line can be read
	fn has_next_line(&self) -> bool;
}

/// The simplest implementation of the input stream - an in-memory
/// string consumed line by line
pub struct StringInputStream
{
	source: String,
}

impl StringInputStream
{
	pub fn new(source: impl Into<String>) -> StringInputStream
	{
		StringInputStream {
			source: source.into(),
			}
	}
}

impl InputStream for StringInputStream
{
	fn read_line(&mut self) -> String
	{
		match self.source.find('\n')
		{
		Some(pos) => {
			let rest = self.source.split_off(pos + 1);
			::std::mem::replace(&mut self.source, rest)
			},
		None => ::std::mem::take(&mut self.source),
		}
	}

	fn has_next_line(&self) -> bool
	{
		!self.source.is_empty()
	}
}

#[cfg(test)]
mod tests
{
	use super::{InputStream, StringInputStream};

	#[test]
	fn empty_string_has_no_lines()
	{
		let s = StringInputStream::new("");
		assert!( !s.has_next_line() );
	}

	#[test]
	fn lines_are_returned_with_their_terminators()
	{
		let lines = ["line1\n", "line2\r\n", "line3"];
		let mut s = StringInputStream::new(lines.concat());
		for expected in lines
		{
			assert!( s.has_next_line() );
			assert_eq!(s.read_line(), expected);
		}
		assert!( !s.has_next_line() );
	}

	#[test]
	fn unterminated_text_is_a_single_line()
	{
		let mut s = StringInputStream::new("line without newline");
		assert_eq!(s.read_line(), "line without newline");
		assert!( !s.has_next_line() );
	}

	#[test]
	fn exhausted_stream_returns_empty()
	{
		let mut s = StringInputStream::new("a\n");
		assert_eq!(s.read_line(), "a\n");
		assert_eq!(s.read_line(), "");
	}
}

// vim: ft=rust

//! Token scanner with a stacked-stream input model
//!
//! The lexer pulls physical lines from the top entry of its stream
//! stack, splices backslash-continued lines, extracts commentary and
//! hands out [`Token`]s on demand. Pushing a stream (used to realise
//! `#include`) suspends the current scanning state until the new
//! stream is exhausted.
use std::collections::VecDeque;

use crate::stream::InputStream;
use crate::token::{self, Token, TokenKind};


/// One entry of the input stack. Pushing a stream shelves the
/// scanning state of whatever it covered; popping restores it.
struct StreamFrame
{
	stream: Box<dyn InputStream>,
	saved_line: String,
	saved_cursor: usize,
	saved_line_index: usize,
}

pub struct Lexer
{
	/// Stack of active input streams; the last entry is the live source
	streams: Vec<StreamFrame>,
	/// Lookahead/pushback queue, served before fresh scanning
	queue: VecDeque<Token>,
	/// Working buffer holding the current logical line
	line: String,
	/// Consumption cursor into `line` (byte offset)
	cursor: usize,
	/// 1-based index of the most recently read physical line
	line_index: usize,
	/// Names registered through `add_custom_directive`
	custom_directives: Vec<String>,
}

impl Lexer
{
	pub fn new(stream: Box<dyn InputStream>) -> Lexer
	{
		let mut rv = Lexer {
			streams: Vec::new(),
			queue: VecDeque::new(),
			line: String::new(),
			cursor: 0,
			line_index: 0,
			custom_directives: Vec::new(),
			};
		rv.push_stream(stream);
		rv
	}

	/// Registers a caller-defined directive name. Returns `false` if
	/// the name was already registered.
	pub fn add_custom_directive(&mut self, directive: &str) -> bool
	{
		if self.custom_directives.iter().any(|d| d == directive) {
			return false;
		}
		self.custom_directives.push(directive.to_owned());
		true
	}

	/// Returns the next token, or an `End` token once every stream on
	/// the stack is exhausted.
	pub fn next_token(&mut self) -> Token
	{
		if let Some(tok) = self.queue.pop_front()
		{
			trace!("next_token = {:?} (queued)", tok);
			return tok;
		}
		let tok = self.scan_token();
		trace!("next_token = {:?}", tok);
		tok
	}

	/// Returns a lookahead token without consuming it; `offset = 0`
	/// peeks the immediately next token. Peeked tokens are buffered,
	/// so a later `next_token` yields them in order.
	pub fn peek_token(&mut self, offset: usize) -> Token
	{
		while self.queue.len() <= offset
		{
			let tok = self.scan_token();
			let at_end = tok.kind == TokenKind::End;
			self.queue.push_back(tok);
			if at_end {
				break;
			}
		}
		match self.queue.get(offset)
		{
		Some(tok) => tok.clone(),
		None => Token::end(),
		}
	}

	/// Inserts tokens at the head of the lookahead queue, preserving
	/// their order. Used by the preprocessor to feed macro
	/// replacements back through the pipeline.
	pub fn push_tokens_front(&mut self, tokens: Vec<Token>)
	{
		for tok in tokens.into_iter().rev()
		{
			self.queue.push_front(tok);
		}
	}

	/// Pushes a new input stream, taking ownership. Subsequent tokens
	/// come from this stream until it runs dry.
	pub fn push_stream(&mut self, stream: Box<dyn InputStream>)
	{
		self.streams.push(StreamFrame {
			stream,
			saved_line: ::std::mem::take(&mut self.line),
			saved_cursor: ::std::mem::replace(&mut self.cursor, 0),
			saved_line_index: ::std::mem::replace(&mut self.line_index, 0),
			});
	}

	/// Pops the top stream and resumes scanning whatever it covered
	pub fn pop_stream(&mut self)
	{
		if let Some(frame) = self.streams.pop()
		{
			self.line = frame.saved_line;
			self.cursor = frame.saved_cursor;
			self.line_index = frame.saved_line_index;
		}
	}

	/// True while any stream, buffered line content, or queued
	/// lookahead remains
	pub fn has_next_token(&self) -> bool
	{
		!self.queue.is_empty()
			|| self.cursor < self.line.len()
			|| self.streams.iter().any(|f| f.stream.has_next_line() || f.saved_cursor < f.saved_line.len())
	}

	/// 1-based physical line of the most recently produced token
	pub fn current_line(&self) -> usize
	{
		self.line_index
	}

	/// Byte column within the current logical line
	pub fn current_column(&self) -> usize
	{
		self.cursor
	}

	// ---
	// Scanning
	// ---

	fn scan_token(&mut self) -> Token
	{
		loop
		{
			if self.cursor >= self.line.len()
			{
				match self.request_source_line()
				{
				Some(line) => {
					self.line = line;
					self.cursor = 0;
					},
				None => {
					// Active stream exhausted - pop it and resume the
					// stream below, or report the end of input
					self.pop_stream();
					if self.streams.is_empty() {
						return Token::new(TokenKind::End, "", self.line_index, self.cursor);
					}
					},
				}
				continue;
			}
			if let Some(tok) = self.scan_from_line() {
				return tok;
			}
		}
	}

	/// Requests one logical line from the active stream: the next
	/// physical line with backslash-newline continuations greedily
	/// spliced in. `None` when the active stream has nothing left.
	fn request_source_line(&mut self) -> Option<String>
	{
		if !self.streams.last()?.stream.has_next_line() {
			return None;
		}
		let mut line = match self.streams.last_mut()
			{
			Some(f) => f.stream.read_line(),
			None => return None,
			};
		self.line_index += 1;
		while let Some(pos) = continuation_point(&line)
		{
			line.truncate(pos);
			match self.streams.last_mut()
			{
			Some(f) if f.stream.has_next_line() => {
				let next = f.stream.read_line();
				line.push_str(&next);
				self.line_index += 1;
				},
			_ => break,
			}
		}
		trace!("line {}: {:?}", self.line_index, line);
		Some(line)
	}

	fn peek_ch(&self) -> Option<char>
	{
		self.line[self.cursor..].chars().next()
	}

	fn peek_ch_at(&self, offset: usize) -> Option<char>
	{
		self.line[self.cursor..].chars().nth(offset)
	}

	fn scan_from_line(&mut self) -> Option<Token>
	{
		let ch = self.peek_ch()?;
		let line_index = self.line_index;
		let col = self.cursor;
		let tok = match ch
			{
			'/' if matches!(self.peek_ch_at(1), Some('/') | Some('*')) => self.scan_comment(),
			'\n' => {
				self.cursor += 1;
				Token::new(TokenKind::Newline, "\n", line_index, col)
				},
			'\r' if self.peek_ch_at(1) == Some('\n') => {
				self.cursor += 2;
				Token::new(TokenKind::Newline, "\r\n", line_index, col)
				},
			c if c.is_whitespace() => {
				self.cursor += c.len_utf8();
				Token::new(TokenKind::Space, c.to_string(), line_index, col)
				},
			'#' => self.scan_hash(),
			c if c.is_ascii_digit() => self.scan_number(),
			c if c == '_' || c.is_ascii_alphabetic() => self.scan_identifier(),
			c if is_separator(c) => self.scan_separator(c),
			_ => self.scan_blob(),
			};
		Some(tok)
	}

	/// `//` runs to the end of the line; `/* ... */` spans any number
	/// of physical lines and nests. An unterminated block comment at
	/// true EOF is tolerated and closed silently.
	fn scan_comment(&mut self) -> Token
	{
		let line_index = self.line_index;
		let col = self.cursor;
		if self.peek_ch_at(1) == Some('/')
		{
			let rest = &self.line[self.cursor..];
			let end = match rest.find('\n')
				{
				Some(p) if p > 0 && rest.as_bytes()[p - 1] == b'\r' => p - 1,
				Some(p) => p,
				None => rest.len(),
				};
			let text = rest[..end].to_owned();
			self.cursor += end;
			return Token::new(TokenKind::Commentary, text, line_index, col);
		}

		let mut text = String::from("/*");
		self.cursor += 2;
		let mut depth = 1;
		loop
		{
			match self.peek_ch()
			{
			None =>
				// The comment continues on the next physical line
				match self.request_source_line()
				{
				Some(line) => {
					self.line = line;
					self.cursor = 0;
					},
				None => break,
				},
			Some('/') if self.peek_ch_at(1) == Some('*') => {
				text.push_str("/*");
				self.cursor += 2;
				depth += 1;
				},
			Some('*') if self.peek_ch_at(1) == Some('/') => {
				text.push_str("*/");
				self.cursor += 2;
				depth -= 1;
				if depth == 0 {
					break;
				}
				},
			Some(c) => {
				text.push(c);
				self.cursor += c.len_utf8();
				},
			}
		}
		Token::new(TokenKind::Commentary, text, line_index, col)
	}

	/// A `#` introduces a directive, the `##`/`#` macro operators, or
	/// (followed by whitespace or nothing) a plain blob
	fn scan_hash(&mut self) -> Token
	{
		let line_index = self.line_index;
		let col = self.cursor;
		self.cursor += 1;
		// Directive names may be separated from the hash by whitespace;
		// the skip is only committed when a name actually matches
		let mut lookahead = self.cursor;
		while matches!(self.line[lookahead..].chars().next(), Some(' ') | Some('\t')) {
			lookahead += 1;
		}
		let matched = token::DIRECTIVES_TABLE.iter()
			.find(|(name, _)| self.line[lookahead..].starts_with(name))
			.map(|&(name, kind)| (name.len(), Token::new(kind, "", line_index, col)))
			.or_else(|| self.custom_directives.iter()
				.find(|name| self.line[lookahead..].starts_with(&name[..]))
				.map(|name| (name.len(), Token::new(TokenKind::CustomDirective, name.clone(), line_index, col)))
				);
		if let Some((len, tok)) = matched
		{
			self.cursor = lookahead + len;
			return tok;
		}
		// Not a directive: decide from the character immediately after
		// the hash, leaving any whitespace in the stream
		match self.peek_ch()
		{
		Some('#') => {
			self.cursor += 1;
			Token::new(TokenKind::Concat, "##", line_index, col)
			},
		Some(c) if !c.is_whitespace() => Token::new(TokenKind::Stringize, "#", line_index, col),
		_ => Token::new(TokenKind::Blob, "#", line_index, col),
		}
	}

	/// Recognises a `0x` prefix and a single leading `0`; fractional
	/// parts are not fused, so `1.5` scans as number/blob/number
	fn scan_number(&mut self) -> Token
	{
		let line_index = self.line_index;
		let col = self.cursor;
		let mut number = String::new();
		if self.peek_ch() == Some('0')
		{
			number.push('0');
			self.cursor += 1;
			match self.peek_ch()
			{
			Some(c) if c == 'x' || c.is_ascii_digit() => {
				number.push(c);
				self.cursor += 1;
				},
			_ => return Token::new(TokenKind::Number, number, line_index, col),
			}
		}
		while let Some(c) = self.peek_ch()
		{
			if !c.is_ascii_digit() {
				break;
			}
			number.push(c);
			self.cursor += 1;
		}
		Token::new(TokenKind::Number, number, line_index, col)
	}

	fn scan_identifier(&mut self) -> Token
	{
		let line_index = self.line_index;
		let col = self.cursor;
		let mut ident = String::new();
		while let Some(c) = self.peek_ch()
		{
			if !(c.is_ascii_alphanumeric() || c == '_') {
				break;
			}
			ident.push(c);
			self.cursor += 1;
		}
		let kind = if token::is_keyword(&ident) { TokenKind::Keyword } else { TokenKind::Identifier };
		Token::new(kind, ident, line_index, col)
	}

	fn scan_separator(&mut self, ch: char) -> Token
	{
		static TWO_CHAR: [(&str, TokenKind); 8] = [
			("<<", TokenKind::Lshift),
			("<=", TokenKind::Le),
			(">>", TokenKind::Rshift),
			(">=", TokenKind::Ge),
			("&&", TokenKind::And),
			("||", TokenKind::Or),
			("==", TokenKind::Eq),
			("!=", TokenKind::Ne),
			];
		let line_index = self.line_index;
		let col = self.cursor;
		for &(sym, kind) in &TWO_CHAR
		{
			if self.line[self.cursor..].starts_with(sym)
			{
				self.cursor += 2;
				return Token::new(kind, sym, line_index, col);
			}
		}
		self.cursor += ch.len_utf8();
		let kind = match ch
			{
			',' => TokenKind::Comma,
			'(' => TokenKind::OpenBracket,
			')' => TokenKind::CloseBracket,
			'[' => TokenKind::OpenSquareBracket,
			']' => TokenKind::CloseSquareBracket,
			'<' => TokenKind::Less,
			'>' => TokenKind::Greater,
			'"' => TokenKind::Quotes,
			';' => TokenKind::Semicolon,
			'+' => TokenKind::Plus,
			'-' => TokenKind::Minus,
			'*' => TokenKind::Star,
			'/' => TokenKind::Slash,
			'&' => TokenKind::Ampersand,
			'|' => TokenKind::Vline,
			'!' => TokenKind::Not,
			// A bare `=` is not an operator the preprocessor knows
			_ => TokenKind::Blob,
			};
		Token::new(kind, ch.to_string(), line_index, col)
	}

	/// Anything unrecognised accumulates until the next structural
	/// boundary
	fn scan_blob(&mut self) -> Token
	{
		let line_index = self.line_index;
		let col = self.cursor;
		let start = self.cursor;
		while let Some(c) = self.peek_ch()
		{
			if !is_blob_char(c) {
				break;
			}
			self.cursor += c.len_utf8();
		}
		Token::new(TokenKind::Blob, self.line[start..self.cursor].to_owned(), line_index, col)
	}
}

fn is_separator(ch: char) -> bool
{
	",()[]<>\";+-*/&|!=".contains(ch)
}

fn is_blob_char(ch: char) -> bool
{
	!(ch.is_whitespace() || ch == '#' || ch == '_' || ch.is_ascii_alphanumeric() || is_separator(ch))
}

/// Returns the byte offset of a trailing line-continuation backslash,
/// or `None` when the line does not continue. A backslash inside an
/// unterminated string literal is an escape, not a continuation.
fn continuation_point(line: &str) -> Option<usize>
{
	let trimmed = line.trim_end();
	if !trimmed.ends_with('\\') {
		return None;
	}
	let pos = trimmed.len() - 1;
	let mut in_string = false;
	let mut escaped = false;
	for (i, ch) in line.char_indices()
	{
		if i == pos {
			break;
		}
		if escaped {
			escaped = false;
			continue;
		}
		match ch
		{
		'\\' => escaped = true,
		'"' => in_string = !in_string,
		_ => {},
		}
	}
	if in_string {
		None
	}
	else {
		Some(pos)
	}
}

// vim: ft=rust

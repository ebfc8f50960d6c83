//! Macro expansion and conditional-compilation engine
//!
//! [`Preprocessor::process`] drives the lexer to completion: it
//! maintains the macro table and the `#if` stack, expands macros by
//! pushing replacement tokens back onto the lexer's lookahead queue,
//! and accumulates the expanded output text. All detected violations
//! go to the host's error sink; the engine itself never aborts.
use std::collections::HashMap;

use crate::lexer::Lexer;
use crate::stream::InputStream;
use crate::token::{Token, TokenKind};

mod expr;

#[cfg(test)]
mod tests;

/// Engine-detected violations, reported through [`Options::on_error`]
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum ErrorKind
{
	UnexpectedToken,
	UnbalancedEndif,
	InvalidMacroDefinition,
	MacroAlreadyDefined,
	InconsistentMacroArity,
	UndefinedMacro,
	InvalidIncludeDirective,
	UnexpectedEndOfIncludePath,
	AnotherElseBlockFound,
	ElifBlockAfterElseFound,
	UndefinedDirective,
	IncorrectOperationUsage,
}

impl ::std::fmt::Display for ErrorKind
{
	fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result
	{
		f.write_str(match self
			{
			ErrorKind::UnexpectedToken => "Unexpected token",
			ErrorKind::UnbalancedEndif => "Unbalanced endif",
			ErrorKind::InvalidMacroDefinition => "Invalid macro definition",
			ErrorKind::MacroAlreadyDefined => "The macro is already defined",
			ErrorKind::InconsistentMacroArity => "Inconsistent number of arguments between definition and invocation of the macro",
			ErrorKind::UndefinedMacro => "Undefined macro",
			ErrorKind::InvalidIncludeDirective => "Invalid #include directive",
			ErrorKind::UnexpectedEndOfIncludePath => "Unexpected end of include path",
			ErrorKind::AnotherElseBlockFound => "#else directive should be last one",
			ErrorKind::ElifBlockAfterElseFound => "#elif found after #else block",
			ErrorKind::UndefinedDirective => "Undefined directive",
			ErrorKind::IncorrectOperationUsage => "Incorrect usage of the operation",
			})
	}
}

/// One record handed to the error sink
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct ErrorInfo
{
	pub kind: ErrorKind,
	/// 1-based physical line the lexer was on when the violation was
	/// detected
	pub line: usize,
}

/// A single entry of the symbol table
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct MacroDesc
{
	pub name: String,
	/// `None` for object-like macros; `Some` (possibly empty) for
	/// function-like ones
	pub params: Option<Vec<String>>,
	pub body: Vec<Token>,
}

pub type ErrorCallback = Box<dyn FnMut(ErrorInfo)>;
pub type IncludeCallback = Box<dyn FnMut(&str, bool) -> Option<Box<dyn InputStream>>>;
/// Invoked when a registered custom directive is encountered; the
/// returned text is spliced into the output. The handler may pull
/// tokens through [`Preprocessor::lexer_mut`] but must not re-enter
/// [`Preprocessor::process`].
pub type DirectiveHandler = Box<dyn FnMut(&mut Preprocessor, &str) -> String>;

/// User-provided pre-processor options
pub struct Options
{
	/// Drop `commentary` tokens from the output instead of passing
	/// them through
	pub skip_comments: bool,
	/// Macros seeded into the symbol table before processing begins
	pub user_defines: Vec<MacroDesc>,
	/// Error sink; violations are silently discarded when absent
	pub on_error: Option<ErrorCallback>,
	/// Include resolver; `#include` silently fails when absent
	pub on_include: Option<IncludeCallback>,
}

impl ::std::default::Default for Options
{
	fn default() -> Self
	{
		Options {
			skip_comments: false,
			user_defines: Vec::new(),
			on_error: None,
			on_include: None,
			}
	}
}

/// One level of `#if`/`#endif` nesting
struct Conditional
{
	/// Tokens in the current branch are suppressed
	should_skip: bool,
	/// An `#else` was already seen in this block
	has_else: bool,
	/// Some earlier branch of this block was active; guarantees at
	/// most one active branch
	any_branch_taken: bool,
	/// True iff every enclosing frame is currently active
	parent_active: bool,
}

pub struct Preprocessor
{
	lexer: Lexer,
	/// Parsed macros, keyed by name
	macros: HashMap<String, MacroDesc>,
	/// Names currently being expanded; occurrences do not re-expand
	context: Vec<String>,
	/// Stack of active `#if`/`#else` blocks
	if_stack: Vec<Conditional>,
	/// Host-registered directive handlers
	custom_directives: HashMap<String, DirectiveHandler>,
	/// Substitution text buffer, cleared per macro argument
	scratch: String,
	skip_comments: bool,
	on_error: Option<ErrorCallback>,
	on_include: Option<IncludeCallback>,
}

impl Preprocessor
{
	pub fn new(lexer: Lexer, options: Options) -> Preprocessor
	{
		let Options { skip_comments, user_defines, on_error, on_include } = options;
		let mut rv = Preprocessor {
			lexer,
			macros: HashMap::new(),
			context: Vec::new(),
			if_stack: Vec::new(),
			custom_directives: HashMap::new(),
			scratch: String::new(),
			skip_comments,
			on_error,
			on_include,
			};
		rv.macros.insert("__LINE__".to_owned(), MacroDesc {
			name: "__LINE__".to_owned(),
			params: None,
			body: Vec::new(),
			});
		for def in user_defines
		{
			if rv.macros.contains_key(&def.name) {
				rv.error(ErrorKind::MacroAlreadyDefined);
				continue;
			}
			rv.macros.insert(def.name.clone(), def);
		}
		rv
	}

	/// Registers a host directive: `#name` in the source invokes
	/// `handler` and splices its return value into the output.
	/// Returns `false` if the name was already registered.
	pub fn add_custom_directive(&mut self, name: &str, handler: DirectiveHandler) -> bool
	{
		if self.custom_directives.contains_key(name) || !self.lexer.add_custom_directive(name) {
			return false;
		}
		self.custom_directives.insert(name.to_owned(), handler);
		true
	}

	/// Read-only view of the currently defined macros
	pub fn symbol_table(&self) -> &HashMap<String, MacroDesc>
	{
		&self.macros
	}

	pub fn lexer(&self) -> &Lexer
	{
		&self.lexer
	}

	/// Scanner access for custom directive handlers
	pub fn lexer_mut(&mut self) -> &mut Lexer
	{
		&mut self.lexer
	}

	/// Drives the lexer to completion and returns the expanded text
	pub fn process(&mut self) -> String
	{
		let mut out = String::new();
		loop
		{
			let tok = self.lexer.next_token();
			match tok.kind
			{
			TokenKind::End => break,
			TokenKind::Define => self.create_macro_definition(),
			TokenKind::Undef => self.remove_macro_definition(),
			TokenKind::If => self.open_conditional_expr(),
			TokenKind::Ifdef => self.open_conditional_defined(false),
			TokenKind::Ifndef => self.open_conditional_defined(true),
			TokenKind::Elif => self.handle_elif(),
			TokenKind::Else => self.handle_else(),
			TokenKind::Endif => self.handle_endif(),
			TokenKind::Include => self.process_inclusion(),
			TokenKind::Identifier => self.expand_identifier(tok, &mut out),
			TokenKind::RejectMacro => {
				if let Some(pos) = self.context.iter().rposition(|n| *n == tok.raw) {
					self.context.remove(pos);
				}
				},
			TokenKind::Concat =>
				if !self.should_skip()
				{
					// Pure textual adjacency: drop the whitespace on
					// both sides and emit the next token verbatim
					while out.ends_with(' ') || out.ends_with('\t') {
						out.pop();
					}
					let mut operand = self.lexer.next_token();
					while operand.kind == TokenKind::Space {
						operand = self.lexer.next_token();
					}
					out.push_str(&operand.raw);
				},
			TokenKind::Stringize =>
				if self.context.is_empty() {
					// Only legal inside a macro expansion
					self.error(ErrorKind::IncorrectOperationUsage);
				}
				else if !self.should_skip()
				{
					let operand = self.lexer.next_token();
					out.push('"');
					out.push_str(&operand.raw);
					out.push('"');
				},
			TokenKind::Commentary =>
				if !self.skip_comments && !self.should_skip() {
					out.push_str(&tok.raw);
				},
			TokenKind::CustomDirective => self.run_custom_directive(&tok, &mut out),
			_ =>
				if !self.should_skip() {
					out.push_str(&tok.raw);
				},
			}
		}
		out
	}

	fn error(&mut self, kind: ErrorKind)
	{
		let line = self.lexer.current_line();
		debug!("error {:?} at line {}", kind, line);
		if let Some(cb) = self.on_error.as_mut() {
			cb(ErrorInfo { kind, line });
		}
	}

	/// True when the conditional stack suppresses output
	fn should_skip(&self) -> bool
	{
		match self.if_stack.last()
		{
		Some(e) => e.should_skip || !e.parent_active,
		None => false,
		}
	}

	fn next_nonspace(&mut self) -> Token
	{
		loop
		{
			let tok = self.lexer.next_token();
			match tok.kind
			{
			TokenKind::Space | TokenKind::Commentary => {},
			_ => return tok,
			}
		}
	}

	fn skip_to_newline(&mut self)
	{
		loop
		{
			match self.lexer.next_token().kind
			{
			TokenKind::Newline | TokenKind::End => break,
			_ => {},
			}
		}
	}

	/// Discards the rest of the directive line, unless the failing
	/// token already was its end
	fn recover_to_newline(&mut self, failing: &Token)
	{
		if failing.kind != TokenKind::Newline && failing.kind != TokenKind::End {
			self.skip_to_newline();
		}
	}

	/// Consumes the rest of a directive line, reporting anything that
	/// is not whitespace before the newline
	fn expect_end_of_directive(&mut self)
	{
		let tok = self.next_nonspace();
		if tok.kind != TokenKind::Newline && tok.kind != TokenKind::End
		{
			self.error(ErrorKind::UnexpectedToken);
			self.recover_to_newline(&tok);
		}
	}

	// ---
	// Conditional blocks
	// ---

	fn push_frame(&mut self, should_skip: bool)
	{
		let parent_active = match self.if_stack.last()
			{
			Some(e) => e.parent_active && !e.should_skip,
			None => true,
			};
		self.if_stack.push(Conditional {
			should_skip,
			has_else: false,
			any_branch_taken: !should_skip,
			parent_active,
			});
	}

	fn open_conditional_expr(&mut self)
	{
		let expr_tokens = self.read_directive_expression();
		let value = self.evaluate(&expr_tokens);
		self.push_frame(value == 0);
	}

	fn open_conditional_defined(&mut self, invert: bool)
	{
		let tok = self.next_nonspace();
		if tok.kind != TokenKind::Identifier
		{
			self.error(ErrorKind::UnexpectedToken);
			self.recover_to_newline(&tok);
			self.push_frame(true);
			return;
		}
		let defined = self.macros.contains_key(&tok.raw);
		self.expect_end_of_directive();
		// `#ifdef`: skip when undefined; `#ifndef`: skip when defined
		self.push_frame(defined == invert);
	}

	fn handle_elif(&mut self)
	{
		let expr_tokens = self.read_directive_expression();
		let value = self.evaluate(&expr_tokens);
		let has_else = match self.if_stack.last()
			{
			Some(e) => e.has_else,
			None => {
				self.error(ErrorKind::UnexpectedToken);
				return;
				},
			};
		if has_else
		{
			self.error(ErrorKind::ElifBlockAfterElseFound);
			return;
		}
		if let Some(e) = self.if_stack.last_mut()
		{
			e.should_skip = e.any_branch_taken || value == 0;
			e.any_branch_taken |= !e.should_skip;
		}
	}

	fn handle_else(&mut self)
	{
		self.expect_end_of_directive();
		let has_else = match self.if_stack.last()
			{
			Some(e) => e.has_else,
			None => {
				self.error(ErrorKind::UnexpectedToken);
				return;
				},
			};
		if has_else
		{
			self.error(ErrorKind::AnotherElseBlockFound);
			return;
		}
		if let Some(e) = self.if_stack.last_mut()
		{
			e.should_skip = e.any_branch_taken || !e.should_skip;
			e.has_else = true;
		}
	}

	fn handle_endif(&mut self)
	{
		self.expect_end_of_directive();
		if self.if_stack.pop().is_none() {
			self.error(ErrorKind::UnbalancedEndif);
		}
	}

	/// Collects the remainder of a directive line (whitespace and
	/// commentary dropped) for expression evaluation
	fn read_directive_expression(&mut self) -> Vec<Token>
	{
		let mut tokens = Vec::new();
		loop
		{
			let tok = self.lexer.next_token();
			match tok.kind
			{
			TokenKind::Newline | TokenKind::End => break,
			TokenKind::Space | TokenKind::Commentary => {},
			_ => tokens.push(tok),
			}
		}
		tokens
	}

	fn evaluate(&self, tokens: &[Token]) -> i64
	{
		let value = expr::Parser::new(tokens, &self.macros).evaluate();
		debug!("conditional expression ({} tokens) = {}", tokens.len(), value);
		value
	}

	// ---
	// Macro definition
	// ---

	fn create_macro_definition(&mut self)
	{
		let tok = self.lexer.next_token();
		if tok.kind != TokenKind::Space
		{
			self.error(ErrorKind::InvalidMacroDefinition);
			self.recover_to_newline(&tok);
			return;
		}
		let name_tok = self.next_nonspace();
		if name_tok.kind != TokenKind::Identifier
		{
			self.error(ErrorKind::InvalidMacroDefinition);
			self.recover_to_newline(&name_tok);
			return;
		}
		let mut desc = MacroDesc {
			name: name_tok.raw.clone(),
			params: None,
			body: Vec::new(),
			};

		let tok = self.lexer.next_token();
		match tok.kind
		{
		TokenKind::Newline | TokenKind::End => {
			// `#define FOO` alone: the traditional `-DFOO` convention
			desc.body.push(Token::new(TokenKind::Number, "1", name_tok.line, name_tok.col));
			},
		TokenKind::Space => {
			self.read_macro_body(&mut desc);
			},
		TokenKind::OpenBracket => {
			if !self.read_macro_params(&mut desc) {
				return;
			}
			self.read_macro_body(&mut desc);
			},
		_ => {
			self.error(ErrorKind::InvalidMacroDefinition);
			self.recover_to_newline(&tok);
			return;
			},
		}

		if self.should_skip() {
			return;
		}
		info!("define {} {:?} ({} tokens)", desc.name, desc.params, desc.body.len());
		if self.macros.contains_key(&desc.name)
		{
			self.error(ErrorKind::MacroAlreadyDefined);
			return;
		}
		self.macros.insert(desc.name.clone(), desc);
	}

	/// Parses `( SPACE* name (SPACE* , SPACE* name)* SPACE* )`; an
	/// immediately closed list defines a zero-parameter function-like
	/// macro
	fn read_macro_params(&mut self, desc: &mut MacroDesc) -> bool
	{
		let mut params = Vec::new();
		let mut tok = self.next_nonspace();
		if tok.kind != TokenKind::CloseBracket
		{
			loop
			{
				if tok.kind != TokenKind::Identifier
				{
					self.error(ErrorKind::InvalidMacroDefinition);
					self.recover_to_newline(&tok);
					return false;
				}
				params.push(tok.raw);
				tok = self.next_nonspace();
				if tok.kind == TokenKind::CloseBracket {
					break;
				}
				if tok.kind != TokenKind::Comma
				{
					self.error(ErrorKind::InvalidMacroDefinition);
					self.recover_to_newline(&tok);
					return false;
				}
				tok = self.next_nonspace();
			}
		}
		desc.params = Some(params);
		true
	}

	/// Captures the replacement body up to the end of the line.
	/// Identifiers equal to the macro's own name are downgraded to
	/// blobs (single-level self-reference suppression); an empty body
	/// becomes the literal `1`.
	fn read_macro_body(&mut self, desc: &mut MacroDesc)
	{
		let mut tok = self.next_nonspace();
		while tok.kind != TokenKind::Newline && tok.kind != TokenKind::End
		{
			if tok.kind == TokenKind::Commentary {
				tok = self.lexer.next_token();
				continue;
			}
			if tok.kind == TokenKind::Identifier && tok.raw == desc.name {
				tok.kind = TokenKind::Blob;
			}
			desc.body.push(tok);
			tok = self.lexer.next_token();
		}
		if desc.body.is_empty() {
			desc.body.push(Token::new(TokenKind::Number, "1", tok.line, tok.col));
		}
	}

	fn remove_macro_definition(&mut self)
	{
		let tok = self.next_nonspace();
		if tok.kind != TokenKind::Identifier
		{
			self.error(ErrorKind::UnexpectedToken);
			self.recover_to_newline(&tok);
			return;
		}
		if self.should_skip() {
			return;
		}
		if self.macros.remove(&tok.raw).is_none() {
			self.error(ErrorKind::UndefinedMacro);
		}
		self.expect_end_of_directive();
	}

	// ---
	// Inclusion
	// ---

	fn process_inclusion(&mut self)
	{
		let tok = self.next_nonspace();
		let is_system = match tok.kind
			{
			TokenKind::Less => true,
			TokenKind::Quotes => false,
			_ => {
				self.error(ErrorKind::InvalidIncludeDirective);
				self.recover_to_newline(&tok);
				return;
				},
			};
		let mut path = String::new();
		loop
		{
			let tok = self.lexer.next_token();
			match tok.kind
			{
			TokenKind::Greater if is_system => break,
			TokenKind::Quotes if !is_system => break,
			TokenKind::Newline | TokenKind::End => {
				self.error(ErrorKind::UnexpectedEndOfIncludePath);
				return;
				},
			_ => path.push_str(&tok.raw),
			}
		}
		self.expect_end_of_directive();
		if self.should_skip() {
			// Inclusion under an inactive branch is ignored
			return;
		}
		debug!("include {:?} (system={})", path, is_system);
		let stream = match self.on_include.as_mut()
			{
			Some(cb) => cb(&path, is_system),
			None => None,
			};
		match stream
		{
		Some(s) => self.lexer.push_stream(s),
		// Resolution refused: inclusion silently fails
		None => {},
		}
	}

	// ---
	// Macro expansion
	// ---

	fn expand_identifier(&mut self, tok: Token, out: &mut String)
	{
		if self.should_skip() {
			return;
		}
		if !self.macros.contains_key(&tok.raw) || self.context.iter().any(|n| *n == tok.raw)
		{
			out.push_str(&tok.raw);
			return;
		}
		let desc = match self.macros.get(&tok.raw)
			{
			Some(d) => d.clone(),
			None => return,
			};
		if desc.params.is_some() {
			self.expand_function_macro(desc, &tok);
		}
		else {
			self.expand_object_macro(desc, &tok);
		}
	}

	fn expand_object_macro(&mut self, desc: MacroDesc, id_tok: &Token)
	{
		// Peek past whitespace: a following `##` blocks expansion so
		// the name participates in pure textual pasting
		let mut off = 0;
		while self.lexer.peek_token(off).kind == TokenKind::Space {
			off += 1;
		}
		if self.lexer.peek_token(off).kind == TokenKind::Concat
		{
			self.lexer.push_tokens_front(vec![
				Token::new(TokenKind::Blob, desc.name, id_tok.line, id_tok.col),
				]);
			return;
		}
		if desc.name == "__LINE__" && desc.body.is_empty()
		{
			// Built-in: the replacement is computed from the source
			// position of the identifier itself
			self.lexer.push_tokens_front(vec![
				Token::new(TokenKind::Blob, id_tok.line.to_string(), id_tok.line, id_tok.col),
				]);
			return;
		}
		debug!("expand {} -> {} tokens", desc.name, desc.body.len());
		let MacroDesc { name, body: mut replacement, .. } = desc;
		replacement.push(Token::new(TokenKind::RejectMacro, name.clone(), id_tok.line, id_tok.col));
		self.context.push(name);
		self.lexer.push_tokens_front(replacement);
	}

	fn expand_function_macro(&mut self, desc: MacroDesc, id_tok: &Token)
	{
		let MacroDesc { name, params, mut body } = desc;
		let params = match params
			{
			Some(v) => v,
			None => return,
			};
		// Whitespace may separate the name from the opening bracket
		let mut consumed = Vec::new();
		let mut tok = self.lexer.next_token();
		while tok.kind == TokenKind::Space
		{
			consumed.push(tok);
			tok = self.lexer.next_token();
		}
		if tok.kind != TokenKind::OpenBracket
		{
			// Not an invocation - the name passes through as a plain
			// blob so it cannot re-trigger expansion
			let mut back = vec![ Token::new(TokenKind::Blob, name, id_tok.line, id_tok.col) ];
			back.extend(consumed);
			back.push(tok);
			self.lexer.push_tokens_front(back);
			return;
		}
		let lexer = &mut self.lexer;
		let args = match capture_macro_args(&mut || lexer.next_token())
			{
			Some(v) => v,
			None => {
				self.error(ErrorKind::UnexpectedToken);
				return;
				},
			};
		if args.len() != params.len() {
			self.error(ErrorKind::InconsistentMacroArity);
		}
		for (param, arg) in params.iter().zip(args.iter())
		{
			self.scratch.clear();
			for t in arg {
				self.scratch.push_str(&t.raw);
			}
			for t in body.iter_mut()
			{
				if t.kind == TokenKind::Identifier && t.raw == *param {
					t.raw = self.scratch.clone();
				}
			}
		}
		debug!("expand {}({} args) -> {} tokens", name, args.len(), body.len());
		body.push(Token::new(TokenKind::RejectMacro, name.clone(), id_tok.line, id_tok.col));
		self.context.push(name);
		self.lexer.push_tokens_front(body);
	}

	// ---
	// Custom directives
	// ---

	fn run_custom_directive(&mut self, tok: &Token, out: &mut String)
	{
		// The handler receives `&mut self`, so the table is parked to
		// the side for the duration of the call
		let mut handlers = ::std::mem::take(&mut self.custom_directives);
		match handlers.get_mut(&tok.raw)
		{
		Some(handler) => {
			let text = handler(self, out);
			if !self.should_skip() {
				out.push_str(&text);
			}
			},
		None => {
			self.error(ErrorKind::UndefinedDirective);
			},
		}
		for (name, handler) in ::std::mem::take(&mut self.custom_directives)
		{
			handlers.entry(name).or_insert(handler);
		}
		self.custom_directives = handlers;
	}
}

/// Reads a macro argument list, honouring nested brackets; the
/// opening bracket must already be consumed. Leading and trailing
/// whitespace is collapsed per argument; a `()` with no content at
/// all is an empty argument list. `None` when the source ends before
/// the closing bracket.
fn capture_macro_args(next_token: &mut dyn FnMut() -> Token) -> Option<Vec<Vec<Token>>>
{
	let mut args = Vec::new();
	let mut current = Vec::new();
	let mut depth = 0usize;
	let mut seen_any = false;
	loop
	{
		let tok = next_token();
		match tok.kind
		{
		TokenKind::End => return None,
		TokenKind::CloseBracket if depth == 0 => {
			if seen_any || !args.is_empty() {
				args.push(trim_argument(current));
			}
			return Some(args);
			},
		TokenKind::Comma if depth == 0 => {
			args.push(trim_argument(::std::mem::take(&mut current)));
			seen_any = true;
			},
		TokenKind::OpenBracket => {
			depth += 1;
			seen_any = true;
			current.push(tok);
			},
		TokenKind::CloseBracket => {
			depth -= 1;
			current.push(tok);
			},
		TokenKind::Commentary => {},
		_ => {
			seen_any = true;
			current.push(tok);
			},
		}
	}
}

fn trim_argument(mut tokens: Vec<Token>) -> Vec<Token>
{
	while matches!(tokens.first().map(|t| t.kind), Some(TokenKind::Space) | Some(TokenKind::Newline)) {
		tokens.remove(0);
	}
	while matches!(tokens.last().map(|t| t.kind), Some(TokenKind::Space) | Some(TokenKind::Newline)) {
		tokens.pop();
	}
	tokens
}

// vim: ft=rust

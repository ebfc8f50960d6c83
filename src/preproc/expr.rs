//! Constant-expression evaluation for `#if`/`#elif`
//!
//! A recursive-descent parser over the token sequence captured from
//! the directive line, one method per precedence level (lowest
//! first). The result is an integer; zero is false.
use std::collections::HashMap;

use crate::token::{Token, TokenKind};
use super::MacroDesc;

pub struct Parser<'a>
{
	tokens: Vec<Token>,
	pos: usize,
	macros: &'a HashMap<String, MacroDesc>,
	/// Names whose bodies are currently being evaluated; a
	/// re-occurrence folds to a literal instead of recursing
	active: Vec<String>,
}

impl<'a> Parser<'a>
{
	pub fn new(tokens: &[Token], macros: &'a HashMap<String, MacroDesc>) -> Parser<'a>
	{
		Parser {
			tokens: tokens.to_vec(),
			pos: 0,
			macros,
			active: Vec::new(),
			}
	}

	pub fn evaluate(&mut self) -> i64
	{
		self.eval_or()
	}

	fn next(&mut self) -> Option<Token>
	{
		let rv = self.tokens.get(self.pos).cloned();
		if rv.is_some() {
			self.pos += 1;
		}
		rv
	}

	fn next_is(&self, kind: TokenKind) -> bool
	{
		self.tokens.get(self.pos).map(|t| t.kind) == Some(kind)
	}

	fn eval_or(&mut self) -> i64
	{
		let mut v = self.eval_and();
		while self.next_is(TokenKind::Or)
		{
			self.pos += 1;
			let rhs = self.eval_and();
			v = (v != 0 || rhs != 0) as i64;
		}
		v
	}

	fn eval_and(&mut self) -> i64
	{
		let mut v = self.eval_eq();
		while self.next_is(TokenKind::And)
		{
			self.pos += 1;
			let rhs = self.eval_eq();
			v = (v != 0 && rhs != 0) as i64;
		}
		v
	}

	fn eval_eq(&mut self) -> i64
	{
		let mut v = self.eval_cmp();
		loop
		{
			v = if self.next_is(TokenKind::Eq) {
					self.pos += 1;
					(v == self.eval_cmp()) as i64
				}
				else if self.next_is(TokenKind::Ne) {
					self.pos += 1;
					(v != self.eval_cmp()) as i64
				}
				else {
					return v;
				};
		}
	}

	fn eval_cmp(&mut self) -> i64
	{
		let mut v = self.eval_add();
		loop
		{
			v = if self.next_is(TokenKind::Less) {
					self.pos += 1;
					(v < self.eval_add()) as i64
				}
				else if self.next_is(TokenKind::Greater) {
					self.pos += 1;
					(v > self.eval_add()) as i64
				}
				else if self.next_is(TokenKind::Le) {
					self.pos += 1;
					(v <= self.eval_add()) as i64
				}
				else if self.next_is(TokenKind::Ge) {
					self.pos += 1;
					(v >= self.eval_add()) as i64
				}
				else {
					return v;
				};
		}
	}

	fn eval_add(&mut self) -> i64
	{
		let mut v = self.eval_mul();
		loop
		{
			v = if self.next_is(TokenKind::Plus) {
					self.pos += 1;
					v + self.eval_mul()
				}
				else if self.next_is(TokenKind::Minus) {
					self.pos += 1;
					v - self.eval_mul()
				}
				else {
					return v;
				};
		}
	}

	fn eval_mul(&mut self) -> i64
	{
		let mut v = self.eval_unary();
		loop
		{
			v = if self.next_is(TokenKind::Star) {
					self.pos += 1;
					v * self.eval_unary()
				}
				else if self.next_is(TokenKind::Slash) {
					self.pos += 1;
					// Division by zero folds to false rather than
					// signalling
					match self.eval_unary()
					{
					0 => 0,
					rhs => v / rhs,
					}
				}
				else {
					return v;
				};
		}
	}

	fn eval_unary(&mut self) -> i64
	{
		if self.next_is(TokenKind::Not)
		{
			self.pos += 1;
			(self.eval_unary() == 0) as i64
		}
		else if self.next_is(TokenKind::Minus)
		{
			self.pos += 1;
			-self.eval_unary()
		}
		else
		{
			self.eval_primary()
		}
	}

	fn eval_primary(&mut self) -> i64
	{
		let tok = match self.next()
			{
			Some(t) => t,
			None => return 0,
			};
		match tok.kind
		{
		TokenKind::Number => parse_int(&tok.raw),
		TokenKind::OpenBracket => {
			let v = self.eval_or();
			if self.next_is(TokenKind::CloseBracket) {
				self.pos += 1;
			}
			v
			},
		TokenKind::Identifier if tok.raw == "defined" => self.eval_defined(),
		TokenKind::Defined => self.eval_defined(),
		TokenKind::Identifier => self.eval_identifier(&tok),
		_ => parse_int(&tok.raw),
		}
	}

	/// `defined(NAME)`, with the parentheses optional
	fn eval_defined(&mut self) -> i64
	{
		let parenthesised = self.next_is(TokenKind::OpenBracket);
		if parenthesised {
			self.pos += 1;
		}
		let name = match self.next()
			{
			Some(t) if t.kind == TokenKind::Identifier => t.raw,
			_ => return 0,
			};
		if parenthesised && self.next_is(TokenKind::CloseBracket) {
			self.pos += 1;
		}
		self.macros.contains_key(&name) as i64
	}

	fn eval_identifier(&mut self, tok: &Token) -> i64
	{
		if self.active.iter().any(|n| *n == tok.raw) {
			// Already under evaluation: fold to a literal
			return parse_int(&tok.raw);
		}
		let macros = self.macros;
		match macros.get(&tok.raw)
		{
		Some(desc) =>
			match desc.params
			{
			None => {
				// An object-like macro's body is itself an expression
				self.active.push(tok.raw.clone());
				let v = self.eval_subexpression(strip_spaces(&desc.body));
				self.active.pop();
				v
				},
			Some(ref params) => {
				if !self.next_is(TokenKind::OpenBracket) {
					warn!("function-like macro {} used without arguments in conditional, evaluating to 0", tok.raw);
					return parse_int(&tok.raw);
				}
				self.pos += 1;
				let args = match super::capture_macro_args(&mut || self.next().unwrap_or_else(Token::end))
					{
					Some(v) => v,
					None => return 0,
					};
				let mut body = strip_spaces(&desc.body);
				let mut scratch = String::new();
				for (param, arg) in params.iter().zip(args.iter())
				{
					scratch.clear();
					for t in arg {
						scratch.push_str(&t.raw);
					}
					for t in body.iter_mut()
					{
						if t.kind == TokenKind::Identifier && t.raw == *param {
							t.raw = scratch.clone();
						}
					}
				}
				self.active.push(tok.raw.clone());
				let v = self.eval_subexpression(body);
				self.active.pop();
				v
				},
			},
		None => {
			warn!("undefined identifier {} in conditional, evaluating to 0", tok.raw);
			parse_int(&tok.raw)
			},
		}
	}

	fn eval_subexpression(&mut self, tokens: Vec<Token>) -> i64
	{
		let mut sub = Parser {
			tokens,
			pos: 0,
			macros: self.macros,
			active: ::std::mem::take(&mut self.active),
			};
		let v = sub.eval_or();
		self.active = sub.active;
		v
	}
}

fn strip_spaces(tokens: &[Token]) -> Vec<Token>
{
	tokens.iter()
		.filter(|t| t.kind != TokenKind::Space && t.kind != TokenKind::Commentary)
		.cloned()
		.collect()
}

/// "parse as integer or zero": hex with a `0x` prefix, decimal
/// otherwise; anything unparseable (including undefined identifiers)
/// is zero
fn parse_int(raw: &str) -> i64
{
	match raw.strip_prefix("0x")
	{
	Some(hex) => i64::from_str_radix(hex, 16).unwrap_or(0),
	None => raw.parse().unwrap_or(0),
	}
}


// vim: ft=rust

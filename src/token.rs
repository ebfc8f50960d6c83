//! Token data model shared between the lexer and the preprocessor

/// Token type (result of lexing)
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum TokenKind
{
	Identifier,
	/// An identifier matching the reserved-word table. Only an aid to
	/// host tools - the preprocessor treats it as an identifier that
	/// cannot name a macro.
	Keyword,
	Number,
	/// Catch-all for unrecognised character runs
	Blob,
	Space,
	Newline,
	Commentary,
	End,

	// -- Separators
	Comma,
	OpenBracket,
	CloseBracket,
	OpenSquareBracket,
	CloseSquareBracket,
	Less,
	Greater,
	Quotes,
	Semicolon,

	// -- Arithmetic/logical symbols
	Plus,
	Minus,
	Star,
	Slash,
	Ampersand,
	Vline,
	Not,
	And,
	Or,
	Lshift,
	Rshift,
	Eq,
	Ne,
	Le,
	Ge,

	// -- Directives
	Define,
	Ifdef,
	Ifndef,
	If,
	Else,
	Elif,
	Undef,
	Endif,
	Include,
	Defined,
	/// A host-registered directive; the raw view carries the name
	CustomDirective,

	// -- Macro operators
	Stringize,
	Concat,

	/// Sentinel that releases a name from the active expansion
	/// context; never reaches the output
	RejectMacro,
}

/// A single lexed token. Tokens are plain values, freely copied
/// between the lexer's queue and the preprocessor.
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct Token
{
	pub kind: TokenKind,
	/// Raw source text (empty for directive tokens whose identity is
	/// implied by the kind)
	pub raw: String,
	/// 1-based physical line of the first character
	pub line: usize,
	/// 0-based column of the first character
	pub col: usize,
}

impl Token
{
	pub fn new(kind: TokenKind, raw: impl Into<String>, line: usize, col: usize) -> Token
	{
		Token {
			kind,
			raw: raw.into(),
			line,
			col,
			}
	}

	pub fn end() -> Token
	{
		Token::new(TokenKind::End, "", 0, 0)
	}
}

/// Directive names recognised after `#`, in match order. Matching is
/// by prefix, so `ifdef`/`ifndef` must stay ahead of `if`.
pub static DIRECTIVES_TABLE: [(&str, TokenKind); 10] = [
	("define", TokenKind::Define),
	("ifdef", TokenKind::Ifdef),
	("ifndef", TokenKind::Ifndef),
	("if", TokenKind::If),
	("else", TokenKind::Else),
	("elif", TokenKind::Elif),
	("undef", TokenKind::Undef),
	("endif", TokenKind::Endif),
	("include", TokenKind::Include),
	("defined", TokenKind::Defined),
	];

/// The fixed C reserved-word set
pub static KEYWORDS_TABLE: [&str; 32] = [
	"auto", "double", "int", "struct",
	"break", "else", "long", "switch",
	"case", "enum", "register", "typedef",
	"char", "extern", "return", "union",
	"const", "float", "short", "unsigned",
	"continue", "for", "signed", "void",
	"default", "goto", "sizeof", "volatile",
	"do", "if", "static", "while",
	];

pub fn is_keyword(ident: &str) -> bool
{
	KEYWORDS_TABLE.iter().any(|k| *k == ident)
}

// vim: ft=rust

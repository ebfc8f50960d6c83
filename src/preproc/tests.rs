use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::lexer::Lexer;
use crate::stream::{InputStream, StringInputStream};
use crate::token::{Token, TokenKind};
use super::{ErrorInfo, ErrorKind, MacroDesc, Options, Preprocessor};

fn init_logging()
{
	let _ = ::env_logger::builder().is_test(true).try_init();
}

fn process(src: &str) -> String
{
	init_logging();
	crate::process_str(src, Options::default())
}

/// Runs the engine with a collecting error sink
fn process_with_errors(src: &str) -> (String, Vec<ErrorKind>)
{
	init_logging();
	let errors = Rc::new(RefCell::new(Vec::new()));
	let sink = errors.clone();
	let out = crate::process_str(src, Options {
		on_error: Some(Box::new(move |e: ErrorInfo| sink.borrow_mut().push(e.kind))),
		.. Options::default()
		});
	let collected = errors.borrow().clone();
	(out, collected)
}

fn number_token(raw: &str) -> Token
{
	Token::new(TokenKind::Number, raw, 0, 0)
}

// ---
// Plain passthrough
// ---

#[test]
fn macro_free_input_is_untouched()
{
	let src = "void main/* entry */()\n{\n\tfloat4x4 m; // local\n\tcolor = tint * 0.5;\n}\n";
	assert_eq!(process(src), src);
}

#[test]
fn skip_comments_drops_commentary()
{
	let src = "void main/* entry */()\n{\n\tfloat4x4 m; // local\n}\n";
	let out = crate::process_str(src, Options { skip_comments: true, .. Options::default() });
	assert_eq!(out, "void main()\n{\n\tfloat4x4 m; \n}\n");
}

// ---
// Macro definition and expansion
// ---

#[test]
fn object_macro_is_substituted()
{
	let out = process("#define VALUE 42\nvoid main()\n{\n\treturn VALUE;\n}");
	assert_eq!(out, "void main()\n{\n\treturn 42;\n}");
}

#[test]
fn bodyless_define_expands_to_one()
{
	assert_eq!(process("#define VALUE\nVALUE"), "1");
}

#[test]
fn macros_chain_through_rescan()
{
	let out = process("#define INNER 42\n#define OUTER INNER\nOUTER");
	assert_eq!(out, "42");
}

#[test]
fn function_macro_with_arguments()
{
	let out = process("#define ADD(a,b) (a + b)\nADD(1, 2)");
	assert_eq!(out, "(1 + 2)");
}

#[test]
fn nested_parentheses_do_not_split_arguments()
{
	let out = process("#define ADD(a,b) (a + b)\nADD(1, (2,3))");
	assert_eq!(out, "(1 + (2,3))");
}

#[test]
fn whitespace_before_argument_list_is_allowed()
{
	assert_eq!(process("#define F(x) x\nF (7)"), "7");
}

#[test]
fn function_macro_without_call_passes_through()
{
	assert_eq!(process("#define F(x) x\nF + 1"), "F + 1");
}

#[test]
fn zero_parameter_macro()
{
	assert_eq!(process("#define G() done\nG()"), "done");
	assert_eq!(process("#define G() done\nG;"), "G;");
}

#[test]
fn whitespace_only_argument_is_empty()
{
	assert_eq!(process("#define F(x) [x]\nF( )"), "[]");
}

#[test]
fn expansion_context_is_released_between_calls()
{
	assert_eq!(process("#define M(x) x\nM(1) M(2)"), "1 2");
}

#[test]
fn self_referencing_macro_terminates()
{
	assert_eq!(process("#define A A\nA"), "A");
}

#[test]
fn mutually_recursive_macros_terminate()
{
	assert_eq!(process("#define A B\n#define B A\nA"), "A");
}

#[test]
fn redefinition_is_an_error_and_keeps_the_original()
{
	let (out, errors) = process_with_errors("#define FOO 1\n#define FOO 2\nFOO");
	assert_eq!(out, "1");
	assert_eq!(errors, vec![ ErrorKind::MacroAlreadyDefined ]);
}

#[test]
fn invalid_definition_is_reported()
{
	let (out, errors) = process_with_errors("#define 1x\n");
	assert_eq!(out, "");
	assert_eq!(errors, vec![ ErrorKind::InvalidMacroDefinition ]);
}

#[test]
fn arity_mismatch_is_reported()
{
	let (out, errors) = process_with_errors("#define F(a,b) a\nF(1)");
	assert_eq!(out, "1");
	assert_eq!(errors, vec![ ErrorKind::InconsistentMacroArity ]);
}

#[test]
fn undef_removes_the_macro()
{
	let (out, errors) = process_with_errors("#define FOO 1\n#undef FOO\nFOO");
	assert_eq!(out, "FOO");
	assert_eq!(errors, vec![]);
}

#[test]
fn undef_of_unknown_macro_is_reported()
{
	let (out, errors) = process_with_errors("#undef FOO\n");
	assert_eq!(out, "");
	assert_eq!(errors, vec![ ErrorKind::UndefinedMacro ]);
}

#[test]
fn undef_allows_redefinition()
{
	assert_eq!(process("#define FOO 1\n#undef FOO\n#define FOO 2\nFOO"), "2");
}

// ---
// Stringize and concatenation
// ---

#[test]
fn stringize_wraps_the_argument()
{
	assert_eq!(process("#define FOO(Name) #Name\n FOO(Text)"), " \"Text\"");
}

#[test]
fn stringize_outside_expansion_is_an_error()
{
	let (out, errors) = process_with_errors("#Text");
	assert_eq!(out, "Text");
	assert_eq!(errors, vec![ ErrorKind::IncorrectOperationUsage ]);
}

#[test]
fn stray_hash_before_whitespace_is_preserved()
{
	let (out, errors) = process_with_errors("# foo\n");
	assert_eq!(out, "# foo\n");
	assert_eq!(errors, vec![]);
}

#[test]
fn concat_joins_adjacent_tokens()
{
	assert_eq!(process("#define CAT(a,b) a ## b\nCAT(col, 0)"), "col0");
}

#[test]
fn concat_blocks_expansion_of_its_operands()
{
	let out = process("#define AAA 1\n#define BB 2\nAAA ## BB");
	assert_eq!(out, "AAABB");
}

#[test]
fn no_prescan_across_concat()
{
	let out = process("#define STRCAT(a,b) a ## b\nSTRCAT(__LINE__,b)");
	assert_eq!(out, "__LINE__b");
}

// ---
// Built-in macros
// ---

#[test]
fn line_builtin_counts_physical_lines()
{
	assert_eq!(process("__LINE__\n__LINE__\n__LINE__"), "1\n2\n3");
}

#[test]
fn line_builtin_resets_per_stream()
{
	init_logging();
	let options = Options {
		on_include: Some(Box::new(|_path: &str, _sys: bool| -> Option<Box<dyn InputStream>> {
			Some(Box::new(StringInputStream::new("__LINE__\n")))
		})),
		.. Options::default()
		};
	let out = crate::process_str("__LINE__\n#include \"a\"\n__LINE__", options);
	assert_eq!(out, "1\n1\n3");
}

// ---
// Conditional compilation
// ---

#[test]
fn inactive_branch_is_suppressed()
{
	assert_eq!(process("#if 0\nhidden\n#endif"), "");
	assert_eq!(process("#if 1\nshown\n#endif"), "shown\n");
}

#[test]
fn ifdef_and_ifndef()
{
	assert_eq!(process("#define FOO\n#ifdef FOO\nyes\n#endif"), "yes\n");
	assert_eq!(process("#ifdef FOO\nyes\n#endif"), "");
	assert_eq!(process("#ifndef FOO\nno\n#endif"), "no\n");
}

#[test]
fn elif_selects_the_first_true_branch()
{
	let out = process("#if 0\none\n#elif 1\ntwo\n#else\nthree\n#endif");
	assert_eq!(out, "two\n");
}

#[test]
fn at_most_one_branch_is_taken()
{
	let out = process("#if 1\nA\n#elif 1\nB\n#else\nC\n#endif");
	assert_eq!(out, "A\n");
}

#[test]
fn inactive_outer_frame_dominates_inner_frames()
{
	let out = process("#if 0\n#if 1\nX\n#endif\n#endif");
	assert_eq!(out, "");
}

#[test]
fn macros_are_not_expanded_in_skipped_branches()
{
	let (out, errors) = process_with_errors("#define F(a,b) a\n#if 0\nF(1)\n#endif");
	assert_eq!(out, "");
	assert_eq!(errors, vec![]);
}

#[test]
fn unbalanced_endif_is_reported()
{
	let (out, errors) = process_with_errors("#endif");
	assert_eq!(out, "");
	assert_eq!(errors, vec![ ErrorKind::UnbalancedEndif ]);
}

#[test]
fn repeated_else_is_reported()
{
	let (out, errors) = process_with_errors("#if 1\nx\n#else\ny\n#else\nz\n#endif");
	assert_eq!(out, "x\n");
	assert_eq!(errors, vec![ ErrorKind::AnotherElseBlockFound ]);
}

#[test]
fn elif_after_else_is_reported()
{
	let (out, errors) = process_with_errors("#if 1\nA\n#else\nB\n#elif 0\nC\n#endif");
	assert_eq!(out, "A\n");
	assert_eq!(errors, vec![ ErrorKind::ElifBlockAfterElseFound ]);
}

#[test]
fn unclosed_conditional_at_eof_is_tolerated()
{
	let (out, errors) = process_with_errors("#if 1\nopen");
	assert_eq!(out, "open");
	assert_eq!(errors, vec![]);
}

// ---
// Conditional expressions
// ---

#[test]
fn expressions_use_macro_values()
{
	let out = process("#define A 1\n#define AND(X,Y) (X && Y)\n#if AND(A,0)\nP\n#else\nQ\n#endif");
	assert_eq!(out, "Q\n");
}

#[test]
fn defined_operator_in_conditionals()
{
	let out = process("#define FOO 0\n#if defined(FOO) && FOO == 0\nyes\n#endif");
	assert_eq!(out, "yes\n");
	let out = process("#if defined BAR\nx\n#else\ny\n#endif");
	assert_eq!(out, "y\n");
}

#[test]
fn unary_minus_negates()
{
	assert_eq!(process("#if -1\nneg\n#endif"), "neg\n");
	assert_eq!(process("#if 1 + -1\nx\n#else\ny\n#endif"), "y\n");
}

#[test]
fn division_by_zero_is_false()
{
	assert_eq!(process("#if 1 / 0\nx\n#else\ny\n#endif"), "y\n");
}

#[test]
fn hex_literals_in_conditionals()
{
	assert_eq!(process("#if 0x10 == 16\nhex\n#endif"), "hex\n");
}

// ---
// Inclusion
// ---

#[test]
fn include_pushes_the_resolved_stream()
{
	init_logging();
	let calls = Rc::new(RefCell::new(Vec::new()));
	let seen = calls.clone();
	let options = Options {
		on_include: Some(Box::new(move |path: &str, is_system: bool| -> Option<Box<dyn InputStream>> {
			seen.borrow_mut().push((path.to_string(), is_system));
			Some(Box::new(StringInputStream::new("included\n")))
		})),
		.. Options::default()
		};
	let out = crate::process_str("before\n#include \"inc/common.h\"\nafter", options);
	assert_eq!(out, "before\nincluded\nafter");
	assert_eq!(&*calls.borrow(), &[ ("inc/common.h".to_string(), false) ]);
}

#[test]
fn system_includes_set_the_flag()
{
	init_logging();
	let calls = Rc::new(RefCell::new(Vec::new()));
	let seen = calls.clone();
	let options = Options {
		on_include: Some(Box::new(move |path: &str, is_system: bool| -> Option<Box<dyn InputStream>> {
			seen.borrow_mut().push((path.to_string(), is_system));
			None
		})),
		.. Options::default()
		};
	let _ = crate::process_str("#include <sys/types.h>\n", options);
	assert_eq!(&*calls.borrow(), &[ ("sys/types.h".to_string(), true) ]);
}

#[test]
fn includes_nest_through_the_stream_stack()
{
	init_logging();
	let options = Options {
		on_include: Some(Box::new(|path: &str, _sys: bool| -> Option<Box<dyn InputStream>> {
			match path
			{
			"a" => Some(Box::new(StringInputStream::new("1\n#include \"b\"\n3\n"))),
			"b" => Some(Box::new(StringInputStream::new("2\n"))),
			_ => None,
			}
		})),
		.. Options::default()
		};
	let out = crate::process_str("#include \"a\"\nend", options);
	assert_eq!(out, "1\n2\n3\nend");
}

#[test]
fn refused_inclusion_fails_silently()
{
	let (out, errors) = process_with_errors("#include \"missing\"\nok");
	assert_eq!(out, "ok");
	assert_eq!(errors, vec![]);
}

#[test]
fn include_in_inactive_branch_is_ignored()
{
	init_logging();
	let calls = Rc::new(RefCell::new(0));
	let seen = calls.clone();
	let options = Options {
		on_include: Some(Box::new(move |_path: &str, _sys: bool| -> Option<Box<dyn InputStream>> {
			*seen.borrow_mut() += 1;
			None
		})),
		.. Options::default()
		};
	let _ = crate::process_str("#if 0\n#include \"x\"\n#endif", options);
	assert_eq!(*calls.borrow(), 0);
}

#[test]
fn unterminated_include_path_is_reported()
{
	let (_, errors) = process_with_errors("#include \"unterminated\n");
	assert_eq!(errors, vec![ ErrorKind::UnexpectedEndOfIncludePath ]);
}

#[test]
fn malformed_include_is_reported()
{
	let (out, errors) = process_with_errors("#include foo\nok");
	assert_eq!(out, "ok");
	assert_eq!(errors, vec![ ErrorKind::InvalidIncludeDirective ]);
}

// ---
// Configuration and host surfaces
// ---

#[test]
fn user_defines_seed_the_table()
{
	init_logging();
	let options = Options {
		user_defines: vec![ MacroDesc {
			name: "DEBUG".to_string(),
			params: None,
			body: vec![ number_token("1") ],
			} ],
		.. Options::default()
		};
	let out = crate::process_str("#ifdef DEBUG\nyes\n#endif\nDEBUG", options);
	assert_eq!(out, "yes\n1");
}

#[test]
fn symbol_table_reflects_the_run()
{
	init_logging();
	let lexer = Lexer::new(Box::new(StringInputStream::new("#define A 1\n#define B 2\n#undef A\n")));
	let mut pp = Preprocessor::new(lexer, Options {
		user_defines: vec![ MacroDesc {
			name: "SEED".to_string(),
			params: None,
			body: vec![ number_token("7") ],
			} ],
		.. Options::default()
		});
	let _ = pp.process();
	let table = pp.symbol_table();
	assert!( table.contains_key("SEED") );
	assert!( table.contains_key("B") );
	assert!( table.contains_key("__LINE__") );
	assert!( !table.contains_key("A") );
}

#[test]
fn custom_directive_handler_splices_its_result()
{
	init_logging();
	let lexer = Lexer::new(Box::new(StringInputStream::new("#version 450\nmain")));
	let mut pp = Preprocessor::new(lexer, Options::default());
	let registered = pp.add_custom_directive("version", Box::new(|pp: &mut Preprocessor, _current: &str| {
		let mut text = String::from("#version");
		loop
		{
			let tok = pp.lexer_mut().next_token();
			match tok.kind
			{
			TokenKind::Newline | TokenKind::End => {
				text.push('\n');
				break;
				},
			_ => text.push_str(&tok.raw),
			}
		}
		text
	}));
	assert!(registered);
	assert_eq!(pp.process(), "#version 450\nmain");
}

#[test]
fn unhandled_custom_directive_is_reported()
{
	init_logging();
	let errors = Rc::new(RefCell::new(Vec::new()));
	let sink = errors.clone();
	let lexer = Lexer::new(Box::new(StringInputStream::new("#pragma once\n")));
	let mut pp = Preprocessor::new(lexer, Options {
		on_error: Some(Box::new(move |e: ErrorInfo| sink.borrow_mut().push(e.kind))),
		.. Options::default()
		});
	pp.lexer_mut().add_custom_directive("pragma");
	let out = pp.process();
	assert_eq!(out, " once\n");
	assert_eq!(&*errors.borrow(), &[ ErrorKind::UndefinedDirective ]);
}

// ---
// Logical lines
// ---

#[test]
fn continuations_form_one_logical_line()
{
	assert_eq!(process("AB\\\nCD"), "ABCD");
	assert_eq!(process("#define FOO a\\\nb\nFOO"), "ab");
}

#[test]
fn crlf_sources_work()
{
	assert_eq!(process("#define A 1\r\nA"), "1");
}

// vim: ft=rust

use super::ir::*;
use super::lexer::*;
use super::parser::*;
use sraa::cfg::{CfgBlock, ControlFlowGraph};
use utils::DiagnosticEmitter;

fn parse_string(source: &str) -> Result<Unit, String> {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    let lexer = Lexer::new(source, &mut diag);
    let tokens = lexer.lex_all();
    let parser = Parser::new(tokens, &mut diag);
    let Some(unit) = parser.parse() else {
        return Err(diag.out_buffer().unwrap_or_default() + &diag.err_buffer().unwrap_or_default());
    };
    Ok(unit)
}

fn parse_error(source: &str) -> String {
    match parse_string(source) {
        Ok(unit) => panic!("expected an error, parsed:\n{}", print(&unit)),
        Err(output) => output,
    }
}

#[test]
fn parse_empty() {
    let unit = parse_string("").expect("empty input is a valid unit");
    assert!(unit.functions.is_empty());
    assert_eq!(print(&unit), "");
}

#[test]
fn parse_single_function() -> Result<(), String> {
    let source = r"@main {
  v: i32 = const 5;
  ret;
}
";
    let expected = r#"digraph "@main" {
  Node_0[label="v: i32 = const 5;\nret;"]

}
"#;
    let unit = parse_string(source)?;
    let printed = print(&unit);
    assert_eq!(printed, source);
    let printed_dot = print_dot(&unit);
    assert_eq!(printed_dot, expected);

    Ok(())
}

#[test]
fn parse_declarations_and_loops() -> Result<(), String> {
    let source = r"global @table: [i32; 16];
global @rec: {i8, <i32; 4>, ptr<i8>};
extern @malloc(n: i64): ptr<i8>;
extern @tick;

@sum(p: ptr<i32>, n: i32): i32 {
  zero: i32 = const 0;
  jmp .head;

.head:
  i: i32 = phi zero next;
  c: bool = lt i n;
  br c .body .exit;

.body:
  it: i32 = sigma i;
  q: ptr<i32> = gep p it;
  v: i32 = load q;
  store q v;
  one: i32 = const 1;
  next: i32 = add it one;
  jmp .head;

.exit:
  ret zero;
}

@main {
  sixteen: i32 = const 16;
  t: ptr<i32> = cast @table;
  s: i32 = call @sum t sixteen;
  call @tick;
  size: i64 = const 8;
  m: ptr<i8> = call @malloc size;
  r: ptr<i8> = realloc m size;
  a: ptr<i64> = alloc size;
  nop;
  ret;
}
";
    let unit = parse_string(source)?;
    assert_eq!(print(&unit), source);
    assert_eq!(unit.globals.len(), 2);
    assert_eq!(unit.externs.len(), 2);
    assert_eq!(unit.functions.len(), 2);

    let sum = &unit.functions[0];
    assert_eq!(sum.blocks().len(), 4);
    assert_eq!(sum.blocks()[1].predecessors(), &[0, 2]);
    assert_eq!(sum.blocks()[1].successors(), &[2, 3]);
    assert_eq!(*sum.get_return_type(), Type::Int(32));
    let head = unit.identifiers.lookup(".head").expect("label is interned");
    assert_eq!(sum.block_of(head), Some(1));

    let rec = unit.identifiers.lookup("@rec").expect("global is interned");
    assert_eq!(
        unit.global(rec).map(|g| g.ty.clone()),
        Some(Type::Struct(vec![
            Type::Int(8),
            Type::Vector(Box::new(Type::Int(32)), 4),
            Type::Ptr(Box::new(Type::Int(8))),
        ]))
    );
    Ok(())
}

#[test]
fn parse_branches() -> Result<(), String> {
    let source = r"@main(c: bool) {
  br c .a .b;

.a:
  jmp .b;

.b:
  ret;
}
";
    let expected = r#"digraph "@main" {
  Node_0[label="br c .a .b;"]
  Node_1[label="jmp .b;"]
  Node_2[label="ret;"]

  Node_0 -> Node_1
  Node_0 -> Node_2
  Node_1 -> Node_2
}
"#;
    let unit = parse_string(source)?;
    assert_eq!(print(&unit), source);
    assert_eq!(print_dot(&unit), expected);
    Ok(())
}

#[test]
fn leading_label_names_the_entry() -> Result<(), String> {
    let source = r"@main {
.entry:
  ret;
}
";
    let unit = parse_string(source)?;
    assert_eq!(unit.functions[0].blocks().len(), 1);
    assert_eq!(print(&unit), source);
    Ok(())
}

#[test]
fn comparisons_are_classified() {
    assert!(is_comparison(TokenValue::LessThan));
    assert!(is_comparison(TokenValue::NotEqual));
    assert!(!is_comparison(TokenValue::Add));
    assert!(!is_comparison(TokenValue::Sigma));
}

#[test]
fn lexer_errors_stop_parsing() {
    assert_eq!(parse_error("|"), "[line 1] Error : Unexpected token: '|'.\n");
}

#[test]
fn syntax_errors() {
    assert_eq!(
        parse_error("@main {\n  ret\n}\n"),
        "[line 3] Error at '}': Identifier expected.\n"
    );
    assert_eq!(
        parse_error("@main {\n  jmp .nowhere;\n}\n"),
        "[line 2] Error at 'jmp': Undefined label '.nowhere'.\n"
    );
    assert_eq!(
        parse_error("@f {\n  ret;\n}\n@f {\n  ret;\n}\n"),
        "[line 4] Error at 'global_0': Redefinition of '@f'.\n"
    );
}

#[test]
fn block_errors() {
    assert_eq!(
        parse_error("@main {\n  ret;\n  nop;\n}\n"),
        "[line 3] Error at 'nop': Block terminator expected to be jmp, br, or ret.\n"
    );
    assert_eq!(
        parse_error("@main {\n  jmp .a;\n\n.a:\n}\n"),
        "[line 1] Error at 'global_0': Blocks must not be empty.\n"
    );
}

#[test]
fn type_errors() {
    assert_eq!(
        parse_error("@main {\n  v: i32 = add a a;\n  ret;\n}\n"),
        "[line 2] Error at 'add': Undefined name 'a'.\n"
    );
    assert_eq!(
        parse_error(
            "@main {\n  a: i32 = const 1;\n  b: i64 = const 2;\n  c: i32 = add a b;\n  ret;\n}\n"
        ),
        "[line 4] Error at 'add': 'i32' type expected; 'i64' found\n"
    );
    assert_eq!(
        parse_error("@f(x: i32) {\n  ret;\n}\n\n@main {\n  a: i32 = const 1;\n  call @f a a;\n  ret;\n}\n"),
        "[line 7] Error at 'call': At most 1 arguments expected, got 2\n"
    );
}

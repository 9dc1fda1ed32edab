use crate::*;

fn opts(args: &[&str]) -> Opt {
    Opt::parse_from(["pir-driver", "input.pir"].iter().chain(args))
}

fn run_driver(source: &str, opts: Opt) -> Option<String> {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    process_source(source, &mut diag, &opts)?;
    Some(diag.out_buffer().unwrap() + &diag.err_buffer().unwrap())
}

fn failure_output(source: &str, opts: Opt) -> String {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    assert!(process_source(source, &mut diag, &opts).is_none());
    diag.out_buffer().unwrap() + &diag.err_buffer().unwrap()
}

const FIELDS: &str = r"@f(p: ptr<i32>) {
  two: i32 = const 2;
  five: i32 = const 5;
  x: ptr<i32> = gep p two;
  y: ptr<i32> = gep p five;
  ret;
}
";

#[test]
fn all_pairs_by_default() {
    let expected = "@f.p, @f.x: NoAlias\n@f.p, @f.y: NoAlias\n@f.x, @f.y: NoAlias\n";
    let output = run_driver(FIELDS, opts(&[])).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn queries() {
    let output = run_driver(
        FIELDS,
        opts(&["--query", "@f.x,@f.y", "--query", "@f.x, @f.x"]),
    )
    .unwrap();
    assert_eq!(output, "@f.x, @f.y: NoAlias\n@f.x, @f.x: MustAlias\n");

    let output = run_driver(FIELDS, opts(&["--query", "@f.x,@f.y", "--all-pairs"])).unwrap();
    assert_eq!(
        output,
        "@f.x, @f.y: NoAlias\n@f.p, @f.x: NoAlias\n@f.p, @f.y: NoAlias\n@f.x, @f.y: NoAlias\n"
    );
}

#[test]
fn bad_queries() {
    assert_eq!(
        failure_output(FIELDS, opts(&["--query", "@f.x,@f.q"])),
        "Unknown value '@f.q'.\n"
    );
    assert_eq!(
        failure_output(FIELDS, opts(&["--query", "@f.x"])),
        "Malformed query '@f.x', expected 'a,b'.\n"
    );
}

#[test]
fn toggles_reach_the_analysis() {
    let all_off = opts(&["--no-local-tree", "--no-strict-order", "--no-provenance"]);
    let config = all_off.config();
    assert!(!config.local_tree && !config.strict_order && !config.provenance);
    assert!(config.graph_constraints && config.apart_allocations);

    let output = run_driver(FIELDS, opts(&["--no-local-tree", "--no-strict-order", "--no-provenance", "--query", "@f.x,@f.y"])).unwrap();
    assert_eq!(output, "@f.x, @f.y: MayAlias\n");

    let defaults = opts(&[]);
    assert_eq!(defaults.config(), Config::default());
    assert_eq!(defaults.widening_delay, 2);
    assert_eq!(opts(&["--widening-delay", "5"]).widening_delay, 5);
}

#[test]
fn parse_failures() {
    let output = failure_output("@main {\n  ret\n}\n", opts(&[]));
    assert_eq!(output, "[line 3] Error at '}': Identifier expected.\n");
}

#[test]
fn cfg_dump() {
    let source = r"@main {
  v: i32 = const 5;
  ret;
}
";
    let expected = r#"digraph "@main" {
  Node_0[label="v: i32 = const 5;\nret;"]

}

"#;
    let output = run_driver(source, opts(&["--dump-cfg"])).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn ranges_dump() {
    let expected = r"@f(p: ptr<i32>) {
  two: i32 = const 2; /* two: [2, 2] */
  five: i32 = const 5; /* five: [5, 5] */
  x: ptr<i32> = gep p two;
  y: ptr<i32> = gep p five;
  ret;
}
";
    let output = run_driver(FIELDS, opts(&["--dump-ranges", "--query", "@f.x,@f.y"])).unwrap();
    assert_eq!(output, expected.to_owned() + "@f.x, @f.y: NoAlias\n");
}

#[test]
fn analysis_dumps() {
    let output = run_driver(FIELDS, opts(&["--dump-constraints", "--query", "@f.p,@f.p"])).unwrap();
    assert!(output.starts_with("Constraints:\n"));
    assert!(output.ends_with("@f.p, @f.p: MustAlias\n"));

    let output = run_driver(FIELDS, opts(&["--dump-relations", "--query", "@f.p,@f.p"])).unwrap();
    assert!(output.starts_with("Variable: "));

    let output = run_driver(FIELDS, opts(&["--dump-graph", "--query", "@f.p,@f.p"])).unwrap();
    assert!(output.starts_with("digraph DepGraph {\n"));
}

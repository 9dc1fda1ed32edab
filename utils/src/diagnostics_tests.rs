use crate::DiagnosticEmitter;

#[test]
fn buffers_keep_streams_apart() {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    diag.out_ln("result");
    diag.error(3, "Something is off.");
    diag.report(4, "at 'x'", "Another one.");
    assert_eq!(diag.out_buffer().as_deref(), Some("result\n"));
    assert_eq!(
        diag.err_buffer().as_deref(),
        Some("[line 3] Error : Something is off.\n[line 4] Error at 'x': Another one.\n")
    );
}

#[test]
fn writers_are_not_logged() {
    let diag = DiagnosticEmitter::new(Box::new(Vec::new()), Box::new(Vec::new()));
    assert_eq!(diag.out_buffer(), None);
    assert_eq!(diag.err_buffer(), None);
}

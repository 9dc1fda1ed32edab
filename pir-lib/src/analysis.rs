pub mod range_analysis;


#[cfg(test)]
pub(crate) mod test_utils {
    use utils::DiagnosticEmitter;

    use super::range_analysis::{RangeAnalysis, DEFAULT_WIDENING_DELAY};
    use crate::{ir::Unit, lexer::Lexer, lower::lower, parser::Parser};

    pub fn parse_string(source: &str) -> Unit {
        let mut diag = DiagnosticEmitter::log_to_buffer();
        let lexed = Lexer::new(source, &mut diag).lex_all();
        let parsed = Parser::new(lexed, &mut diag).parse();
        match parsed {
            Some(unit) => unit,
            None => panic!(
                "failed to parse test input:\n{}",
                diag.err_buffer().unwrap_or_default()
            ),
        }
    }

    pub fn check_expected_results(source: &str, expected: &str) {
        let unit = parse_string(source);
        let lowered = lower(&unit);
        let ranges = RangeAnalysis::run(&unit, &lowered, DEFAULT_WIDENING_DELAY);
        assert_eq!(ranges.annotate(&unit, &lowered), expected);
    }
}

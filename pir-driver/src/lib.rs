use clap::Parser as CommandLineParser;
use itertools::Itertools;
use log::debug;
use pir_lib::{
    analysis::range_analysis::{DEFAULT_WIDENING_DELAY, RangeAnalysis},
    ir::print_dot,
    lexer::Lexer,
    lower::{Lowered, lower},
    parser::Parser,
};
use sraa::{AliasAnalysis, Config, StrictRelations, program::ValueId};
use utils::DiagnosticEmitter;

#[derive(Debug, CommandLineParser)]
#[command(
    name = "pir",
    version,
    about = "Run the strict relations alias analysis on PIR programs."
)]
pub struct Opt {
    /// Dump the control flow graph representation of the program in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Print the program with the range of every integer value.
    #[arg(long)]
    pub dump_ranges: bool,

    /// Print the constraints collected from the program.
    #[arg(long)]
    pub dump_constraints: bool,

    /// Print the LT/GT/SA sets of every variable after solving.
    #[arg(long)]
    pub dump_relations: bool,

    /// Dump the pointer dependency graph in graphviz format.
    #[arg(long)]
    pub dump_graph: bool,

    /// Pair of qualified value names to query, e.g. `@f.p,@f.q`.
    #[arg(long, value_name = "A,B")]
    pub query: Vec<String>,

    /// Query every pair of pointer values inside each function. This is
    /// the default without `--query`.
    #[arg(long)]
    pub all_pairs: bool,

    /// Do not use divergence in the local tree.
    #[arg(long)]
    pub no_local_tree: bool,

    /// Do not use the strict order between pointers.
    #[arg(long)]
    pub no_strict_order: bool,

    /// Do not use allocation provenance.
    #[arg(long)]
    pub no_provenance: bool,

    /// Skip the second solver pass seeded from the dependency graph.
    #[arg(long)]
    pub no_graph_constraints: bool,

    /// Do not mark distinct allocation sites as strictly apart.
    #[arg(long)]
    pub no_apart_allocations: bool,

    /// How often a merge may grow before the range analysis widens it.
    #[arg(long, default_value_t = DEFAULT_WIDENING_DELAY)]
    pub widening_delay: usize,

    /// Log the phases of the analysis.
    #[arg(long, short)]
    pub verbose: bool,

    /// File containing the program written in the language.
    pub filename: String,
}

impl Opt {
    pub fn config(&self) -> Config {
        Config {
            local_tree: !self.no_local_tree,
            strict_order: !self.no_strict_order,
            provenance: !self.no_provenance,
            graph_constraints: !self.no_graph_constraints,
            apart_allocations: !self.no_apart_allocations,
        }
    }
}

fn resolve(lowered: &Lowered, diag: &mut DiagnosticEmitter, name: &str) -> Option<ValueId> {
    let value = lowered.find(name);
    if value.is_none() {
        diag.err_ln(&format!("Unknown value '{name}'."));
    }
    value
}

/// Pointer parameters and pointer results of each function, in order.
fn pointer_values(lowered: &Lowered) -> Vec<Vec<ValueId>> {
    let module = &lowered.module;
    module
        .functions()
        .iter()
        .map(|func| {
            func.params
                .iter()
                .copied()
                .chain(func.instructions.iter().filter_map(|inst| inst.result()))
                .filter(|value| module.is_pointer(*value))
                .collect()
        })
        .collect()
}

pub fn process_source(src: &str, diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let lexer = Lexer::new(src, diag);
    let tokens = lexer.lex_all();
    let parser = Parser::new(tokens, diag);
    let unit = parser.parse()?;

    if opts.dump_cfg {
        diag.out_ln(&print_dot(&unit));
    }

    let lowered = lower(&unit);
    let ranges = RangeAnalysis::run(&unit, &lowered, opts.widening_delay);
    if opts.dump_ranges {
        diag.out(&ranges.annotate(&unit, &lowered));
    }

    debug!("running the alias analysis with {:?}", opts.config());
    let analysis = StrictRelations::run(&lowered.module, &ranges, opts.config());
    if opts.dump_constraints {
        diag.out(&analysis.print_constraints());
    }
    if opts.dump_relations {
        diag.out(&analysis.print_relations());
    }
    if opts.dump_graph {
        diag.out(&analysis.print_graph());
    }

    let module = &lowered.module;
    for query in &opts.query {
        let Some((a, b)) = query.split_once(',') else {
            diag.err_ln(&format!("Malformed query '{query}', expected 'a,b'."));
            return None;
        };
        let a = resolve(&lowered, diag, a.trim())?;
        let b = resolve(&lowered, diag, b.trim())?;
        diag.out_ln(&format!(
            "{}, {}: {}",
            module.value_name(a),
            module.value_name(b),
            analysis.alias(a, b)
        ));
    }

    if opts.query.is_empty() || opts.all_pairs {
        for values in pointer_values(&lowered) {
            for (a, b) in values.into_iter().tuple_combinations() {
                diag.out_ln(&format!(
                    "{}, {}: {}",
                    module.value_name(a),
                    module.value_name(b),
                    analysis.alias(a, b)
                ));
            }
        }
    }

    Some(())
}

#[cfg(test)]
mod driver_tests;

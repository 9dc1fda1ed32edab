use super::constraints::{Constraint, RelationStore};
use super::domains::Range;
use super::facts::*;
use super::layout::Primitives;
use super::program::*;
use super::solvers::WorkList;
use super::test_utils::Builder;

/// Collect the facts of `module` and render them.
fn collect(module: &Module, oracle: &dyn RangeOracle) -> (String, Vec<Constraint>) {
    let mut store = RelationStore::default();
    let mut worklist = WorkList::default();
    let mut primitives = Primitives::default();
    FactCollector::new(module, oracle, &mut store, &mut worklist, &mut primitives).collect();
    let printed = worklist
        .constraints()
        .iter()
        .map(|c| c.print(&store, module))
        .collect::<Vec<_>>()
        .join("\n");
    (printed, worklist.constraints().to_vec())
}

#[test]
fn sign_classification() {
    assert_eq!(Sign::from(Range::zero()), Sign::Zero);
    assert_eq!(Sign::from(Range::new(1, 4)), Sign::Positive);
    assert_eq!(Sign::from(Range::new(0, 4)), Sign::NonNegative);
    assert_eq!(Sign::from(Range::new(-4, -1)), Sign::Negative);
    assert_eq!(Sign::from(Range::new(-4, 0)), Sign::NonPositive);
    assert_eq!(Sign::from(Range::new(-4, 4)), Sign::Unknown);
    assert_eq!(Sign::from(Range::unknown()), Sign::Unknown);
}

#[test]
fn additions() {
    let mut b = Builder::new();
    let f = b.function("f", vec![]);
    let names = ["x", "pos", "nonneg", "neg", "nonpos", "zero"];
    let v: Vec<_> = names.iter().map(|n| b.int_value(n)).collect();
    let results: Vec<_> = ["a", "b", "c", "d", "e"]
        .iter()
        .zip(&v[1..])
        .map(|(name, operand)| {
            let result = b.int_value(name);
            b.push(
                f,
                Instruction::Add {
                    result,
                    lhs: v[0],
                    rhs: *operand,
                },
            );
            result
        })
        .collect();
    assert_eq!(results.len(), 5);

    let oracle = MapOracle::new(&b.module)
        .with_range(v[1], Range::new(1, 10))
        .with_range(v[2], Range::new(0, 10))
        .with_range(v[3], Range::new(-10, -1))
        .with_range(v[4], Range::new(-10, 0))
        .with_range(v[5], Range::zero());
    let (printed, _) = collect(&b.module, &oracle);
    let expected = "x < a
x <= b
c < x
d <= x
e == x";
    assert_eq!(printed, expected);
}

#[test]
fn subtractions() {
    let mut b = Builder::new();
    let f = b.function("f", vec![]);
    let x = b.int_value("x");
    let y = b.int_value("y");
    let a = b.int_value("a");
    b.push(
        f,
        Instruction::Sub {
            result: a,
            lhs: x,
            rhs: y,
        },
    );

    // x > 0 and y < 0: a lies above both.
    let oracle = MapOracle::new(&b.module)
        .with_range(x, Range::new(1, 5))
        .with_range(y, Range::new(-5, -1));
    let (printed, _) = collect(&b.module, &oracle);
    assert_eq!(printed, "x < a\ny < a");

    // x unknown, y >= 0: only a <= x.
    let oracle = MapOracle::new(&b.module).with_range(y, Range::new(0, 5));
    let (printed, _) = collect(&b.module, &oracle);
    assert_eq!(printed, "a <= x");

    // x == 0: a = -y.
    let oracle = MapOracle::new(&b.module)
        .with_range(x, Range::zero())
        .with_range(y, Range::new(2, 5));
    let (printed, _) = collect(&b.module, &oracle);
    assert_eq!(printed, "a < x\na < y");
}

#[test]
fn index_and_cast() {
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let ptr = b.ptr(record);
    let p = b.value("p", ptr);
    let f = b.function("f", vec![p]);
    let q = b.index(f, "q", p, &[1]);
    let r = b.index(f, "r", p, &[-1]);
    b.index(f, "s", p, &[0]);
    let t = b.value("t", ptr);
    b.push(f, Instruction::Cast { result: t, source: q });
    let i = b.int_value("i");
    let u = b.value("u", ptr);
    b.push(
        f,
        Instruction::Index {
            result: u,
            base: r,
            indices: vec![i],
        },
    );

    let oracle = MapOracle::new(&b.module).with_range(i, Range::new(0, 3));
    let mut store = RelationStore::default();
    let mut worklist = WorkList::default();
    let mut primitives = Primitives::default();
    let accesses =
        FactCollector::new(&b.module, &oracle, &mut store, &mut worklist, &mut primitives)
            .collect();
    let printed: Vec<_> = worklist
        .constraints()
        .iter()
        .map(|c| c.print(&store, &b.module))
        .collect();
    assert_eq!(printed, vec!["p < q", "r < p", "s == p", "t == q", "r <= u"]);

    assert_eq!(accesses[&q].offset, Range::from(4));
    assert_eq!(accesses[&r].offset, Range::from(-4));
    assert_eq!(accesses[&u].offset, Range::new(0, 12));
    assert_eq!(accesses[&u].base, r);
    assert_eq!(accesses[&u].pointee, Some(record));
}

fn split(
    b: &mut Builder,
    f: FunctionId,
    name: &str,
    operand: ValueId,
    origin: SplitOrigin,
) -> ValueId {
    let result = b.int_value(name);
    b.push(
        f,
        Instruction::CaseSplit {
            result,
            operand,
            origin: Ok(origin),
        },
    );
    result
}

#[test]
fn case_splits_of_a_comparison() {
    // c = i < n; the true branch splits both, the false branch only i.
    let mut b = Builder::new();
    let f = b.function("f", vec![]);
    let i = b.int_value("i");
    let n = b.int_value("n");
    let c = b.int_value("c");
    let origin = SplitOrigin {
        comparison: c,
        predicate: Predicate::Lt,
        lhs: i,
        rhs: n,
        taken: true,
    };
    split(&mut b, f, "i_t", i, origin);
    split(&mut b, f, "n_t", n, origin);
    split(
        &mut b,
        f,
        "i_f",
        i,
        SplitOrigin {
            taken: false,
            ..origin
        },
    );

    let oracle = MapOracle::new(&b.module);
    let (printed, _) = collect(&b.module, &oracle);
    let expected = "i_t = i
n_t = n
i_f = i
i_t < n_t
n <= i_f";
    assert_eq!(printed, expected);
}

#[test]
fn case_split_predicates() {
    let cases = [
        (Predicate::Gt, "b_t < a_t\na_f <= b_f"),
        (Predicate::Ge, "b_t <= a_t\na_f < b_f"),
        (Predicate::Le, "a_t <= b_t\nb_f < a_f"),
        (Predicate::Eq, "a_t == b_t"),
        (Predicate::Ne, "a_f == b_f"),
    ];
    for (predicate, expected) in cases {
        let mut b = Builder::new();
        let f = b.function("f", vec![]);
        let x = b.int_value("a");
        let y = b.int_value("b");
        let c = b.int_value("c");
        let origin = SplitOrigin {
            comparison: c,
            predicate,
            lhs: x,
            rhs: y,
            taken: true,
        };
        let not_taken = SplitOrigin {
            taken: false,
            ..origin
        };
        split(&mut b, f, "a_t", x, origin);
        split(&mut b, f, "b_t", y, origin);
        split(&mut b, f, "a_f", x, not_taken);
        split(&mut b, f, "b_f", y, not_taken);

        let oracle = MapOracle::new(&b.module);
        let (printed, _) = collect(&b.module, &oracle);
        let order_facts: Vec<_> = printed.lines().skip(4).collect();
        assert_eq!(order_facts.join("\n"), expected, "{predicate}");
    }
}

#[test]
fn malformed_splits_emit_nothing() {
    let mut b = Builder::new();
    let f = b.function("f", vec![]);
    let i = b.int_value("i");
    let s = b.int_value("s");
    b.push(
        f,
        Instruction::CaseSplit {
            result: s,
            operand: i,
            origin: Err(MalformedSplit::UnconditionalBranch),
        },
    );
    let oracle = MapOracle::new(&b.module);
    let (printed, constraints) = collect(&b.module, &oracle);
    assert!(constraints.is_empty(), "{printed}");
}

#[test]
fn merges() {
    let mut b = Builder::new();
    let f = b.function("f", vec![]);
    let x = b.int_value("x");
    let y = b.int_value("y");
    let m = b.int_value("m");
    b.push(
        f,
        Instruction::Merge {
            result: m,
            incoming: vec![x, y],
        },
    );
    let oracle = MapOracle::new(&b.module);
    let (printed, _) = collect(&b.module, &oracle);
    assert_eq!(printed, "m = o| x; y;");
}

use super::Config;
use super::alias::{AliasAnalysis, AliasResult, StrictRelations};
use super::domains::{INF, NEG_INF, Range};
use super::layout::*;
use super::program::*;
use super::test_utils::Builder;

#[test]
fn unit_counts() {
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let records = b.array(record, 10);
    let ptr = b.ptr(records);
    let opaque = b.module.types.intern(TypeKind::Opaque);
    let bool_ty = b.module.types.scalar(1);
    let empty = b.module.types.scalar(0);

    let mut primitives = Primitives::default();
    let types = &b.module.types;
    assert_eq!(primitives.num_units(types, record), 4);
    assert_eq!(primitives.num_units(types, records), 40);
    assert_eq!(primitives.num_units(types, ptr), 1);
    assert_eq!(primitives.num_units(types, opaque), 1);
    assert_eq!(primitives.num_units(types, bool_ty), 1);
    assert_eq!(primitives.num_units(types, empty), 1);
    assert_eq!(primitives.num_units(types, b.int), 64);

    assert_eq!(primitives.layout(types, record), Layout::Fields(vec![1, 3]));
    assert_eq!(
        primitives.layout(types, records),
        Layout::Uniform { units: 4, len: 10 }
    );
    assert_eq!(primitives.layout(types, ptr), Layout::Fields(vec![1]));
}

#[test]
fn sum_behind_clamps() {
    let layout = [1, 3, 4];
    assert_eq!(sum_behind(&layout, 0), 0);
    assert_eq!(sum_behind(&layout, 1), 1);
    assert_eq!(sum_behind(&layout, 2), 4);
    assert_eq!(sum_behind(&layout, 7), 8);
    assert_eq!(sum_behind(&layout, -2), 0);
    assert_eq!(sum_behind(&layout, INF), 8);
    assert_eq!(sum_behind(&layout, NEG_INF), 0);

    let uniform = Layout::Uniform { units: 4, len: 10 };
    assert_eq!(uniform.sum_behind(3), 12);
    assert_eq!(uniform.sum_behind(12), 40);
    assert_eq!(uniform.sum_behind(-1), 0);
    assert_eq!(uniform.sum_behind(INF), 40);
    assert_eq!(uniform.sum_behind(NEG_INF), 0);
    assert_eq!(Layout::Fields(layout.to_vec()).sum_behind(2), 4);
}

#[test]
fn huge_arrays_are_not_materialized() {
    // p: ptr<[i8; 2^40]>, x = p[0][5]
    let mut b = Builder::new();
    let byte = b.module.types.scalar(8);
    let bytes = b.array(byte, 1 << 40);
    let ptr = b.ptr(bytes);
    let p = b.value("p", ptr);
    let i = b.int_value("i");
    let indices = vec![b.constant(0), b.constant(5)];

    let oracle = MapOracle::new(&b.module).with_range(i, Range::new(0, INF));
    let mut primitives = Primitives::default();
    assert_eq!(
        primitives.layout(&b.module.types, bytes),
        Layout::Uniform {
            units: 8,
            len: 1 << 40
        }
    );
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &indices),
        Range::from(40)
    );
    let zero = indices[0];
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &[zero, i]),
        Range::new(0, 8 << 40)
    );

    let f = b.function("f", vec![p]);
    let x = b.index(f, "x", p, &[0, 5]);
    let oracle = MapOracle::new(&b.module);
    let analysis = StrictRelations::run(&b.module, &oracle, Config::default());
    assert_eq!(analysis.alias(p, x), AliasResult::NoAlias);
}

#[test]
fn constant_index_offsets_are_exact() {
    // p: ptr<[{i1, [i1; 3]}; 10]>, q = p[0][3][1]
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let records = b.array(record, 10);
    let ptr = b.ptr(records);
    let p = b.value("p", ptr);
    let indices = vec![b.constant(0), b.constant(3), b.constant(1)];

    let oracle = MapOracle::new(&b.module);
    let mut primitives = Primitives::default();
    let offset = primitives.index_offset(&b.module, &oracle, p, &indices);
    assert_eq!(offset, Range::from(13));
}

#[test]
fn first_index_steps_over_whole_pointees() {
    // p: ptr<{i1, [i1; 3]}>, q = p[3][1]
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let ptr = b.ptr(record);
    let p = b.value("p", ptr);
    let indices = vec![b.constant(3), b.constant(1)];

    let oracle = MapOracle::new(&b.module);
    let mut primitives = Primitives::default();
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &indices),
        Range::from(13)
    );
}

#[test]
fn variable_indices_use_the_oracle() {
    let mut b = Builder::new();
    let record = b.four_unit_struct();
    let records = b.array(record, 10);
    let ptr = b.ptr(records);
    let p = b.value("p", ptr);
    let i = b.int_value("i");
    let n = b.int_value("n");
    let zero = b.constant(0);
    let one = b.constant(1);

    let oracle = MapOracle::new(&b.module)
        .with_range(i, Range::new(2, 4))
        .with_range(n, Range::new(0, INF));
    let mut primitives = Primitives::default();

    // p[i] scales by the 40 units of the array.
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &[i]),
        Range::new(80, 160)
    );
    // p[n] keeps the unbounded side.
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &[n]),
        Range::new(0, INF)
    );
    // p[0][i] adds sum_behind at both bounds, then p[0][i][1] descends into
    // the element type.
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &[zero, i]),
        Range::new(8, 16)
    );
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &[zero, i, one]),
        Range::new(9, 17)
    );
}

#[test]
fn indexing_into_scalars_is_unknown() {
    let mut b = Builder::new();
    let int = b.int;
    let ptr = b.ptr(int);
    let p = b.value("p", ptr);
    let indices = vec![b.constant(0), b.constant(0), b.constant(1)];
    let oracle = MapOracle::new(&b.module);
    let mut primitives = Primitives::default();
    assert_eq!(
        primitives.index_offset(&b.module, &oracle, p, &indices),
        Range::unknown()
    );
}

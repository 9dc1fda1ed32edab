use std::collections::HashMap;

use crate::domains::{INF, NEG_INF, Range};
use crate::program::{Module, RangeOracle, TypeId, TypeKind, TypeTable, ValueId};

/// Unit counts of the fields or elements of a type. Arrays and vectors
/// repeat one element, so they keep only its size and the length.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Layout {
    Uniform { units: i64, len: i64 },
    Fields(Vec<i64>),
}

impl Layout {
    /// Units in front of position `index`, clamped to the layout.
    pub fn sum_behind(&self, index: i64) -> i64 {
        match self {
            Layout::Uniform { units, len } => {
                let end = match index {
                    NEG_INF => 0,
                    INF => *len,
                    _ => index.clamp(0, *len),
                };
                units.saturating_mul(end)
            }
            Layout::Fields(fields) => sum_behind(fields, index),
        }
    }
}

/// Memoized unit counts of types. A unit is the smallest piece of memory
/// the analysis tells apart: scalars contribute one unit per bit, pointers
/// and opaque values a single unit.
#[derive(Default, Debug)]
pub struct Primitives {
    units: HashMap<TypeId, i64>,
    layouts: HashMap<TypeId, Layout>,
}

impl Primitives {
    /// Number of units a value of type `ty` occupies.
    pub fn num_units(&mut self, types: &TypeTable, ty: TypeId) -> i64 {
        if let Some(&units) = self.units.get(&ty) {
            return units;
        }
        let units = match types.kind(ty) {
            TypeKind::Scalar { bits } => i64::from(*bits).max(1),
            TypeKind::Pointer(_) | TypeKind::Opaque => 1,
            TypeKind::Array { element, len } | TypeKind::Vector { element, len } => {
                let (element, len) = (*element, *len);
                self.num_units(types, element)
                    .saturating_mul(i64::try_from(len).unwrap_or(i64::MAX))
            }
            TypeKind::Struct(fields) => fields.iter().fold(0i64, |acc, field| {
                acc.saturating_add(self.num_units(types, *field))
            }),
        };
        self.units.insert(ty, units);
        units
    }

    /// Unit count of each field or element of `ty`, in order. Types that
    /// are not aggregates have a single entry of one unit.
    pub fn layout(&mut self, types: &TypeTable, ty: TypeId) -> Layout {
        if let Some(layout) = self.layouts.get(&ty) {
            return layout.clone();
        }
        let layout = match types.kind(ty) {
            TypeKind::Array { element, len } | TypeKind::Vector { element, len } => {
                let (element, len) = (*element, *len);
                Layout::Uniform {
                    units: self.num_units(types, element),
                    len: i64::try_from(len).unwrap_or(i64::MAX),
                }
            }
            TypeKind::Struct(fields) => Layout::Fields(
                fields
                    .iter()
                    .map(|field| self.num_units(types, *field))
                    .collect(),
            ),
            _ => Layout::Fields(vec![1]),
        };
        self.layouts.insert(ty, layout.clone());
        layout
    }

    /// Offset range of an index computation `base[indices[0]][indices[1]]...`
    /// in units, relative to the address held by `base`.
    pub fn index_offset(
        &mut self,
        module: &Module,
        oracle: &dyn RangeOracle,
        base: ValueId,
        indices: &[ValueId],
    ) -> Range {
        let Some((first, rest)) = indices.split_first() else {
            return Range::zero();
        };
        let mut ty = module.value_type(base);
        let Some(pointee) = module.types.pointee(ty) else {
            return Range::unknown();
        };
        let stride = self.num_units(&module.types, pointee);
        let mut offset = match module.constant(*first) {
            Some(c) => Range::from(c).scale(stride),
            None => oracle.range(*first).scale(stride),
        };

        let mut last_index = 0;
        for idx in rest {
            let Some(inner) = type_inside(&module.types, ty, last_index) else {
                return Range::unknown();
            };
            ty = inner;
            let layout = self.layout(&module.types, ty);
            match module.constant(*idx) {
                Some(c) => {
                    offset = offset + Range::from(layout.sum_behind(c));
                    last_index = c;
                }
                None => {
                    let bounds = oracle.range(*idx);
                    offset = offset
                        + Range::new(
                            layout.sum_behind(bounds.lower),
                            layout.sum_behind(bounds.upper),
                        );
                    last_index = 0;
                }
            }
        }
        offset
    }
}

/// Sum of the layout entries strictly before position `index`. Indices
/// outside the layout are clamped to its bounds.
pub fn sum_behind(layout: &[i64], index: i64) -> i64 {
    let end = match index {
        NEG_INF => 0,
        INF => layout.len(),
        _ => usize::try_from(index.max(0)).unwrap_or(0).min(layout.len()),
    };
    layout[..end].iter().fold(0i64, |acc, x| acc.saturating_add(*x))
}

/// The type reached by stepping into `ty` at position `index`.
pub fn type_inside(types: &TypeTable, ty: TypeId, index: i64) -> Option<TypeId> {
    match types.kind(ty) {
        TypeKind::Pointer(pointee) => Some(*pointee),
        TypeKind::Array { element, .. } | TypeKind::Vector { element, .. } => Some(*element),
        TypeKind::Struct(fields) => usize::try_from(index)
            .ok()
            .and_then(|i| fields.get(i).copied()),
        _ => None,
    }
}

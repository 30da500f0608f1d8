//! Intervals, boxes, and dimension descriptors.

use smallvec::SmallVec;

use crate::expr::Expr;

/// A closed interval `[min, max]` of symbolic [`Expr`] bounds.
///
/// Either bound may be undefined, which reads as "unconstrained" for crop
/// merging and as "not yet inferred" for allocation bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalExpr {
    pub min: Expr,
    pub max: Expr,
}

impl IntervalExpr {
    pub fn new(min: Expr, max: Expr) -> Self {
        Self { min, max }
    }

    /// The single-point interval `[point, point]`.
    pub fn point(point: impl Into<Expr>) -> Self {
        let point = point.into();
        Self { min: point.clone(), max: point }
    }

    pub fn undefined() -> Self {
        Self::default()
    }

    pub fn defined(&self) -> bool {
        self.min.defined() && self.max.defined()
    }

    /// Number of points covered: `max - min + 1`.
    pub fn extent(&self) -> Expr {
        self.max.clone() - self.min.clone() + 1
    }

    pub fn set_extent(&mut self, extent: impl Into<Expr>) {
        self.max = self.min.clone() + extent.into() - 1;
    }

    /// True when the interval covers no points, i.e. `max < min`.
    pub fn empty(&self) -> Expr {
        Expr::lt(self.max.clone(), self.min.clone())
    }

    /// Union: undefined bounds are adopted from the other interval.
    pub fn union_with(&mut self, other: &IntervalExpr) {
        self.min = join(&self.min, &other.min, Expr::min);
        self.max = join(&self.max, &other.max, Expr::max);
    }

    /// Intersection: undefined bounds are treated as unconstrained.
    pub fn intersect_with(&mut self, other: &IntervalExpr) {
        self.min = join(&self.min, &other.min, Expr::max);
        self.max = join(&self.max, &other.max, Expr::min);
    }

    pub fn union(mut self, other: &IntervalExpr) -> IntervalExpr {
        self.union_with(other);
        self
    }

    pub fn intersect(mut self, other: &IntervalExpr) -> IntervalExpr {
        self.intersect_with(other);
        self
    }

    pub fn same_as(&self, other: &IntervalExpr) -> bool {
        self.min.same_as(&other.min) && self.max.same_as(&other.max)
    }
}

fn join(a: &Expr, b: &Expr, f: impl FnOnce(Expr, Expr) -> Expr) -> Expr {
    match (a.defined(), b.defined()) {
        (true, true) => f(a.clone(), b.clone()),
        (true, false) => a.clone(),
        (false, _) => b.clone(),
    }
}

/// An n-dimensional region: one interval per dimension.
pub type BoxExpr = SmallVec<[IntervalExpr; 4]>;

/// Union of boxes, growing `a` to the larger rank.
pub fn box_union(a: &mut BoxExpr, b: &BoxExpr) {
    if a.len() < b.len() {
        a.resize(b.len(), IntervalExpr::undefined());
    }
    for (d, interval) in b.iter().enumerate() {
        a[d].union_with(interval);
    }
}

/// Overwrite the defined bounds of `bounds[dim]` with `new_bounds`, growing
/// the box as needed. This is crop-merge semantics: a nested crop replaces
/// only the bounds it specifies.
pub fn merge_crop(bounds: &mut Option<BoxExpr>, dim: usize, new_bounds: &IntervalExpr) {
    let bounds = bounds.get_or_insert_with(BoxExpr::new);
    if dim >= bounds.len() {
        bounds.resize(dim + 1, IntervalExpr::undefined());
    }
    if new_bounds.min.defined() {
        bounds[dim].min = new_bounds.min.clone();
    }
    if new_bounds.max.defined() {
        bounds[dim].max = new_bounds.max.clone();
    }
}

pub fn merge_crop_box(bounds: &mut Option<BoxExpr>, new_bounds: &BoxExpr) {
    for (d, interval) in new_bounds.iter().enumerate() {
        merge_crop(bounds, d, interval);
    }
}

/// A single buffer dimension descriptor: bounds, byte stride, and an optional
/// storage fold factor. An undefined fold factor means the dimension is not
/// folded; a defined one must be strictly positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimExpr {
    pub bounds: IntervalExpr,
    pub stride: Expr,
    pub fold_factor: Expr,
}

impl DimExpr {
    pub fn new(bounds: IntervalExpr, stride: Expr, fold_factor: Expr) -> Self {
        Self { bounds, stride, fold_factor }
    }

    pub fn same_as(&self, other: &DimExpr) -> bool {
        self.bounds.same_as(&other.bounds)
            && self.stride.same_as(&other.stride)
            && self.fold_factor.same_as(&other.fold_factor)
    }
}

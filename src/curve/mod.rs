//! Parametric curves on `t ∈ [0,1]`.
//!
//! Every curve kind answers the same questions (position, derivative,
//! arc length, slicing, intersections with a region) through the
//! [`Parametric`] trait; [`Curve`] dispatches over the closed set of kinds.
//! Intersections are computed by lowering both sides to Bezier control
//! polygons and handing them to the clipper in [`clip`].

pub mod clip;

use std::cell::OnceCell;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_8};

use enum_dispatch::enum_dispatch;
use glam::{DVec2, dvec2};

use crate::geometry::{Bounds, EPSILON, Region};
use crate::log::debug;

pub use clip::{ClipOptions, ParamRange, Piece, find_intersections};

/// Number of intervals in an arc-length table.
pub const LENGTH_RESOLUTION: usize = 128;

/// Widest sweep one cubic piece of an arc covers; radial error stays
/// below 1e-7 of the radius.
const ARC_PIECE_SWEEP: f64 = FRAC_PI_8;

#[enum_dispatch]
pub trait Parametric {
    fn position(&self, t: f64) -> DVec2;

    fn derivative(&self, t: f64) -> DVec2;

    /// Parameters strictly inside `(0,1)` where `x'` or `y'` vanishes.
    fn extrema(&self) -> Vec<f64>;

    fn slice(&self, t0: f64, t1: f64) -> Curve;

    fn translated(&self, v: DVec2) -> Curve;

    /// Bezier control polygons covering the curve, each tagged with the
    /// parameter range it covers.
    fn bezier_pieces(&self) -> Vec<Piece>;

    /// Cumulative arc length at `i / LENGTH_RESOLUTION`, computed once.
    fn length_table(&self) -> &[f64];

    fn start(&self) -> DVec2 {
        self.position(0.0)
    }

    fn end(&self) -> DVec2 {
        self.position(1.0)
    }

    /// Tangent angle in radians.
    fn angle(&self, t: f64) -> f64 {
        let mut d = self.derivative(t);
        if d.length() < EPSILON {
            let (a, b) = ((t - 1e-4).max(0.0), (t + 1e-4).min(1.0));
            d = self.position(b) - self.position(a);
        }
        d.y.atan2(d.x)
    }

    /// Box around the curve offset by `padding` along its normal on both
    /// sides. The offset curve turns where the curve does, so its extrema
    /// sit at the curve's own extrema and end points.
    fn bounding_box(&self, padding: f64) -> Bounds {
        let mut ts = self.extrema();
        ts.extend([0.0, 1.0]);
        ts.into_iter()
            .fold(Bounds::point(self.position(0.0)), |b, t| {
                let p = self.position(t);
                let a = self.angle(t);
                let n = dvec2(-a.sin(), a.cos()) * padding;
                b.include(p + n).include(p - n)
            })
    }

    fn divide(&self, t: f64) -> (Curve, Curve) {
        (self.slice(0.0, t), self.slice(t, 1.0))
    }

    /// Arc length from the start up to `t`.
    fn length(&self, t: f64) -> f64 {
        let table = self.length_table();
        let u = t.clamp(0.0, 1.0) * LENGTH_RESOLUTION as f64;
        let i = (u.floor() as usize).min(LENGTH_RESOLUTION - 1);
        let frac = u - i as f64;
        table[i] + (table[i + 1] - table[i]) * frac
    }

    fn total_length(&self) -> f64 {
        self.length_table().last().copied().unwrap_or(0.0)
    }

    /// Inverse of [`Parametric::length`].
    fn t_of_length(&self, s: f64) -> f64 {
        let table = self.length_table();
        let total = table.last().copied().unwrap_or(0.0);
        if s <= 0.0 || total < EPSILON {
            return 0.0;
        }
        if s >= total {
            return 1.0;
        }
        let i = table.partition_point(|&l| l < s).clamp(1, LENGTH_RESOLUTION);
        let (l0, l1) = (table[i - 1], table[i]);
        let frac = if l1 - l0 > EPSILON { (s - l0) / (l1 - l0) } else { 0.0 };
        ((i - 1) as f64 + frac) / LENGTH_RESOLUTION as f64
    }

    /// Parameters where the curve crosses the boundary of `region`, ascending.
    fn t_of_intersections(&self, region: &Region, options: &ClipOptions) -> Vec<f64> {
        let boundary = clip::region_boundary(region);
        if boundary.is_empty() {
            return Vec::new();
        }
        let mut ts: Vec<f64> = self
            .bezier_pieces()
            .iter()
            .flat_map(|mine| {
                boundary
                    .iter()
                    .flat_map(|theirs| clip::intersect_pieces(mine, theirs, options))
                    .collect::<Vec<_>>()
            })
            .map(|(range, _)| range.mid())
            .collect();
        ts.sort_by(f64::total_cmp);
        ts.dedup_by(|a, b| (*a - *b).abs() < options.goal_accuracy * 10.0);
        ts
    }

    /// Where the curve leaves the object it starts from: the first crossing
    /// of `region`, or the start itself for a point.
    fn t_of_shaved_start(&self, region: &Region, options: &ClipOptions) -> Option<f64> {
        if region.is_point() {
            return Some(0.0);
        }
        self.t_of_intersections(region, options).first().copied()
    }

    /// Where the curve enters the object it ends at: the last crossing.
    fn t_of_shaved_end(&self, region: &Region, options: &ClipOptions) -> Option<f64> {
        if region.is_point() {
            return Some(1.0);
        }
        self.t_of_intersections(region, options).last().copied()
    }

    /// The part of the curve between the boundaries of `from` and `to`, or
    /// `None` when nothing of it remains visible.
    fn shave(&self, from: &Region, to: &Region, options: &ClipOptions) -> Option<Curve> {
        let Some(t0) = self.t_of_shaved_start(from, options) else {
            debug!("shave: curve never leaves its start object");
            return None;
        };
        let Some(t1) = self.t_of_shaved_end(to, options) else {
            debug!("shave: curve never reaches its end object");
            return None;
        };
        if t1 - t0 < EPSILON {
            debug!(t0, t1, "shave: objects overlap, nothing left to draw");
            return None;
        }
        Some(self.slice(t0, t1))
    }
}

/// The closed family of curve kinds.
#[enum_dispatch(Parametric)]
#[derive(Debug, Clone)]
pub enum Curve {
    Line,
    QuadBezier,
    CubicBezier,
    CubicBSpline,
    Arc,
}

impl Curve {
    pub fn line(start: DVec2, end: DVec2) -> Curve {
        Line::new(start, end).into()
    }

    /// The natural curve from `start` to `end` through `controls`: a line,
    /// a quadratic or cubic Bezier, or a spline for three or more controls.
    pub fn through(start: DVec2, controls: &[DVec2], end: DVec2) -> Curve {
        match *controls {
            [] => Line::new(start, end).into(),
            [c] => QuadBezier::new([start, c, end]).into(),
            [c1, c2] => CubicBezier::new([start, c1, c2, end]).into(),
            _ => CubicBSpline::new(start, controls, end).into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Curve::Line(_) => "line",
            Curve::QuadBezier(_) => "quadratic",
            Curve::CubicBezier(_) => "cubic",
            Curve::CubicBSpline(_) => "spline",
            Curve::Arc(_) => "arc",
        }
    }

    /// Control polygon of every Bezier piece, in order.
    pub fn control_points(&self) -> Vec<Vec<DVec2>> {
        self.bezier_pieces().into_iter().map(|p| p.points).collect()
    }
}

// ============================================================================
// Bezier helpers
// ============================================================================

/// Split a control polygon at `t` (de Casteljau).
pub(crate) fn split_polygon(points: &[DVec2], t: f64) -> (Vec<DVec2>, Vec<DVec2>) {
    let mut left = Vec::with_capacity(points.len());
    let mut right = Vec::with_capacity(points.len());
    let mut work = points.to_vec();
    while !work.is_empty() {
        left.push(work[0]);
        right.push(work[work.len() - 1]);
        work = work.windows(2).map(|w| w[0].lerp(w[1], t)).collect();
    }
    right.reverse();
    (left, right)
}

/// Control polygon of the part of a Bezier between `t0` and `t1`.
pub(crate) fn sub_polygon(points: &[DVec2], t0: f64, t1: f64) -> Vec<DVec2> {
    if t1 < EPSILON {
        return vec![points[0]; points.len()];
    }
    let (head, _) = split_polygon(points, t1.min(1.0));
    let (_, tail) = split_polygon(&head, (t0 / t1).clamp(0.0, 1.0));
    tail
}

pub(crate) fn bezier_point(points: &[DVec2], t: f64) -> DVec2 {
    let mut work = points.to_vec();
    while work.len() > 1 {
        work = work.windows(2).map(|w| w[0].lerp(w[1], t)).collect();
    }
    work.first().copied().unwrap_or(DVec2::ZERO)
}

/// Real roots of `a t² + b t + c` inside `(0,1)`.
fn unit_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    let roots = if a.abs() < EPSILON {
        if b.abs() < EPSILON {
            vec![]
        } else {
            vec![-c / b]
        }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            vec![]
        } else {
            let root = disc.sqrt();
            vec![(-b + root) / (2.0 * a), (-b - root) / (2.0 * a)]
        }
    };
    roots.into_iter().filter(|t| *t > 0.0 && *t < 1.0).collect()
}

fn tabulate(derivative: impl Fn(f64) -> DVec2) -> Vec<f64> {
    let h = 1.0 / LENGTH_RESOLUTION as f64;
    let speed = |t: f64| derivative(t).length();
    let mut table = Vec::with_capacity(LENGTH_RESOLUTION + 1);
    let mut total = 0.0;
    table.push(total);
    for i in 0..LENGTH_RESOLUTION {
        let t0 = i as f64 * h;
        // Simpson's rule over one interval.
        total += h / 6.0 * (speed(t0) + 4.0 * speed(t0 + h / 2.0) + speed(t0 + h));
        table.push(total);
    }
    table
}

// ============================================================================
// Line
// ============================================================================

#[derive(Debug, Clone)]
pub struct Line {
    pub from: DVec2,
    pub to: DVec2,
    lengths: OnceCell<Vec<f64>>,
}

impl Line {
    pub fn new(from: DVec2, to: DVec2) -> Self {
        Self {
            from,
            to,
            lengths: OnceCell::new(),
        }
    }
}

impl Parametric for Line {
    fn position(&self, t: f64) -> DVec2 {
        self.from.lerp(self.to, t)
    }

    fn derivative(&self, _t: f64) -> DVec2 {
        self.to - self.from
    }

    fn extrema(&self) -> Vec<f64> {
        Vec::new()
    }

    fn slice(&self, t0: f64, t1: f64) -> Curve {
        Line::new(self.position(t0), self.position(t1)).into()
    }

    fn translated(&self, v: DVec2) -> Curve {
        Line::new(self.from + v, self.to + v).into()
    }

    fn bezier_pieces(&self) -> Vec<Piece> {
        vec![Piece::new(vec![self.from, self.to], 0.0, 1.0)]
    }

    fn length_table(&self) -> &[f64] {
        self.lengths.get_or_init(|| {
            let len = self.from.distance(self.to);
            (0..=LENGTH_RESOLUTION)
                .map(|i| len * i as f64 / LENGTH_RESOLUTION as f64)
                .collect()
        })
    }
}

// ============================================================================
// Quadratic Bezier
// ============================================================================

#[derive(Debug, Clone)]
pub struct QuadBezier {
    pub points: [DVec2; 3],
    lengths: OnceCell<Vec<f64>>,
}

impl QuadBezier {
    pub fn new(points: [DVec2; 3]) -> Self {
        Self {
            points,
            lengths: OnceCell::new(),
        }
    }
}

impl Parametric for QuadBezier {
    fn position(&self, t: f64) -> DVec2 {
        let [p0, p1, p2] = self.points;
        let s = 1.0 - t;
        p0 * (s * s) + p1 * (2.0 * s * t) + p2 * (t * t)
    }

    fn derivative(&self, t: f64) -> DVec2 {
        let [p0, p1, p2] = self.points;
        ((p1 - p0) * (1.0 - t) + (p2 - p1) * t) * 2.0
    }

    fn extrema(&self) -> Vec<f64> {
        let [p0, p1, p2] = self.points;
        let denom = p0 - 2.0 * p1 + p2;
        let num = p0 - p1;
        let mut ts = Vec::new();
        for (n, d) in [(num.x, denom.x), (num.y, denom.y)] {
            if d.abs() > EPSILON {
                let t = n / d;
                if t > 0.0 && t < 1.0 {
                    ts.push(t);
                }
            }
        }
        ts
    }

    fn slice(&self, t0: f64, t1: f64) -> Curve {
        let p = sub_polygon(&self.points, t0, t1);
        QuadBezier::new([p[0], p[1], p[2]]).into()
    }

    fn translated(&self, v: DVec2) -> Curve {
        QuadBezier::new(self.points.map(|p| p + v)).into()
    }

    fn bezier_pieces(&self) -> Vec<Piece> {
        vec![Piece::new(self.points.to_vec(), 0.0, 1.0)]
    }

    fn length_table(&self) -> &[f64] {
        self.lengths.get_or_init(|| tabulate(|t| self.derivative(t)))
    }
}

// ============================================================================
// Cubic Bezier
// ============================================================================

#[derive(Debug, Clone)]
pub struct CubicBezier {
    pub points: [DVec2; 4],
    lengths: OnceCell<Vec<f64>>,
}

impl CubicBezier {
    pub fn new(points: [DVec2; 4]) -> Self {
        Self {
            points,
            lengths: OnceCell::new(),
        }
    }
}

fn cubic_position([p0, p1, p2, p3]: [DVec2; 4], t: f64) -> DVec2 {
    let s = 1.0 - t;
    p0 * (s * s * s) + p1 * (3.0 * s * s * t) + p2 * (3.0 * s * t * t) + p3 * (t * t * t)
}

fn cubic_derivative([p0, p1, p2, p3]: [DVec2; 4], t: f64) -> DVec2 {
    let s = 1.0 - t;
    ((p1 - p0) * (s * s) + (p2 - p1) * (2.0 * s * t) + (p3 - p2) * (t * t)) * 3.0
}

fn cubic_extrema([p0, p1, p2, p3]: [DVec2; 4]) -> Vec<f64> {
    let a = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    let b = 2.0 * (p0 - 2.0 * p1 + p2);
    let c = p1 - p0;
    let mut ts = unit_roots(a.x, b.x, c.x);
    ts.extend(unit_roots(a.y, b.y, c.y));
    ts
}

impl Parametric for CubicBezier {
    fn position(&self, t: f64) -> DVec2 {
        cubic_position(self.points, t)
    }

    fn derivative(&self, t: f64) -> DVec2 {
        cubic_derivative(self.points, t)
    }

    fn extrema(&self) -> Vec<f64> {
        cubic_extrema(self.points)
    }

    fn slice(&self, t0: f64, t1: f64) -> Curve {
        let p = sub_polygon(&self.points, t0, t1);
        CubicBezier::new([p[0], p[1], p[2], p[3]]).into()
    }

    fn translated(&self, v: DVec2) -> Curve {
        CubicBezier::new(self.points.map(|p| p + v)).into()
    }

    fn bezier_pieces(&self) -> Vec<Piece> {
        vec![Piece::new(self.points.to_vec(), 0.0, 1.0)]
    }

    fn length_table(&self) -> &[f64] {
        self.lengths.get_or_init(|| tabulate(|t| self.derivative(t)))
    }
}

// ============================================================================
// Cubic B-spline
// ============================================================================

/// A uniform cubic B-spline from `start` to `end` guided by interior
/// control points, held as one cubic Bezier per span and viewed through
/// the window `[from, to]` of its own parameter.
#[derive(Debug, Clone)]
pub struct CubicBSpline {
    segments: Vec<[DVec2; 4]>,
    from: f64,
    to: f64,
    lengths: OnceCell<Vec<f64>>,
}

impl CubicBSpline {
    pub fn new(start: DVec2, controls: &[DVec2], end: DVec2) -> Self {
        let first = controls.first().copied().unwrap_or(end);
        let last = controls.last().copied().unwrap_or(start);
        // Phantom knots make the spline interpolate both end points.
        let mut knots = Vec::with_capacity(controls.len() + 4);
        knots.push(2.0 * start - first);
        knots.push(start);
        knots.extend_from_slice(controls);
        knots.push(end);
        knots.push(2.0 * end - last);
        let segments = knots
            .windows(4)
            .map(|w| {
                [
                    (w[0] + 4.0 * w[1] + w[2]) / 6.0,
                    (2.0 * w[1] + w[2]) / 3.0,
                    (w[1] + 2.0 * w[2]) / 3.0,
                    (w[1] + 4.0 * w[2] + w[3]) / 6.0,
                ]
            })
            .collect();
        Self {
            segments,
            from: 0.0,
            to: 1.0,
            lengths: OnceCell::new(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn global(&self, t: f64) -> f64 {
        self.from + t * (self.to - self.from)
    }

    /// Segment index and local parameter for a global parameter.
    fn locate(&self, big_t: f64) -> (usize, f64) {
        let m = self.segments.len();
        let u = big_t.clamp(0.0, 1.0) * m as f64;
        let i = (u.floor() as usize).min(m.saturating_sub(1));
        (i, u - i as f64)
    }
}

impl Parametric for CubicBSpline {
    fn position(&self, t: f64) -> DVec2 {
        let (i, local) = self.locate(self.global(t));
        cubic_position(self.segments[i], local)
    }

    fn derivative(&self, t: f64) -> DVec2 {
        let (i, local) = self.locate(self.global(t));
        cubic_derivative(self.segments[i], local)
            * (self.segments.len() as f64 * (self.to - self.from))
    }

    fn extrema(&self) -> Vec<f64> {
        let m = self.segments.len() as f64;
        let span = self.to - self.from;
        if span.abs() < EPSILON {
            return Vec::new();
        }
        self.segments
            .iter()
            .enumerate()
            .flat_map(|(i, seg)| {
                cubic_extrema(*seg)
                    .into_iter()
                    .map(move |local| (i as f64 + local) / m)
            })
            .map(|big_t| (big_t - self.from) / span)
            .filter(|t| *t > 0.0 && *t < 1.0)
            .collect()
    }

    fn slice(&self, t0: f64, t1: f64) -> Curve {
        CubicBSpline {
            segments: self.segments.clone(),
            from: self.global(t0),
            to: self.global(t1),
            lengths: OnceCell::new(),
        }
        .into()
    }

    fn translated(&self, v: DVec2) -> Curve {
        CubicBSpline {
            segments: self.segments.iter().map(|s| s.map(|p| p + v)).collect(),
            from: self.from,
            to: self.to,
            lengths: OnceCell::new(),
        }
        .into()
    }

    fn bezier_pieces(&self) -> Vec<Piece> {
        let m = self.segments.len() as f64;
        let span = self.to - self.from;
        if span.abs() < EPSILON {
            let p = self.position(0.0);
            return vec![Piece::new(vec![p, p], 0.0, 1.0)];
        }
        let (lo, hi) = (self.from.min(self.to), self.from.max(self.to));
        let mut pieces = Vec::new();
        for (i, seg) in self.segments.iter().enumerate() {
            let s0 = lo.max(i as f64 / m);
            let s1 = hi.min((i + 1) as f64 / m);
            if s1 - s0 <= EPSILON {
                continue;
            }
            let local = |s: f64| s * m - i as f64;
            let local_t = |s: f64| (s - self.from) / span;
            let (mut points, mut t_min, mut t_max) = (
                sub_polygon(seg, local(s0), local(s1)),
                local_t(s0),
                local_t(s1),
            );
            if span < 0.0 {
                points.reverse();
                std::mem::swap(&mut t_min, &mut t_max);
            }
            pieces.push(Piece::new(points, t_min, t_max));
        }
        if span < 0.0 {
            pieces.reverse();
        }
        pieces
    }

    fn length_table(&self) -> &[f64] {
        self.lengths.get_or_init(|| tabulate(|t| self.derivative(t)))
    }
}

// ============================================================================
// Circular arc
// ============================================================================

/// A circular arc swept from `start_angle` to `end_angle` (radians,
/// anticlockwise when the end is larger).
#[derive(Debug, Clone)]
pub struct Arc {
    pub center: DVec2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    lengths: OnceCell<Vec<f64>>,
}

impl Arc {
    pub fn new(center: DVec2, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        Self {
            center,
            radius,
            start_angle,
            end_angle,
            lengths: OnceCell::new(),
        }
    }

    pub fn full(center: DVec2, radius: f64) -> Self {
        Self::new(center, radius, 0.0, std::f64::consts::TAU)
    }

    fn sweep(&self) -> f64 {
        self.end_angle - self.start_angle
    }

    fn angle_at(&self, t: f64) -> f64 {
        self.start_angle + t * self.sweep()
    }

    fn point_at_angle(&self, a: f64) -> DVec2 {
        self.center + dvec2(a.cos(), a.sin()) * self.radius
    }
}

impl Parametric for Arc {
    fn position(&self, t: f64) -> DVec2 {
        self.point_at_angle(self.angle_at(t))
    }

    fn derivative(&self, t: f64) -> DVec2 {
        let a = self.angle_at(t);
        dvec2(-a.sin(), a.cos()) * (self.radius * self.sweep())
    }

    fn extrema(&self) -> Vec<f64> {
        let sweep = self.sweep();
        if sweep.abs() < EPSILON {
            return Vec::new();
        }
        let lo = self.start_angle.min(self.end_angle);
        let hi = self.start_angle.max(self.end_angle);
        let mut k = (lo / FRAC_PI_2).ceil();
        let mut ts = Vec::new();
        while k * FRAC_PI_2 < hi {
            let t = (k * FRAC_PI_2 - self.start_angle) / sweep;
            if t > 0.0 && t < 1.0 {
                ts.push(t);
            }
            k += 1.0;
        }
        ts
    }

    fn slice(&self, t0: f64, t1: f64) -> Curve {
        Arc::new(self.center, self.radius, self.angle_at(t0), self.angle_at(t1)).into()
    }

    fn translated(&self, v: DVec2) -> Curve {
        Arc::new(self.center + v, self.radius, self.start_angle, self.end_angle).into()
    }

    fn bezier_pieces(&self) -> Vec<Piece> {
        let sweep = self.sweep();
        let n = (sweep.abs() / ARC_PIECE_SWEEP).ceil().max(1.0) as usize;
        let step = sweep / n as f64;
        let k = 4.0 / 3.0 * (step / 4.0).tan() * self.radius;
        (0..n)
            .map(|i| {
                let a = self.start_angle + i as f64 * step;
                let b = a + step;
                let p0 = self.point_at_angle(a);
                let p3 = self.point_at_angle(b);
                let p1 = p0 + dvec2(-a.sin(), a.cos()) * k;
                let p2 = p3 - dvec2(-b.sin(), b.cos()) * k;
                Piece::new(
                    vec![p0, p1, p2, p3],
                    i as f64 / n as f64,
                    (i + 1) as f64 / n as f64,
                )
            })
            .collect()
    }

    fn length_table(&self) -> &[f64] {
        self.lengths.get_or_init(|| {
            let len = (self.radius * self.sweep()).abs();
            (0..=LENGTH_RESOLUTION)
                .map(|i| len * i as f64 / LENGTH_RESOLUTION as f64)
                .collect()
        })
    }
}

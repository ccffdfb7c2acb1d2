//! Bezier clipping.
//!
//! Finds every pair of parameter ranges where two Bezier pieces meet. Each
//! round bounds one piece by its fat line (the chord through its end points
//! widened to hold every control point) and cuts the other piece's range
//! down to where its control polygon can lie inside that band. The roles
//! alternate every round. A round that barely shrinks anything splits the
//! wider piece in half and recurses on both halves.

use glam::{DVec2, dvec2};

use super::{Arc, Curve, Parametric, bezier_point, split_polygon, sub_polygon};
use crate::geometry::{EPSILON, Region};
use crate::log::{debug, trace, warn};
use crate::types::{Metrics, defaults};

/// A clip that keeps more than this share of a range counts as stalled.
const STALL_RATIO: f64 = 0.8;
/// Upper bound on clipping rounds for one pair of pieces, across all splits.
const STEP_BUDGET: usize = 4096;

/// Convergence settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipOptions {
    /// Width below which a parameter range counts as a root
    pub goal_accuracy: f64,
    /// Cap on rounds per range and on split depth
    pub max_iterations: u32,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            goal_accuracy: defaults::GOAL_ACCURACY,
            max_iterations: defaults::MAX_ITERATIONS,
        }
    }
}

impl From<&Metrics> for ClipOptions {
    fn from(metrics: &Metrics) -> Self {
        Self {
            goal_accuracy: metrics.goal_accuracy,
            max_iterations: metrics.max_iterations,
        }
    }
}

/// A closed parameter interval, `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn mid(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// A Bezier control polygon standing for the part of a parent curve
/// between `t_min` and `t_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub points: Vec<DVec2>,
    pub t_min: f64,
    pub t_max: f64,
}

impl Piece {
    pub fn new(points: Vec<DVec2>, t_min: f64, t_max: f64) -> Self {
        Self {
            points,
            t_min,
            t_max,
        }
    }

    /// Point at local parameter `u ∈ [0,1]`.
    pub fn position(&self, u: f64) -> DVec2 {
        bezier_point(&self.points, u)
    }

    pub fn span(&self) -> f64 {
        (self.t_max - self.t_min).abs()
    }

    pub fn range(&self) -> ParamRange {
        ParamRange::new(self.t_min, self.t_max)
    }

    fn parent_t(&self, u: f64) -> f64 {
        self.t_min + u * (self.t_max - self.t_min)
    }

    /// The sub-piece between local parameters `u0` and `u1`.
    pub fn slice(&self, u0: f64, u1: f64) -> Piece {
        Piece::new(
            sub_polygon(&self.points, u0, u1),
            self.parent_t(u0),
            self.parent_t(u1),
        )
    }

    pub fn split(&self) -> (Piece, Piece) {
        let (left, right) = split_polygon(&self.points, 0.5);
        let mid = self.parent_t(0.5);
        (
            Piece::new(left, self.t_min, mid),
            Piece::new(right, mid, self.t_max),
        )
    }

    fn chord(&self) -> DVec2 {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => *b - *a,
            _ => DVec2::ZERO,
        }
    }
}

/// The infinite line through a piece's end points, widened to the signed
/// distance band `[d_min, d_max]` that holds its whole control polygon.
struct FatLine {
    origin: DVec2,
    normal: DVec2,
    d_min: f64,
    d_max: f64,
}

impl FatLine {
    /// `against` supplies a direction when the piece has no usable chord.
    fn around(piece: &Piece, against: &Piece) -> FatLine {
        let origin = piece.points.first().copied().unwrap_or(DVec2::ZERO);
        let chord = piece.chord();
        let normal = if chord.length() > EPSILON {
            dvec2(-chord.y, chord.x).normalize()
        } else {
            let other = against.chord();
            if other.length() > EPSILON {
                other.normalize()
            } else {
                DVec2::Y
            }
        };
        let (d_min, d_max) = piece
            .points
            .iter()
            .map(|p| (*p - origin).dot(normal))
            .fold((0.0f64, 0.0f64), |(lo, hi), d| (lo.min(d), hi.max(d)));
        FatLine {
            origin,
            normal,
            d_min,
            d_max,
        }
    }

    fn distance(&self, p: DVec2) -> f64 {
        (p - self.origin).dot(self.normal)
    }

    /// Local parameter interval of `target` whose control hull can reach
    /// the band, or `None` when it cannot.
    fn clip(&self, target: &Piece) -> Option<(f64, f64)> {
        let n = target.points.len().saturating_sub(1).max(1) as f64;
        let hull: Vec<(f64, f64)> = target
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i as f64 / n, self.distance(*p)))
            .collect();
        let lo_band = self.d_min - EPSILON;
        let hi_band = self.d_max + EPSILON;
        let mut found: Option<(f64, f64)> = None;
        let mut include = |u0: f64, u1: f64| {
            let (a, b) = (u0.min(u1), u0.max(u1));
            found = Some(match found {
                Some((lo, hi)) => (lo.min(a), hi.max(b)),
                None => (a, b),
            });
        };
        for (i, &(ui, ei)) in hull.iter().enumerate() {
            if (lo_band..=hi_band).contains(&ei) {
                include(ui, ui);
            }
            for &(uj, ej) in &hull[i + 1..] {
                let de = ej - ei;
                if de.abs() < EPSILON {
                    continue;
                }
                let s1 = ((lo_band - ei) / de).clamp(0.0, 1.0);
                let s2 = ((hi_band - ei) / de).clamp(0.0, 1.0);
                let (s_lo, s_hi) = (s1.min(s2), s1.max(s2));
                let e_lo = ei + de * s_lo;
                let e_hi = ei + de * s_hi;
                let inside = |e: f64| (lo_band - EPSILON..=hi_band + EPSILON).contains(&e);
                if inside(e_lo) && inside(e_hi) {
                    include(ui + (uj - ui) * s_lo, ui + (uj - ui) * s_hi);
                }
            }
        }
        found
    }
}

/// Every pair of tight parameter ranges where curves `a` and `b` meet.
pub fn find_intersections(
    a: &Curve,
    b: &Curve,
    options: &ClipOptions,
) -> Vec<(ParamRange, ParamRange)> {
    let theirs = b.bezier_pieces();
    let mut found: Vec<(ParamRange, ParamRange)> = Vec::new();
    for mine in a.bezier_pieces() {
        for other in &theirs {
            for hit in intersect_pieces(&mine, other, options) {
                push_distinct(&mut found, hit, options);
            }
        }
    }
    found
}

/// Intersections of two Bezier pieces, as ranges of their parents'
/// parameters.
pub fn intersect_pieces(
    a: &Piece,
    b: &Piece,
    options: &ClipOptions,
) -> Vec<(ParamRange, ParamRange)> {
    let mut found = Vec::new();
    let mut budget = STEP_BUDGET;
    clip_pair(a.clone(), b.clone(), options, 0, &mut budget, &mut found);
    found
}

fn push_distinct(
    found: &mut Vec<(ParamRange, ParamRange)>,
    hit: (ParamRange, ParamRange),
    options: &ClipOptions,
) {
    let tolerance = options.goal_accuracy * 10.0;
    let duplicate = found.iter().any(|(ra, rb)| {
        (ra.mid() - hit.0.mid()).abs() < tolerance && (rb.mid() - hit.1.mid()).abs() < tolerance
    });
    if !duplicate {
        found.push(hit);
    }
}

fn clip_pair(
    mut a: Piece,
    mut b: Piece,
    options: &ClipOptions,
    depth: u32,
    budget: &mut usize,
    found: &mut Vec<(ParamRange, ParamRange)>,
) {
    if depth > options.max_iterations {
        debug!(depth, "clip: split depth exhausted, dropping candidate");
        return;
    }
    for round in 0..options.max_iterations {
        if *budget == 0 {
            warn!(
                budget = STEP_BUDGET,
                "clip: step budget exhausted, intersections may be missing"
            );
            return;
        }
        *budget -= 1;

        if a.span() <= options.goal_accuracy && b.span() <= options.goal_accuracy {
            push_distinct(found, (a.range(), b.range()), options);
            return;
        }

        // Alternate which piece is cut down.
        let clip_b = round % 2 == 0;
        let (clipper, target) = if clip_b { (&a, &b) } else { (&b, &a) };
        let fat = FatLine::around(clipper, target);
        let Some((u0, u1)) = fat.clip(target) else {
            return;
        };
        let before = target.span();
        let clipped = target.slice(u0, u1);

        if clipped.span() > STALL_RATIO * before && before > options.goal_accuracy {
            let (keep_a, keep_b) = if clip_b {
                (a.clone(), clipped)
            } else {
                (clipped, b.clone())
            };
            trace!(depth, "clip: stalled, splitting");
            if keep_a.span() >= keep_b.span() {
                let (left, right) = keep_a.split();
                clip_pair(left, keep_b.clone(), options, depth + 1, budget, found);
                clip_pair(right, keep_b, options, depth + 1, budget, found);
            } else {
                let (left, right) = keep_b.split();
                clip_pair(keep_a.clone(), left, options, depth + 1, budget, found);
                clip_pair(keep_a, right, options, depth + 1, budget, found);
            }
            return;
        }

        if clip_b {
            b = clipped;
        } else {
            a = clipped;
        }
    }
    if a.span() <= options.goal_accuracy * 10.0 && b.span() <= options.goal_accuracy * 10.0 {
        push_distinct(found, (a.range(), b.range()), options);
    } else {
        debug!("clip: iteration cap reached without converging");
    }
}

/// Bezier pieces tracing the boundary of a region; a point has none.
pub fn region_boundary(region: &Region) -> Vec<Piece> {
    let at = region.at();
    let m = region.margins();
    match region {
        Region::Point(_) => Vec::new(),
        Region::Rect { .. } => {
            let corners = [
                dvec2(at.x - m.l, at.y - m.d),
                dvec2(at.x + m.r, at.y - m.d),
                dvec2(at.x + m.r, at.y + m.u),
                dvec2(at.x - m.l, at.y + m.u),
            ];
            (0..4)
                .map(|i| Piece::new(vec![corners[i], corners[(i + 1) % 4]], 0.0, 1.0))
                .collect()
        }
        Region::Ellipse { .. } => {
            let (a, b) = (m.width() / 2.0, m.height() / 2.0);
            let center = at + dvec2((m.r - m.l) / 2.0, (m.u - m.d) / 2.0);
            Arc::full(DVec2::ZERO, 1.0)
                .bezier_pieces()
                .into_iter()
                .map(|unit| {
                    let points = unit
                        .points
                        .iter()
                        .map(|p| center + dvec2(p.x * a, p.y * b))
                        .collect();
                    Piece::new(points, unit.t_min, unit.t_max)
                })
                .collect()
        }
    }
}

//! Regions: points, rectangles and ellipses with directed margins.
//!
//! Every region has an anchor point and four margins measured from it
//! (left, right, up, down). Combining regions works on the margins relative
//! to the receiver's anchor, so an object keeps its own reference point when
//! it grows to cover another.

use glam::{DVec2, dvec2};

/// Threshold for every zero comparison in the geometry and curve code.
pub const EPSILON: f64 = 1e-12;

/// Distances from an anchor to the four sides of a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Margins {
    pub l: f64,
    pub r: f64,
    pub u: f64,
    pub d: f64,
}

impl Margins {
    pub const fn new(l: f64, r: f64, u: f64, d: f64) -> Self {
        Self { l, r, u, d }
    }

    pub const fn uniform(m: f64) -> Self {
        Self::new(m, m, m, m)
    }

    pub fn width(&self) -> f64 {
        self.l + self.r
    }

    pub fn height(&self) -> f64 {
        self.u + self.d
    }

    fn clamped(self) -> Self {
        Self::new(self.l.max(0.0), self.r.max(0.0), self.u.max(0.0), self.d.max(0.0))
    }

    fn is_zero(&self) -> bool {
        self.l.abs() < EPSILON
            && self.r.abs() < EPSILON
            && self.u.abs() < EPSILON
            && self.d.abs() < EPSILON
    }

    fn max(self, other: Margins) -> Self {
        Self::new(
            self.l.max(other.l),
            self.r.max(other.r),
            self.u.max(other.u),
            self.d.max(other.d),
        )
    }
}

/// Axis-aligned bounding box in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn point(p: DVec2) -> Self {
        Self { min: p, max: p }
    }

    pub fn union(self, other: Bounds) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn include(self, p: DVec2) -> Self {
        self.union(Bounds::point(p))
    }

    pub fn padded(self, amount: f64) -> Self {
        let pad = DVec2::splat(amount);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn translated(self, v: DVec2) -> Self {
        Self {
            min: self.min + v,
            max: self.max + v,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Whether `other` lies inside, allowing `tolerance` on every side.
    pub fn contains(&self, other: &Bounds, tolerance: f64) -> bool {
        other.min.x >= self.min.x - tolerance
            && other.min.y >= self.min.y - tolerance
            && other.max.x <= self.max.x + tolerance
            && other.max.y <= self.max.y + tolerance
    }

    /// The rectangle covering these bounds, anchored at `at`.
    pub fn to_region(&self, at: DVec2) -> Region {
        Region::rect(
            at,
            Margins::new(
                at.x - self.min.x,
                self.max.x - at.x,
                self.max.y - at.y,
                at.y - self.min.y,
            )
            .clamped(),
        )
    }

    pub fn approx_eq(&self, other: &Bounds, tolerance: f64) -> bool {
        self.min.abs_diff_eq(other.min, tolerance) && self.max.abs_diff_eq(other.max, tolerance)
    }
}

/// The extent of an object around its anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Point(DVec2),
    Rect { at: DVec2, margins: Margins },
    Ellipse { at: DVec2, margins: Margins },
}

impl Default for Region {
    fn default() -> Self {
        Region::Point(DVec2::ZERO)
    }
}

impl Region {
    pub fn rect(at: DVec2, margins: Margins) -> Self {
        Region::Rect { at, margins }
    }

    pub fn ellipse(at: DVec2, margins: Margins) -> Self {
        Region::Ellipse { at, margins }
    }

    pub fn circle(at: DVec2, radius: f64) -> Self {
        Region::ellipse(at, Margins::uniform(radius.abs()))
    }

    /// The anchor (reference point).
    pub fn at(&self) -> DVec2 {
        match *self {
            Region::Point(at) | Region::Rect { at, .. } | Region::Ellipse { at, .. } => at,
        }
    }

    pub fn margins(&self) -> Margins {
        match *self {
            Region::Point(_) => Margins::default(),
            Region::Rect { margins, .. } | Region::Ellipse { margins, .. } => margins,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Region::Point(_))
    }

    /// Same family with new margins; a rectangle without extent collapses to a point.
    fn with_margins(&self, margins: Margins) -> Self {
        let at = self.at();
        match self {
            Region::Ellipse { .. } => Region::ellipse(at, margins),
            _ if margins.is_zero() => Region::Point(at),
            _ => Region::rect(at, margins),
        }
    }

    /// The same extent re-anchored at `p` (the whole region moves).
    pub fn moved_to(&self, p: DVec2) -> Self {
        self.translated(p - self.at())
    }

    pub fn translated(&self, v: DVec2) -> Self {
        match *self {
            Region::Point(at) => Region::Point(at + v),
            Region::Rect { at, margins } => Region::rect(at + v, margins),
            Region::Ellipse { at, margins } => Region::ellipse(at + v, margins),
        }
    }

    /// Move the anchor by `v` while the extent stays where it is.
    pub fn shift_frame(&self, v: DVec2) -> Self {
        let m = self.margins();
        let margins = Margins::new(m.l + v.x, m.r - v.x, m.u - v.y, m.d + v.y).clamped();
        let shifted = match *self {
            Region::Ellipse { at, .. } => Region::ellipse(at + v, margins),
            _ => Region::rect(self.at() + v, margins),
        };
        if margins.is_zero() && !matches!(self, Region::Ellipse { .. }) {
            Region::Point(shifted.at())
        } else {
            shifted
        }
    }

    /// Add `v.x` to the horizontal and `v.y` to the vertical margins.
    pub fn grown(&self, v: DVec2) -> Self {
        let m = self.margins();
        self.with_margins(Margins::new(m.l + v.x, m.r + v.x, m.u + v.y, m.d + v.y).clamped())
    }

    pub fn shrunk(&self, v: DVec2) -> Self {
        self.grown(-v)
    }

    /// Resize to `width` by `height`, keeping the anchor's relative position.
    pub fn sized(&self, width: f64, height: f64) -> Self {
        let m = self.margins();
        let split = |a: f64, b: f64, total: f64| {
            let sum = a + b;
            if sum < EPSILON {
                (total / 2.0, total / 2.0)
            } else {
                (total * a / sum, total * b / sum)
            }
        };
        let (l, r) = split(m.l, m.r, width.max(0.0));
        let (u, d) = split(m.u, m.d, height.max(0.0));
        self.with_margins(Margins::new(l, r, u, d))
    }

    /// The circle (or point) around the centre of this extent, as wide as
    /// the larger side.
    pub fn to_circle(&self) -> Self {
        let b = self.bounds();
        let radius = b.width().max(b.height()) / 2.0;
        let center = b.center();
        let circle = Region::circle(center, radius);
        if radius < EPSILON {
            return Region::Point(self.at());
        }
        let v = self.at() - center;
        circle.shift_frame(v)
    }

    pub fn bounds(&self) -> Bounds {
        let at = self.at();
        let m = self.margins();
        Bounds::new(dvec2(at.x - m.l, at.y - m.d), dvec2(at.x + m.r, at.y + m.u))
    }

    /// Smallest region around this one's anchor covering both.
    ///
    /// The covered extent is the same in either order. The anchor is always
    /// the receiver's, so `a.combine(b) == b.combine(a)` exactly only when
    /// both share an anchor.
    pub fn combine(&self, other: &Region) -> Region {
        let at = self.at();
        if let (Region::Point(a), Region::Point(b)) = (self, other) {
            if a.abs_diff_eq(*b, EPSILON) {
                return *self;
            }
        }
        let theirs = other.bounds();
        let covering = Margins::new(
            at.x - theirs.min.x,
            theirs.max.x - at.x,
            theirs.max.y - at.y,
            at.y - theirs.min.y,
        );
        let margins = self.margins().max(covering).clamped();
        match (self, other) {
            (Region::Ellipse { .. }, Region::Ellipse { at: other_at, .. })
                if at.abs_diff_eq(*other_at, EPSILON) =>
            {
                Region::ellipse(at, margins)
            }
            _ if margins.is_zero() => Region::Point(at),
            _ => Region::rect(at, margins),
        }
    }

    /// Where the ray from the anchor towards `toward` leaves the region.
    pub fn edge_point(&self, toward: DVec2) -> DVec2 {
        let at = self.at();
        let dir = toward - at;
        if dir.length() < EPSILON {
            return at;
        }
        match *self {
            Region::Point(p) => p,
            Region::Rect { margins, .. } => rect_edge(at, margins, dir),
            Region::Ellipse { margins, .. } => ellipse_edge(at, margins, dir),
        }
    }

    /// Edge point in a direction measured in units of the region's own
    /// extent, so `(1,1)` points at the upper right corner of a rectangle.
    pub fn proportional_edge_point(&self, toward: DVec2) -> DVec2 {
        let at = self.at();
        let dir = toward - at;
        if dir.length() < EPSILON {
            return at;
        }
        let m = self.margins();
        let unit = dir.normalize();
        let scaled = dvec2(
            unit.x * if unit.x < 0.0 { m.l } else { m.r },
            unit.y * if unit.y < 0.0 { m.d } else { m.u },
        );
        match *self {
            Region::Point(p) => p,
            Region::Rect { .. } => {
                // Normalize onto the box so diagonal directions reach the corners.
                let k = unit.x.abs().max(unit.y.abs());
                at + scaled / k
            }
            Region::Ellipse { margins, .. } => {
                if scaled.length() < EPSILON {
                    at
                } else {
                    ellipse_edge(at, margins, scaled)
                }
            }
        }
    }
}

fn rect_edge(at: DVec2, m: Margins, dir: DVec2) -> DVec2 {
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let ex = if dir.x >= 0.0 { m.r } else { m.l };
    let ey = if dir.y >= 0.0 { m.u } else { m.d };
    if ay * ex <= ax * ey && ax > EPSILON {
        at + dir * (ex / ax)
    } else if ay > EPSILON {
        at + dir * (ey / ay)
    } else {
        at
    }
}

fn ellipse_edge(at: DVec2, m: Margins, dir: DVec2) -> DVec2 {
    let a = m.width() / 2.0;
    let b = m.height() / 2.0;
    if a < EPSILON || b < EPSILON {
        return rect_edge(at, m, dir);
    }
    let center = at + dvec2((m.r - m.l) / 2.0, (m.u - m.d) / 2.0);
    let q = at - center;
    if (a - b).abs() < EPSILON && q.length() < EPSILON {
        let angle = dir.y.atan2(dir.x);
        return center + dvec2(angle.cos(), angle.sin()) * a;
    }
    let qa = (dir.x / a).powi(2) + (dir.y / b).powi(2);
    let qb = 2.0 * (q.x * dir.x / (a * a) + q.y * dir.y / (b * b));
    let qc = (q.x / a).powi(2) + (q.y / b).powi(2) - 1.0;
    let disc = qb * qb - 4.0 * qa * qc;
    if qa < EPSILON || disc < 0.0 {
        return at;
    }
    let root = disc.sqrt();
    let s = [(-qb + root) / (2.0 * qa), (-qb - root) / (2.0 * qa)]
        .into_iter()
        .filter(|s| *s >= 0.0)
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))));
    match s {
        Some(s) => at + dir * s,
        None => at,
    }
}

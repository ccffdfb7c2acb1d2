//! `\ar` and `\PATH`: connections from `c` along waypoints to a target,
//! with tips, labels and curving.

use glam::DVec2;

use super::Interpreter;
use super::env::Env;
use super::object::stem_line;
use crate::ast::*;
use crate::curve::{Curve, ParamRange, Parametric};
use crate::errors::ExecutionError;
use crate::geometry::{EPSILON, Region};
use crate::log::debug;
use crate::shape::{Shape, StrokeStyle, TipShape};

type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Clone)]
struct ArrowStyle {
    tail: String,
    stem: String,
    head: String,
    strands: u8,
    /// Side and sagitta of `@/^d/`
    bend: Option<(Turn, f64)>,
    /// Offset along the left normal from `@<d>`
    slide: f64,
    /// Leaving and arriving angles of `@(d,d)`
    loop_angles: Option<(f64, f64)>,
}

impl ArrowStyle {
    fn plain(head: &str) -> Self {
        Self {
            tail: String::new(),
            stem: "-".into(),
            head: head.into(),
            strands: 1,
            bend: None,
            slide: 0.0,
            loop_angles: None,
        }
    }
}

fn tip_variant(strands: u8) -> DirVariant {
    match strands {
        2 => DirVariant::Double,
        3 => DirVariant::Triple,
        _ => DirVariant::Plain,
    }
}

/// One stretch of a path between consecutive stops.
struct Section<'a> {
    curve: Curve,
    from: Region,
    to: Region,
    /// `None` for the rounded corner of a `` ` `` stop
    segment: Option<&'a Segment>,
}

impl Interpreter<'_> {
    /// `\ar form* path`
    pub(crate) fn arrow(&mut self, env: &mut Env, forms: &[ArrowForm], path: &Path) -> Result<()> {
        let mut style = ArrowStyle::plain(">");
        for form in forms {
            match form {
                ArrowForm::Style { tail, stem, head } => {
                    style.tail = tail.clone();
                    style.stem = stem.clone();
                    style.head = head.clone();
                }
                ArrowForm::Curve { side, amount } => {
                    let amount = amount.map_or(self.metrics.curve_default, |d| self.em(d));
                    style.bend = Some((*side, amount));
                }
                ArrowForm::Slide(d) => style.slide = self.em(*d),
                ArrowForm::Loop { out, into } => {
                    let out = self.direction(env, out)?;
                    let into = self.direction(env, into)?;
                    style.loop_angles = Some((out, into));
                }
                ArrowForm::Variant(n) => style.strands = *n,
            }
        }
        self.run_path(env, path, &style)
    }

    /// `\PATH path`: a plain line without tips.
    pub(crate) fn path(&mut self, env: &mut Env, path: &Path) -> Result<()> {
        self.run_path(env, path, &ArrowStyle::plain(""))
    }

    fn run_path(&mut self, env: &mut Env, path: &Path, style: &ArrowStyle) -> Result<()> {
        let source = env.c;
        let mut local = env.clone();

        // Evaluate every stop first; each position starts from the last stop.
        let mut stops = Vec::with_capacity(path.segments.len());
        let mut last = source;
        for segment in &path.segments {
            local.p = source;
            local.c = last;
            self.pos(&mut local, &segment.pos)?;
            last = local.c;
            stops.push(last);
        }

        let sections = self.sections(source, &stops, path, style);
        let line = stem_line(&style.stem).map(|(line, strands)| StrokeStyle {
            line,
            strands: strands.max(style.strands),
            thickness: self.metrics.line_thickness,
        });
        let variant = tip_variant(line.map_or(style.strands, |l| l.strands));
        let label_margin = env
            .matrix
            .as_ref()
            .map_or(self.metrics.label_margin, |m| m.label_margin);

        let count = sections.len();
        for (i, section) in sections.into_iter().enumerate() {
            let Some(mut visible) = section.curve.shave(&section.from, &section.to, &self.options)
            else {
                continue;
            };
            let Some(segment) = section.segment else {
                if let Some(line) = line {
                    self.emit(Shape::stroke(visible, line));
                }
                continue;
            };
            if let Some(slide) = segment.slide {
                let total = visible.total_length();
                let wanted = (total + self.em(slide)).clamp(0.0, total);
                if wanted > EPSILON {
                    visible = visible.slice(0.0, visible.t_of_length(wanted));
                }
            }

            let mut holes = Vec::new();
            for label in &segment.labels {
                if let Some(hole) = self.label(&mut local, &visible, label, label_margin)? {
                    holes.push(hole);
                }
            }
            if let Some(line) = line {
                self.emit(Shape::stroke(visible.clone(), line).with_holes(&holes));
            }
            if i == 0 && !style.tail.is_empty() {
                self.emit(self.tip(&style.tail, variant, visible.start(), visible.angle(0.0)));
            }
            if i + 1 == count && !style.head.is_empty() {
                self.emit(self.tip(&style.head, variant, visible.end(), visible.angle(1.0)));
            }
        }
        Ok(())
    }

    /// Split the path at its stops, rounding the corners of `` ` `` stops.
    fn sections<'a>(
        &self,
        source: Region,
        stops: &[Region],
        path: &'a Path,
        style: &ArrowStyle,
    ) -> Vec<Section<'a>> {
        let mut points = Vec::with_capacity(stops.len() + 1);
        points.push(source.at());
        points.extend(stops.iter().map(Region::at));

        // Corner radius at every stop; the ends never round.
        let mut radii = vec![0.0; points.len()];
        for k in 1..path.segments.len() {
            if path.segments[k - 1].kind == SegmentKind::Turn {
                let incoming = (points[k] - points[k - 1]).length();
                let outgoing = (points[k + 1] - points[k]).length();
                radii[k] = self
                    .metrics
                    .turn_radius
                    .min(incoming / 2.0)
                    .min(outgoing / 2.0);
            }
        }

        let last = path.segments.len().saturating_sub(1);
        let mut sections = Vec::with_capacity(path.segments.len() * 2);
        for (i, segment) in path.segments.iter().enumerate() {
            let (a, b) = (points[i], points[i + 1]);
            let dir = (b - a).normalize_or_zero();
            let start = a + dir * radii[i];
            let end = b - dir * radii[i + 1];

            if radii[i] > EPSILON {
                // The rounded corner leading into this section.
                let before = points[i] - (points[i] - points[i - 1]).normalize_or_zero() * radii[i];
                sections.push(Section {
                    curve: Curve::through(before, &[points[i]], start),
                    from: Region::Point(before),
                    to: Region::Point(start),
                    segment: None,
                });
            }

            let curve = if i == last {
                self.shaped(start, end, style)
            } else {
                Curve::line(start, end)
            };
            sections.push(Section {
                curve,
                from: if i == 0 { source } else { Region::Point(start) },
                to: if i == last { stops[i] } else { Region::Point(end) },
                segment: Some(segment),
            });
        }
        sections
    }

    /// The final stretch with the arrow's curving, loop and slide applied.
    fn shaped(&self, a: DVec2, b: DVec2, style: &ArrowStyle) -> Curve {
        let normal = (b - a).normalize_or_zero().perp();
        let curve = if let Some((out, into)) = style.loop_angles {
            let reach = self.metrics.loop_size;
            let c1 = a + DVec2::from_angle(out) * reach;
            let c2 = b + DVec2::from_angle(into) * reach;
            Curve::through(a, &[c1, c2], b)
        } else if let Some((side, amount)) = style.bend {
            let n = match side {
                Turn::Anticlockwise => normal,
                Turn::Clockwise => -normal,
            };
            // A quadratic's midpoint sits halfway to its control point.
            Curve::through(a, &[(a + b) / 2.0 + n * amount * 2.0], b)
        } else {
            Curve::line(a, b)
        };
        if style.slide.abs() > EPSILON {
            curve.translated(normal * style.slide)
        } else {
            curve
        }
    }

    fn tip(&self, name: &str, variant: DirVariant, at: DVec2, angle: f64) -> Shape {
        Shape::Tip(TipShape {
            name: name.to_string(),
            variant,
            at,
            angle,
            size: self.metrics.tip_size,
        })
    }

    /// Draw one label on `curve`; a `|` label returns the stretch of the
    /// curve it covers.
    fn label(
        &mut self,
        env: &mut Env,
        curve: &Curve,
        label: &Label,
        margin: f64,
    ) -> Result<Option<ParamRange>> {
        let (start, end) = (Region::Point(curve.start()), Region::Point(curve.end()));
        let t = self.place_t(env, curve, &start, &end, &label.place)?;
        let point = curve.position(t);

        let mut inner = env.clone();
        inner.c = Region::Point(point);
        inner.angle = curve.angle(t);
        let (shape, frame) = self.object(&mut inner, &label.object)?;

        let left = DVec2::from_angle(curve.angle(t)).perp();
        let normal = match label.side {
            LabelSide::Above => left,
            LabelSide::Below => -left,
            LabelSide::At => {
                self.emit(shape.translated(point));
                return Ok(self.hole(curve, t, &frame.translated(point)));
            }
        };
        // Keep `margin` between the curve and the near edge of the frame.
        let reach = frame.edge_point(frame.at() - normal) - frame.at();
        self.emit(shape.translated(point + normal * margin - reach));
        Ok(None)
    }

    /// The part of `curve` hidden under a frame centred at `t`.
    fn hole(&self, curve: &Curve, t: f64, frame: &Region) -> Option<ParamRange> {
        if frame.is_point() {
            return None;
        }
        let crossings = curve.t_of_intersections(frame, &self.options);
        let bounds = frame.bounds();
        let half = bounds.width().max(bounds.height()) / 2.0;
        let s = curve.length(t);
        let before = crossings
            .iter()
            .rev()
            .find(|&&u| u < t)
            .copied()
            .unwrap_or_else(|| curve.t_of_length(s - half));
        let after = crossings
            .iter()
            .find(|&&u| u > t)
            .copied()
            .unwrap_or_else(|| curve.t_of_length(s + half));
        if after - before < EPSILON {
            debug!(t, "label hole is empty");
            return None;
        }
        Some(ParamRange::new(before, after))
    }
}

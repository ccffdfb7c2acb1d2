//! Objects: building them, dropping them at `c` and connecting `p` to `c`.
//!
//! Objects are built with their reference point at the origin and moved to
//! `c` when dropped. Modifiers act on the frame; the drawing follows the
//! reference point wherever the modifiers leave it.

use std::f64::consts::TAU;

use glam::{DVec2, dvec2};

use super::Interpreter;
use super::env::{Basis, Env};
use super::eval::corner_offset;
use crate::ast::*;
use crate::curve::{Arc, Curve, Parametric};
use crate::errors::ExecutionError;
use crate::geometry::{EPSILON, Margins, Region};
use crate::log::debug;
use crate::shape::{FrameShape, LineStyle, Shape, StrokeStyle, TextShape, TipShape};

type Result<T> = std::result::Result<T, ExecutionError>;

/// Line style and strand count of a connection stem, `None` for names that
/// are not stems.
pub(super) fn stem_line(name: &str) -> Option<(LineStyle, u8)> {
    Some(match name {
        "-" => (LineStyle::Solid, 1),
        "--" => (LineStyle::Dashed, 1),
        "." | ".." => (LineStyle::Dotted, 1),
        "~" | "~~" => (LineStyle::Squiggle, 1),
        "=" => (LineStyle::Solid, 2),
        "==" => (LineStyle::Dashed, 2),
        ":" | "::" => (LineStyle::Dotted, 2),
        _ => return None,
    })
}

pub(super) fn variant_strands(variant: DirVariant) -> u8 {
    match variant {
        DirVariant::Double => 2,
        DirVariant::Triple => 3,
        _ => 1,
    }
}

impl Interpreter<'_> {
    /// `* object`: draw it at `c`, which becomes the object.
    pub(crate) fn drop_object(&mut self, env: &mut Env, object: &Object) -> Result<()> {
        let at = env.c.at();
        let (shape, frame) = self.object(env, object)?;
        self.emit(shape.translated(at));
        env.c = frame.translated(at);
        Ok(())
    }

    /// `** object`: join `p` to `c`, trimmed to both frames.
    pub(crate) fn connect(&mut self, env: &mut Env, object: &Object) -> Result<()> {
        let (from, to) = (env.p, env.c);
        let curve = match &object.object {
            ObjectBox::Curve(controls) => {
                let points = self.control_points(env, controls)?;
                Curve::through(from.at(), &points, to.at())
            }
            _ => Curve::line(from.at(), to.at()),
        };
        env.last_curve = Some(curve.clone());
        env.angle = curve.angle(1.0);

        let Some(visible) = curve.shave(&from, &to, &self.options) else {
            return Ok(());
        };
        if visible.total_length() < EPSILON {
            debug!("connect: zero-length connection");
            return Ok(());
        }
        let thickness = self.metrics.line_thickness;
        let shape = match &object.object {
            ObjectBox::Dir { name, .. } if name.is_empty() => Shape::Empty,
            ObjectBox::Dir { variant, name } => match stem_line(name) {
                Some((line, strands)) => Shape::stroke(
                    visible,
                    StrokeStyle {
                        line,
                        strands: strands.max(variant_strands(*variant)),
                        thickness,
                    },
                ),
                None => self.repeat(env, object, &visible)?,
            },
            ObjectBox::Curve(_) => Shape::stroke(visible, StrokeStyle::solid(thickness)),
            _ => self.repeat(env, object, &visible)?,
        };
        self.emit(shape);
        Ok(())
    }

    /// Copies of `object` spaced evenly along `curve`.
    fn repeat(&mut self, env: &mut Env, object: &Object, curve: &Curve) -> Result<Shape> {
        let (shape, frame) = self.object(env, object)?;
        let extent = |w: f64, h: f64| w.max(h);
        let drawn = shape.bounds().map_or(0.0, |b| extent(b.width(), b.height()));
        let framed = frame.bounds();
        let step = drawn.max(extent(framed.width(), framed.height()));
        if step < EPSILON {
            debug!("connect: object has no extent to repeat");
            return Ok(Shape::Empty);
        }
        let length = curve.total_length();
        let count = ((length / step).floor() as usize).max(1);
        Ok(Shape::composite((0..count).map(|i| {
            let s = (i as f64 + 0.5) * length / count as f64;
            shape.translated(curve.position(curve.t_of_length(s)))
        })))
    }

    /// Control points of `\crv`, each position contributing every place it
    /// passes with `,` and where it ends.
    pub(crate) fn control_points(&mut self, env: &Env, controls: &[Pos]) -> Result<Vec<DVec2>> {
        let mut points = Vec::new();
        for pos in controls {
            let mut inner = env.clone();
            inner.capture = Some(Vec::new());
            self.pos(&mut inner, pos)?;
            points.extend(inner.capture.unwrap_or_default().iter().map(Region::at));
            points.push(inner.c.at());
        }
        Ok(points)
    }

    /// Build `object` with its reference point at the origin.
    pub(crate) fn object(&mut self, env: &mut Env, object: &Object) -> Result<(Shape, Region)> {
        let mut angle = env.angle;
        for modifier in &object.modifiers {
            if let Modifier::Direction(direction) = modifier {
                angle = self.direction(env, direction)?;
            }
        }
        let (mut shape, mut frame) = self.object_box(env, &object.object, angle)?;
        let original = frame.at();

        for modifier in &object.modifiers {
            match modifier {
                Modifier::Shift(v) => {
                    let v = self.vector(env, v)?;
                    frame = frame.shift_frame(v);
                }
                Modifier::ResetReference => frame = frame.shift_frame(original - frame.at()),
                Modifier::Grow(v) => {
                    let v = self.margin_change(env, v.as_ref())?;
                    frame = frame.grown(v);
                }
                Modifier::Shrink(v) => {
                    let v = self.margin_change(env, v.as_ref())?;
                    frame = frame.shrunk(v);
                }
                Modifier::Size(v) => {
                    let v = self.vector(env, v)?;
                    frame = frame.sized(v.x.abs(), v.y.abs());
                }
                Modifier::Shape(ShapeModifier::Circle) => frame = frame.to_circle(),
                Modifier::Shape(ShapeModifier::Frame(kind)) => {
                    let framed = Shape::Frame(FrameShape {
                        region: frame,
                        kind: *kind,
                        radius: 0.0,
                        thickness: self.metrics.line_thickness,
                    });
                    shape = Shape::composite([shape, framed]);
                }
                Modifier::Shape(edge) => {
                    let corner = match edge {
                        ShapeModifier::Left => Corner::CL,
                        ShapeModifier::Right => Corner::CR,
                        ShapeModifier::Up => Corner::CU,
                        ShapeModifier::Down => Corner::CD,
                        _ => Corner::A,
                    };
                    frame = frame.shift_frame(corner_offset(&frame, frame.at(), corner));
                }
                Modifier::Invisible => shape = Shape::Empty,
                Modifier::Hidden => {
                    shape = Shape::Empty;
                    frame = Region::Point(frame.at());
                }
                Modifier::Direction(_) => {}
            }
        }

        let back = -frame.at();
        Ok((shape.translated(back), frame.translated(back)))
    }

    /// Per-side change for `+`/`-`: the object margin, or half the vector.
    fn margin_change(&mut self, env: &mut Env, v: Option<&Vector>) -> Result<DVec2> {
        Ok(match v {
            Some(v) => self.vector(env, v)? / 2.0,
            None => DVec2::splat(self.metrics.object_margin),
        })
    }

    fn object_box(
        &mut self,
        env: &mut Env,
        object: &ObjectBox,
        angle: f64,
    ) -> Result<(Shape, Region)> {
        let thickness = self.metrics.line_thickness;
        Ok(match object {
            ObjectBox::Text(text) => self.text(text),
            ObjectBox::Txt(lines) => self.text_lines(lines),
            ObjectBox::Dir { name, .. } if name.is_empty() => (Shape::Empty, Region::default()),
            ObjectBox::Dir { variant, name } => (
                Shape::Tip(TipShape {
                    name: name.clone(),
                    variant: *variant,
                    at: DVec2::ZERO,
                    angle,
                    size: self.metrics.tip_size,
                }),
                Region::default(),
            ),
            ObjectBox::Cir { radius, arc } => {
                let r = match radius {
                    Some(v) => self.vector(env, v)?.x.abs(),
                    None if env.c.is_point() => {
                        return Err(ExecutionError::MissingAttribute {
                            object: "\\cir",
                            attribute: "a radius or an object to surround",
                        });
                    }
                    None => {
                        let m = env.c.margins();
                        m.width().max(m.height()) / 2.0
                    }
                };
                if !r.is_finite() || r < EPSILON {
                    debug!(r, "cir: degenerate radius, nothing drawn");
                    return Ok((Shape::Empty, Region::default()));
                }
                let arc = match *arc {
                    CirArc::Full => Arc::full(DVec2::ZERO, r),
                    CirArc::Arc {
                        from,
                        orientation,
                        to,
                    } => {
                        let start = from.degrees().to_radians();
                        let mut end = to.degrees().to_radians();
                        match orientation {
                            Turn::Anticlockwise => {
                                while end <= start {
                                    end += TAU;
                                }
                            }
                            Turn::Clockwise => {
                                while end >= start {
                                    end -= TAU;
                                }
                            }
                        }
                        Arc::new(DVec2::ZERO, r, start, end)
                    }
                };
                (
                    Shape::stroke(arc.into(), StrokeStyle::solid(thickness)),
                    Region::circle(DVec2::ZERO, r),
                )
            }
            ObjectBox::Frame { radius, kind } => {
                let radius = match radius {
                    Some(v) => self.vector(env, v)?.x.abs(),
                    None => 0.0,
                };
                let around = env.c.translated(-env.c.at());
                let region = match kind {
                    FrameKind::Circle | FrameKind::DoubleCircle if around.is_point() => {
                        Region::circle(DVec2::ZERO, radius)
                    }
                    FrameKind::Circle | FrameKind::DoubleCircle => around.to_circle(),
                    FrameKind::Ellipse => Region::ellipse(DVec2::ZERO, around.margins()),
                    _ => around,
                };
                (
                    Shape::Frame(FrameShape {
                        region,
                        kind: *kind,
                        radius,
                        thickness,
                    }),
                    region,
                )
            }
            ObjectBox::Object(inner) => self.object(env, inner)?,
            ObjectBox::Composite(parts) => {
                let mut shapes = Vec::with_capacity(parts.len());
                let mut frame = Region::default();
                for part in parts {
                    let (shape, part_frame) = self.object(env, part)?;
                    shapes.push(shape);
                    frame = frame.combine(&part_frame);
                }
                (Shape::composite(shapes), frame)
            }
            ObjectBox::XyBox(body) => {
                let mut inner = env.clone();
                inner.basis.origin = DVec2::ZERO;
                inner.p = Region::default();
                inner.c = Region::default();
                inner.last_curve = None;
                inner.matrix = None;
                let (shape, ()) = self.collect(|this| this.pos_decor(&mut inner, body))?;
                let frame = shape
                    .bounds()
                    .map_or(Region::default(), |b| b.to_region(DVec2::ZERO));
                (shape, frame)
            }
            ObjectBox::Curve(controls) => {
                let points = self.control_points(env, controls)?;
                let at = env.c.at();
                let curve = Curve::through(env.p.at(), &points, at).translated(-at);
                let frame = curve.bounding_box(0.0).to_region(DVec2::ZERO);
                (Shape::stroke(curve, StrokeStyle::solid(thickness)), frame)
            }
            ObjectBox::Import {
                width,
                height,
                x,
                y,
                body,
            } => {
                if width.abs() < EPSILON || height.abs() < EPSILON {
                    return Err(ExecutionError::DegenerateImport {
                        width: *width,
                        height: *height,
                    });
                }
                let extent = self.host.measure(body.handle);
                let (w, h) = (extent.width, extent.total_height());
                let unit_x = dvec2(w / width, 0.0);
                let unit_y = dvec2(0.0, h / height);
                let lower_left = env.c.at() - dvec2(w, h) / 2.0;
                env.basis = Basis {
                    origin: lower_left - unit_x * *x - unit_y * *y,
                    x: unit_x,
                    y: unit_y,
                };
                let shape = Shape::Text(TextShape {
                    handle: body.handle,
                    at: DVec2::ZERO,
                    extent,
                });
                let half = Margins::new(w / 2.0, w / 2.0, h / 2.0, h / 2.0);
                let frame = Region::rect(DVec2::ZERO, half);
                (shape, frame)
            }
            ObjectBox::Matrix(matrix) => self.matrix(env, matrix)?,
        })
    }

    /// A text node centred on the origin, framed with the object margin.
    fn text(&self, text: &TextBox) -> (Shape, Region) {
        let extent = self.host.measure(text.handle);
        let margin = self.metrics.object_margin;
        let half_w = extent.width / 2.0 + margin;
        let half_h = extent.total_height() / 2.0 + margin;
        (
            Shape::Text(TextShape {
                handle: text.handle,
                at: DVec2::ZERO,
                extent,
            }),
            Region::rect(DVec2::ZERO, Margins::new(half_w, half_w, half_h, half_h)),
        )
    }

    /// `\txt` lines stacked top to bottom, each centred horizontally.
    fn text_lines(&self, lines: &[TextBox]) -> (Shape, Region) {
        let extents: Vec<_> = lines.iter().map(|l| self.host.measure(l.handle)).collect();
        let total: f64 = extents.iter().map(|e| e.total_height()).sum();
        let width = extents.iter().map(|e| e.width).fold(0.0, f64::max);
        let mut top = total / 2.0;
        let shapes = lines.iter().zip(&extents).map(|(line, extent)| {
            let at = dvec2(0.0, top - extent.total_height() / 2.0);
            top -= extent.total_height();
            Shape::Text(TextShape {
                handle: line.handle,
                at,
                extent: *extent,
            })
        });
        let shape = Shape::composite(shapes.collect::<Vec<_>>());
        let margin = self.metrics.object_margin;
        let (half_w, half_h) = (width / 2.0 + margin, total / 2.0 + margin);
        (
            shape,
            Region::rect(DVec2::ZERO, Margins::new(half_w, half_w, half_h, half_h)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use crate::host::MonospaceHost;
    use crate::parse::parse;
    use crate::types::Metrics;

    fn metrics() -> Metrics {
        Metrics::default().with_base_unit(1.0).unwrap()
    }

    fn run(source: &str) -> (Shape, Env) {
        let host = MonospaceHost::new();
        let pd = parse(source, &host).unwrap();
        let mut interp = Interpreter::new(&host, metrics());
        let mut env = interp.env();
        let shape = interp.run(&mut env, &pd).unwrap();
        (shape, env)
    }

    fn strokes(shape: &Shape) -> Vec<&crate::shape::StrokeShape> {
        match shape {
            Shape::Stroke(s) => vec![s],
            Shape::Composite(children) => children.iter().flat_map(strokes).collect(),
            _ => vec![],
        }
    }

    fn texts(shape: &Shape) -> Vec<&TextShape> {
        match shape {
            Shape::Text(t) => vec![t],
            Shape::Composite(children) => children.iter().flat_map(texts).collect(),
            _ => vec![],
        }
    }

    fn close(a: DVec2, b: DVec2) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    // ========================================================================
    // Drop tests
    // ========================================================================

    #[test]
    fn text_frame_surrounds_the_text() {
        // "AB": 1em wide, 0.9em tall, object margin 0.3em
        let (shape, env) = run("(2,2)*{AB}");
        let m = env.c.margins();
        assert_eq!(env.c.at(), dvec2(2.0, 2.0));
        assert!((m.l - 0.8).abs() < 1e-12 && (m.r - 0.8).abs() < 1e-12);
        assert!((m.u - 0.75).abs() < 1e-12 && (m.d - 0.75).abs() < 1e-12);
        assert_eq!(texts(&shape)[0].at, dvec2(2.0, 2.0));
    }

    #[test]
    fn txt_lines_stack_downwards() {
        let (shape, env) = run("*\\txt{A\\\\BB}");
        let t = texts(&shape);
        assert_eq!(t.len(), 2);
        assert!(t[0].at.y > t[1].at.y);
        assert!((env.c.margins().u - (0.9 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn invisible_and_hidden() {
        let (shape, env) = run("*i{A}");
        assert!(shape.is_empty());
        assert!(!env.c.is_point());
        let (shape, env) = run("*h{A}");
        assert!(shape.is_empty());
        assert!(env.c.is_point());
    }

    #[test]
    fn grow_shrink_and_size() {
        let (_, env) = run("*+{A}");
        assert!((env.c.margins().l - (0.25 + 0.6)).abs() < 1e-12);
        let (_, env) = run("*-{A}");
        assert!((env.c.margins().l - 0.25).abs() < 1e-12);
        let (_, env) = run("*=(4,2){A}");
        let b = env.c.bounds();
        assert!((b.width() - 4.0).abs() < 1e-12 && (b.height() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn edge_modifiers_move_the_drawing() {
        // The left edge lands on c, so the text centre moves right.
        let (shape, env) = run("(0,0)*[l]{AB}");
        assert!(close(texts(&shape)[0].at, dvec2(0.8, 0.0)));
        assert_eq!(env.c.at(), DVec2::ZERO);
        assert!(env.c.margins().l.abs() < 1e-12);
    }

    #[test]
    fn shift_and_reset_reference() {
        let (shape, _) = run("(0,0)*!(0,1){A}");
        assert!(close(texts(&shape)[0].at, dvec2(0.0, -1.0)));
        let (shape, _) = run("(0,0)*!(0,1)!{A}");
        assert!(close(texts(&shape)[0].at, DVec2::ZERO));
    }

    #[test]
    fn circle_modifier_and_frame() {
        let (shape, env) = run("*[o][F]{AB}");
        assert!(matches!(env.c, Region::Ellipse { .. }));
        let frames = match &shape {
            Shape::Composite(children) => children
                .iter()
                .filter(|c| matches!(c, Shape::Frame(_)))
                .count(),
            _ => 0,
        };
        assert_eq!(frames, 1);
    }

    #[test]
    fn cir_uses_the_given_radius() {
        let (shape, env) = run("(1,0)*\\cir<2em>{}");
        let b = shape.bounds().unwrap();
        assert!(b.approx_eq(&Bounds::new(dvec2(-1.0, -2.0), dvec2(3.0, 2.0)), 0.05));
        assert!(matches!(env.c, Region::Ellipse { .. }));
    }

    #[test]
    fn cir_arc_sweeps_the_requested_way() {
        let (shape, _) = run("*\\cir<1em>{r^l}");
        let s = strokes(&shape);
        assert!(s[0].curve.position(0.5).y > 0.9);
        let (shape, _) = run("*\\cir<1em>{r_l}");
        let s = strokes(&shape);
        assert!(s[0].curve.position(0.5).y < -0.9);
    }

    #[test]
    fn cir_without_radius_needs_an_object() {
        let host = MonospaceHost::new();
        let pd = parse("(0,0)*\\cir{}", &host).unwrap();
        let mut interp = Interpreter::new(&host, metrics());
        let mut env = interp.env();
        assert!(matches!(
            interp.run(&mut env, &pd),
            Err(ExecutionError::MissingAttribute { .. })
        ));
        // Surrounding an object takes its size.
        let (shape, _) = run("*{AB}*\\cir{}");
        assert_eq!(strokes(&shape).len(), 1);
    }

    #[test]
    fn composite_frames_combine() {
        let (_, env) = run("*\\composite{{A}*!(0,-1){B}}");
        let b = env.c.bounds();
        assert!(b.height() > 1.5);
    }

    #[test]
    fn xybox_is_placed_at_c() {
        let (shape, env) = run("(5,0)*\\xybox{(0,0);(2,0)**\\dir{-}}");
        let s = strokes(&shape);
        assert_eq!(s.len(), 1);
        assert!(close(s[0].curve.start(), dvec2(5.0, 0.0)));
        assert!(close(s[0].curve.end(), dvec2(7.0, 0.0)));
        // stroke padding widens across the line, never past its ends
        assert!((env.c.bounds().width() - 2.0).abs() < 1e-9);
        assert!(env.c.bounds().height() > 0.0);
    }

    #[test]
    fn import_sets_up_graphic_coordinates() {
        // "AAAA" is 2em wide and 0.9em tall; (0,0) is its lower left corner.
        let (_, env) = run("(0,0)*\\xyimport(4,3)(0,0){AAAA}");
        assert!(close(env.basis.point(0.0, 0.0), dvec2(-1.0, -0.45)));
        assert!(close(env.basis.point(4.0, 3.0), dvec2(1.0, 0.45)));
    }

    #[test]
    fn zero_sized_import_fails() {
        let host = MonospaceHost::new();
        let pd = parse("*\\xyimport(0,3)(0,0){A}", &host).unwrap();
        let mut interp = Interpreter::new(&host, metrics());
        let mut env = interp.env();
        assert_eq!(
            interp.run(&mut env, &pd).unwrap_err(),
            ExecutionError::DegenerateImport {
                width: 0.0,
                height: 3.0
            }
        );
    }

    // ========================================================================
    // Connect tests
    // ========================================================================

    #[test]
    fn connection_is_trimmed_to_both_frames() {
        let (shape, env) = run("(0,0)*{A};(10,0)*{A}**\\dir{-}");
        let s = strokes(&shape);
        assert_eq!(s.len(), 1);
        assert!(close(s[0].curve.start(), dvec2(0.55, 0.0)));
        assert!(close(s[0].curve.end(), dvec2(9.45, 0.0)));
        assert_eq!(s[0].style.line, LineStyle::Solid);
        // c is untouched, the curve is remembered
        assert_eq!(env.c.at(), dvec2(10.0, 0.0));
        assert!(env.last_curve.is_some());
    }

    #[test]
    fn stems_pick_line_styles() {
        for (stem, line, strands) in [
            ("--", LineStyle::Dashed, 1),
            (".", LineStyle::Dotted, 1),
            ("~", LineStyle::Squiggle, 1),
            ("=", LineStyle::Solid, 2),
            (":", LineStyle::Dotted, 2),
        ] {
            let (shape, _) = run(&format!("(0,0);(5,0)**\\dir{{{stem}}}"));
            let s = strokes(&shape);
            assert_eq!(s[0].style.line, line, "stem {stem}");
            assert_eq!(s[0].style.strands, strands, "stem {stem}");
        }
        let (shape, _) = run("(0,0);(5,0)**\\dir3{-}");
        assert_eq!(strokes(&shape)[0].style.strands, 3);
    }

    #[test]
    fn empty_dir_connects_invisibly() {
        let (shape, env) = run("(0,0);(5,0)**\\dir{}");
        assert!(shape.is_empty());
        assert!(env.last_curve.is_some());
    }

    #[test]
    fn overlapping_objects_draw_nothing() {
        let (shape, _) = run("(0,0)*{AAAA};(0.5,0)*{AAAA}**\\dir{-}");
        assert!(shape.bounds().is_some());
        assert!(strokes(&shape).is_empty());
    }

    #[test]
    fn crv_connects_through_control_points() {
        let (shape, _) = run("(0,0);(10,0)**\\crv{(5,5)}");
        let s = strokes(&shape);
        assert_eq!(s[0].curve.kind(), "quadratic");
        assert!(close(s[0].curve.position(0.5), dvec2(5.0, 2.5)));
    }

    #[test]
    fn crv_control_lists_capture_commas() {
        let (shape, _) = run("(0,0);(10,0)**\\crv{(2,4),(8,4)}");
        assert_eq!(strokes(&shape)[0].curve.kind(), "cubic");
    }

    #[test]
    fn other_objects_are_repeated() {
        let (shape, _) = run("(0,0);(10,0)**{A}");
        // "A" is 1.5em tall with its margins
        assert_eq!(texts(&shape).len(), 6);
    }

    #[test]
    fn place_follows_the_last_connection() {
        let (_, env) = run("(0,0);(10,0)**\\crv{(5,10)}?(.5)");
        assert!(close(env.c.at(), dvec2(5.0, 5.0)));
        assert!(env.angle.abs() < 1e-9);
    }
}

//! Drawable output: an immutable tree of strokes, text, tips and frames.
//!
//! A renderer walks the tree through [`Painter`]. Strokes carry hole ranges
//! (parameter intervals left undrawn, used where a label interrupts a
//! line); holes are only applied when the shape is painted.

use glam::{DVec2, dvec2};

use crate::ast::{DirVariant, FrameKind};
use crate::curve::{Curve, ParamRange, Parametric};
use crate::geometry::{Bounds, EPSILON, Region};
use crate::host::{TextExtent, TextHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
    Squiggle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub line: LineStyle,
    /// Parallel strands (`\dir2`, `\dir3`)
    pub strands: u8,
    pub thickness: f64,
}

impl StrokeStyle {
    pub fn solid(thickness: f64) -> Self {
        Self {
            line: LineStyle::Solid,
            strands: 1,
            thickness,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrokeShape {
    pub curve: Curve,
    pub style: StrokeStyle,
    holes: Vec<ParamRange>,
}

impl StrokeShape {
    pub fn new(curve: Curve, style: StrokeStyle) -> Self {
        Self {
            curve,
            style,
            holes: Vec::new(),
        }
    }

    pub fn holes(&self) -> &[ParamRange] {
        &self.holes
    }

    /// Add holes, keeping the set sorted and disjoint.
    pub fn with_holes(mut self, holes: impl IntoIterator<Item = ParamRange>) -> Self {
        let mut all: Vec<ParamRange> = self
            .holes
            .into_iter()
            .chain(holes)
            .map(|h| ParamRange::new(h.min.clamp(0.0, 1.0), h.max.clamp(0.0, 1.0)))
            .collect();
        all.sort_by(|a, b| a.min.total_cmp(&b.min));
        let mut merged: Vec<ParamRange> = Vec::with_capacity(all.len());
        for hole in all {
            match merged.last_mut() {
                Some(last) if hole.min <= last.max => last.max = last.max.max(hole.max),
                _ => merged.push(hole),
            }
        }
        self.holes = merged;
        self
    }

    /// Parameter ranges left to draw once the holes are cut out.
    pub fn visible_ranges(&self) -> Vec<ParamRange> {
        let mut ranges = Vec::new();
        let mut from = 0.0;
        for hole in &self.holes {
            if hole.min - from > EPSILON {
                ranges.push(ParamRange::new(from, hole.min));
            }
            from = from.max(hole.max);
        }
        if 1.0 - from > EPSILON {
            ranges.push(ParamRange::new(from, 1.0));
        }
        ranges
    }
}

/// A typeset text node, centred on `at`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextShape {
    pub handle: TextHandle,
    pub at: DVec2,
    pub extent: TextExtent,
}

/// An arrow tip or `\dir` glyph pointing along `angle`.
#[derive(Debug, Clone, PartialEq)]
pub struct TipShape {
    pub name: String,
    pub variant: DirVariant,
    pub at: DVec2,
    pub angle: f64,
    pub size: f64,
}

/// A frame drawn around a region (`\frm`, `[F]`).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameShape {
    pub region: Region,
    pub kind: FrameKind,
    pub radius: f64,
    pub thickness: f64,
}

#[derive(Debug, Clone, Default)]
pub enum Shape {
    #[default]
    Empty,
    Composite(Vec<Shape>),
    Stroke(StrokeShape),
    Text(TextShape),
    Tip(TipShape),
    Frame(FrameShape),
}

/// Receives the drawing calls of [`Shape::paint`].
pub trait Painter {
    /// A visible stretch of a stroke, holes already removed.
    fn stroke(&mut self, curve: &Curve, style: &StrokeStyle);
    fn text(&mut self, text: &TextShape);
    fn tip(&mut self, tip: &TipShape);
    fn frame(&mut self, frame: &FrameShape);
}

impl Shape {
    /// Group shapes, dropping empty ones.
    pub fn composite(shapes: impl IntoIterator<Item = Shape>) -> Shape {
        let mut children: Vec<Shape> = shapes
            .into_iter()
            .filter(|s| !matches!(s, Shape::Empty))
            .collect();
        match children.len() {
            0 => Shape::Empty,
            1 => children.pop().unwrap_or_default(),
            _ => Shape::Composite(children),
        }
    }

    pub fn stroke(curve: Curve, style: StrokeStyle) -> Shape {
        Shape::Stroke(StrokeShape::new(curve, style))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Empty => true,
            Shape::Composite(children) => children.iter().all(Shape::is_empty),
            _ => false,
        }
    }

    /// Union of everything drawn; `None` for an empty tree.
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Shape::Empty => None,
            Shape::Composite(children) => children
                .iter()
                .filter_map(Shape::bounds)
                .reduce(Bounds::union),
            Shape::Stroke(s) => Some(s.curve.bounding_box(s.style.thickness / 2.0)),
            Shape::Text(t) => {
                let half = dvec2(t.extent.width, t.extent.total_height()) / 2.0;
                Some(Bounds::new(t.at - half, t.at + half))
            }
            Shape::Tip(t) => Some(Bounds::point(t.at).padded(t.size / 2.0)),
            Shape::Frame(f) => Some(f.region.bounds().padded(f.thickness / 2.0)),
        }
    }

    /// Cut holes into every stroke in the tree.
    pub fn with_holes(self, holes: &[ParamRange]) -> Shape {
        match self {
            Shape::Stroke(s) => Shape::Stroke(s.with_holes(holes.iter().copied())),
            Shape::Composite(children) => Shape::Composite(
                children.into_iter().map(|c| c.with_holes(holes)).collect(),
            ),
            other => other,
        }
    }

    pub fn translated(&self, v: DVec2) -> Shape {
        match self {
            Shape::Empty => Shape::Empty,
            Shape::Composite(children) => {
                Shape::Composite(children.iter().map(|c| c.translated(v)).collect())
            }
            Shape::Stroke(s) => Shape::Stroke(StrokeShape {
                curve: s.curve.translated(v),
                style: s.style,
                holes: s.holes.clone(),
            }),
            Shape::Text(t) => Shape::Text(TextShape {
                at: t.at + v,
                ..t.clone()
            }),
            Shape::Tip(t) => Shape::Tip(TipShape {
                at: t.at + v,
                ..t.clone()
            }),
            Shape::Frame(f) => Shape::Frame(FrameShape {
                region: f.region.translated(v),
                ..f.clone()
            }),
        }
    }

    /// Hand every primitive to `painter`, slicing strokes around their holes.
    pub fn paint(&self, painter: &mut dyn Painter) {
        match self {
            Shape::Empty => {}
            Shape::Composite(children) => {
                for child in children {
                    child.paint(painter);
                }
            }
            Shape::Stroke(s) => {
                for range in s.visible_ranges() {
                    painter.stroke(&s.curve.slice(range.min, range.max), &s.style);
                }
            }
            Shape::Text(t) => painter.text(t),
            Shape::Tip(t) => painter.tip(t),
            Shape::Frame(f) => painter.frame(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        strokes: Vec<(DVec2, DVec2)>,
        texts: usize,
        tips: usize,
        frames: usize,
    }

    impl Painter for Recorder {
        fn stroke(&mut self, curve: &Curve, _style: &StrokeStyle) {
            self.strokes.push((curve.start(), curve.end()));
        }

        fn text(&mut self, _text: &TextShape) {
            self.texts += 1;
        }

        fn tip(&mut self, _tip: &TipShape) {
            self.tips += 1;
        }

        fn frame(&mut self, _frame: &FrameShape) {
            self.frames += 1;
        }
    }

    fn line(x0: f64, x1: f64) -> Shape {
        Shape::stroke(
            Curve::line(dvec2(x0, 0.0), dvec2(x1, 0.0)),
            StrokeStyle::solid(0.0),
        )
    }

    #[test]
    fn composite_bounds_are_the_union() {
        let text = Shape::Text(TextShape {
            handle: TextHandle(0),
            at: dvec2(0.0, 5.0),
            extent: TextExtent {
                width: 2.0,
                height: 0.7,
                depth: 0.3,
            },
        });
        let shape = Shape::composite([line(0.0, 10.0), text, Shape::Empty]);
        let b = shape.bounds().unwrap();
        assert!(b.approx_eq(&Bounds::new(dvec2(-1.0, 0.0), dvec2(10.0, 5.5)), 1e-12));
        assert!(Shape::composite([Shape::Empty]).bounds().is_none());
    }

    #[test]
    fn holes_merge_into_disjoint_ranges() {
        let Shape::Stroke(s) = line(0.0, 10.0) else {
            unreachable!()
        };
        let s = s.with_holes([
            ParamRange::new(0.6, 0.7),
            ParamRange::new(0.2, 0.4),
            ParamRange::new(0.35, 0.5),
        ]);
        assert_eq!(
            s.holes(),
            &[ParamRange::new(0.2, 0.5), ParamRange::new(0.6, 0.7)]
        );
        assert_eq!(
            s.visible_ranges(),
            vec![
                ParamRange::new(0.0, 0.2),
                ParamRange::new(0.5, 0.6),
                ParamRange::new(0.7, 1.0)
            ]
        );
    }

    #[test]
    fn painting_skips_holes() {
        let shape = Shape::composite([
            line(0.0, 10.0).with_holes(&[ParamRange::new(0.4, 0.6)]),
            Shape::Tip(TipShape {
                name: ">".into(),
                variant: DirVariant::Plain,
                at: dvec2(10.0, 0.0),
                angle: 0.0,
                size: 0.5,
            }),
        ]);
        let mut recorder = Recorder::default();
        shape.paint(&mut recorder);
        assert_eq!(recorder.strokes.len(), 2);
        assert!(recorder.strokes[0].1.abs_diff_eq(dvec2(4.0, 0.0), 1e-12));
        assert!(recorder.strokes[1].0.abs_diff_eq(dvec2(6.0, 0.0), 1e-12));
        assert_eq!(recorder.tips, 1);
        assert_eq!(recorder.texts + recorder.frames, 0);
    }

    #[test]
    fn a_hole_over_everything_draws_nothing() {
        let shape = line(0.0, 1.0).with_holes(&[ParamRange::new(0.0, 1.0)]);
        let mut recorder = Recorder::default();
        shape.paint(&mut recorder);
        assert!(recorder.strokes.is_empty());
        // Bounds still report the undrawn stroke.
        assert!(shape.bounds().is_some());
    }

    #[test]
    fn translation_moves_every_part() {
        let shape = Shape::composite([line(0.0, 1.0), line(2.0, 3.0)]);
        let moved = shape.translated(dvec2(1.0, 1.0));
        let b = moved.bounds().unwrap();
        assert!(b.approx_eq(&Bounds::new(dvec2(1.0, 1.0), dvec2(4.0, 1.0)), 1e-12));
    }
}

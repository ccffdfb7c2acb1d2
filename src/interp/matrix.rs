//! `\xymatrix` layout.
//!
//! Entries are measured first, then placed on a grid whose column and row
//! widths are the widest entries in them plus the separations. Entry
//! `(1,1)` sits at the reference point and every entry is saved as
//! `"row,column"` before any entry decoration runs, so decorations can
//! refer to entries on either side of them.

use std::rc::Rc;

use glam::{DVec2, dvec2};

use super::Interpreter;
use super::env::{Env, MatrixCursor, Saved};
use crate::ast::*;
use crate::errors::ExecutionError;
use crate::geometry::{Bounds, EPSILON, Region};
use crate::log::debug;
use crate::shape::Shape;
use crate::types::Dimension;

type Result<T> = std::result::Result<T, ExecutionError>;

/// Matrix setup after applying every `@` switch in order.
#[derive(Debug, Clone)]
struct Layout {
    row_sep: f64,
    col_sep: f64,
    equal_rows: bool,
    equal_cols: bool,
    ignore_sizes: bool,
    /// Change of every entry margin relative to the object margin
    margin_delta: f64,
    width: Option<f64>,
    height: Option<f64>,
    label_margin: f64,
    modifiers: Vec<Modifier>,
}

fn adjusted(current: f64, adjust: Adjust, amount: f64) -> f64 {
    match adjust {
        Adjust::Set => amount,
        Adjust::Add => current + amount,
        Adjust::Sub => current - amount,
    }
}

impl Interpreter<'_> {
    fn layout(&self, setup: &[MatrixSetup]) -> Layout {
        let em = |d: &Dimension| self.em(*d);
        let mut layout = Layout {
            row_sep: self.metrics.row_sep,
            col_sep: self.metrics.col_sep,
            equal_rows: false,
            equal_cols: false,
            ignore_sizes: false,
            margin_delta: 0.0,
            width: None,
            height: None,
            label_margin: self.metrics.label_margin,
            modifiers: Vec::new(),
        };
        let margin = self.metrics.object_margin;
        for switch in setup {
            match switch {
                MatrixSetup::Spacing {
                    axis,
                    adjust,
                    amount,
                } => {
                    let amount = em(amount);
                    if matches!(axis, Axis::Rows | Axis::Both) {
                        layout.row_sep = adjusted(layout.row_sep, *adjust, amount);
                    }
                    if matches!(axis, Axis::Columns | Axis::Both) {
                        layout.col_sep = adjusted(layout.col_sep, *adjust, amount);
                    }
                }
                MatrixSetup::Equal(axis) => {
                    layout.equal_rows |= matches!(axis, Axis::Rows | Axis::Both);
                    layout.equal_cols |= matches!(axis, Axis::Columns | Axis::Both);
                }
                MatrixSetup::IgnoreEntrySizes => layout.ignore_sizes = true,
                MatrixSetup::EntryMargin(adjust, d) => {
                    let current = margin + layout.margin_delta;
                    layout.margin_delta = adjusted(current, *adjust, em(d)) - margin;
                }
                MatrixSetup::EntryWidth(adjust, d) => {
                    layout.width = Some(adjusted(layout.width.unwrap_or(0.0), *adjust, em(d)));
                }
                MatrixSetup::EntryHeight(adjust, d) => {
                    layout.height = Some(adjusted(layout.height.unwrap_or(0.0), *adjust, em(d)));
                }
                MatrixSetup::LabelMargin(adjust, d) => {
                    layout.label_margin = adjusted(layout.label_margin, *adjust, em(d));
                }
                MatrixSetup::EntryModifiers(modifiers) => {
                    layout.modifiers.extend(modifiers.iter().cloned());
                }
            }
        }
        layout
    }

    /// Build one entry at the origin.
    fn entry(&mut self, env: &Env, entry: &Entry, layout: &Layout) -> Result<(Shape, Region)> {
        let Some(object) = &entry.object else {
            return Ok((Shape::Empty, Region::default()));
        };
        let mut object = object.clone();
        object.modifiers.extend(layout.modifiers.iter().cloned());

        let mut probe = env.clone();
        probe.p = Region::default();
        probe.c = Region::default();
        probe.matrix = None;
        let (shape, mut frame) = self.object(&mut probe, &object)?;

        if layout.ignore_sizes {
            return Ok((shape, Region::Point(frame.at())));
        }
        if layout.margin_delta.abs() > EPSILON && !frame.is_point() {
            frame = frame.grown(dvec2(layout.margin_delta, layout.margin_delta));
        }
        if layout.width.is_some() || layout.height.is_some() {
            let b = frame.bounds();
            frame = frame.sized(
                layout.width.unwrap_or(b.width()),
                layout.height.unwrap_or(b.height()),
            );
        }
        Ok((shape, frame))
    }

    /// Lay out `matrix` with entry (1,1) at the origin. Entries are saved
    /// relative to the current `c`, where the matrix is being dropped.
    pub(crate) fn matrix(&mut self, env: &mut Env, matrix: &Matrix) -> Result<(Shape, Region)> {
        let layout = self.layout(&matrix.setup);
        let rows = matrix.rows.len();
        let cols = matrix.rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut built = Vec::with_capacity(rows);
        for row in &matrix.rows {
            let mut cells = Vec::with_capacity(cols);
            for entry in row {
                cells.push(self.entry(env, entry, &layout)?);
            }
            built.push(cells);
        }

        // Widest reach of any entry left and right of each column, above
        // and below each row.
        let mut left = vec![0.0f64; cols];
        let mut right = vec![0.0f64; cols];
        let mut up = vec![0.0f64; rows];
        let mut down = vec![0.0f64; rows];
        for (i, cells) in built.iter().enumerate() {
            for (j, (_, frame)) in cells.iter().enumerate() {
                let m = frame.margins();
                left[j] = left[j].max(m.l);
                right[j] = right[j].max(m.r);
                up[i] = up[i].max(m.u);
                down[i] = down[i].max(m.d);
            }
        }
        if layout.equal_cols {
            let widest = left.iter().chain(&right).fold(0.0f64, |a, &b| a.max(b));
            left.fill(widest);
            right.fill(widest);
        }
        if layout.equal_rows {
            let tallest = up.iter().chain(&down).fold(0.0f64, |a, &b| a.max(b));
            up.fill(tallest);
            down.fill(tallest);
        }

        let mut xs = vec![0.0; cols];
        for j in 1..cols {
            xs[j] = xs[j - 1] + right[j - 1] + layout.col_sep + left[j];
        }
        let mut ys = vec![0.0; rows];
        for i in 1..rows {
            ys[i] = ys[i - 1] - (down[i - 1] + layout.row_sep + up[i]);
        }

        let origin = env.c.at();
        let mut shapes = Vec::new();
        let mut grid = vec![Vec::with_capacity(cols); rows];
        for (i, cells) in built.iter().enumerate() {
            for j in 0..cols {
                let local = dvec2(xs[j], ys[i]);
                match cells.get(j) {
                    Some((shape, frame)) => {
                        shapes.push(shape.translated(local));
                        grid[i].push(frame.translated(local + origin));
                    }
                    None => grid[i].push(Region::Point(local + origin)),
                }
            }
        }
        for (i, cells) in grid.iter().enumerate() {
            for (j, frame) in cells.iter().enumerate() {
                env.saved
                    .insert(format!("{},{}", i + 1, j + 1), Saved::Position(*frame));
            }
        }
        debug!(rows, cols, "matrix laid out");

        let bounds = grid
            .iter()
            .flatten()
            .map(Region::bounds)
            .reduce(Bounds::union)
            .map(|b| b.translated(-origin));
        let grid = Rc::new(grid);

        for (i, row) in matrix.rows.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                if entry.decor.commands.is_empty() {
                    continue;
                }
                let here = grid[i][j];
                let mut inner = env.clone();
                inner.p = here;
                inner.c = here;
                inner.last_curve = None;
                inner.matrix = Some(MatrixCursor {
                    row: i,
                    col: j,
                    grid: Rc::clone(&grid),
                    label_margin: layout.label_margin,
                });
                let (shape, ()) = self.collect(|this| this.decor(&mut inner, &entry.decor))?;
                shapes.push(shape.translated(-origin));
            }
        }

        let frame = bounds.map_or(Region::default(), |b| b.to_region(DVec2::ZERO));
        Ok((Shape::composite(shapes), frame))
    }
}

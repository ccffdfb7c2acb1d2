//! Interpreter state.
//!
//! An [`Env`] is everything a position or decoration can read or change:
//! the previous and current objects `p` and `c`, the coordinate basis, the
//! current direction, saved names and the position stack. Groups, entries
//! and paths work on clones, so nothing inside them leaks out unless the
//! caller copies it back.

use std::collections::HashMap;
use std::rc::Rc;

use glam::{DVec2, dvec2};

use crate::ast::{Coord, Hop};
use crate::curve::Curve;
use crate::errors::ExecutionError;
use crate::geometry::{EPSILON, Region};
use crate::log::trace;

/// The coordinate system `(x,y)` vectors are read in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub origin: DVec2,
    pub x: DVec2,
    pub y: DVec2,
}

impl Basis {
    /// Orthogonal basis at the origin with both axes `unit` long.
    pub fn new(unit: f64) -> Self {
        Self {
            origin: DVec2::ZERO,
            x: dvec2(unit, 0.0),
            y: dvec2(0.0, unit),
        }
    }

    pub fn vector(&self, x: f64, y: f64) -> DVec2 {
        self.x * x + self.y * y
    }

    pub fn point(&self, x: f64, y: f64) -> DVec2 {
        self.origin + self.vector(x, y)
    }

    /// Coordinates of `p` in this basis, `None` when the axes are parallel.
    pub fn solve(&self, p: DVec2) -> Option<DVec2> {
        let det = self.x.perp_dot(self.y);
        if det.abs() < EPSILON {
            return None;
        }
        let d = p - self.origin;
        Some(dvec2(d.perp_dot(self.y) / det, self.x.perp_dot(d) / det))
    }
}

/// A value stored under a name with `=`.
#[derive(Debug, Clone)]
pub enum Saved {
    Position(Region),
    /// `= coord "id"`: re-evaluated at every use
    Macro(Coord),
    Base(Basis),
    Stack(Vec<Region>),
}

impl Saved {
    pub fn kind(&self) -> &'static str {
        match self {
            Saved::Position(_) => "position",
            Saved::Macro(_) => "coordinate",
            Saved::Base(_) => "base",
            Saved::Stack(_) => "stack",
        }
    }
}

/// Where an entry's decorations run inside a matrix.
#[derive(Debug, Clone)]
pub struct MatrixCursor {
    pub row: usize,
    pub col: usize,
    /// Entry frames in absolute coordinates, one row per line
    pub grid: Rc<Vec<Vec<Region>>>,
    pub label_margin: f64,
}

impl MatrixCursor {
    /// Follow `hops` from the current entry.
    pub fn hop(&self, hops: &[Hop]) -> Result<Region, ExecutionError> {
        let (mut row, mut col) = (self.row as isize, self.col as isize);
        for hop in hops {
            match hop {
                Hop::Up => row -= 1,
                Hop::Down => row += 1,
                Hop::Left => col -= 1,
                Hop::Right => col += 1,
            }
        }
        let missing = ExecutionError::NoSuchEntry {
            row: row + 1,
            column: col + 1,
        };
        if row < 0 || col < 0 {
            return Err(missing);
        }
        self.grid
            .get(row as usize)
            .and_then(|cells| cells.get(col as usize))
            .copied()
            .ok_or(missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseAxis {
    X,
    Y,
}

#[derive(Debug, Clone)]
pub struct Env {
    pub basis: Basis,
    pub p: Region,
    pub c: Region,
    /// Current direction, radians anticlockwise from the x axis
    pub angle: f64,
    /// The most recent connection, for `?` places
    pub last_curve: Option<Curve>,
    pub saved: HashMap<String, Saved>,
    pub stack: Vec<Region>,
    /// Active `@=` buffer that `,` appends to
    pub capture: Option<Vec<Region>>,
    pub matrix: Option<MatrixCursor>,
    frames: Vec<Vec<Region>>,
    saved_states: Vec<Env>,
}

impl Env {
    pub fn new(base_unit: f64) -> Self {
        Self {
            basis: Basis::new(base_unit),
            p: Region::default(),
            c: Region::default(),
            angle: 0.0,
            last_curve: None,
            saved: HashMap::new(),
            stack: Vec::new(),
            capture: None,
            matrix: None,
            frames: Vec::new(),
            saved_states: Vec::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&Saved, ExecutionError> {
        self.saved
            .get(name)
            .ok_or_else(|| ExecutionError::UndefinedPosition {
                name: name.to_string(),
            })
    }

    pub fn push(&mut self, region: Region) {
        self.stack.push(region);
    }

    pub fn pop(&mut self) -> Result<Region, ExecutionError> {
        self.stack.pop().ok_or(ExecutionError::EmptyStack)
    }

    /// `s<n>`: the n-th entry counted from the top of the stack.
    pub fn stack_position(&self, n: usize) -> Result<Region, ExecutionError> {
        let len = self.stack.len();
        if n >= len {
            return Err(ExecutionError::StackIndex { index: n, len });
        }
        Ok(self.stack[len - 1 - n])
    }

    /// `@(`: set the current stack aside and start an empty one.
    pub fn enter_frame(&mut self) {
        self.frames.push(std::mem::take(&mut self.stack));
        trace!(depth = self.frames.len(), "stack frame entered");
    }

    /// `@)`: return to the stack set aside by the matching `@(`.
    pub fn leave_frame(&mut self) {
        if self.frames.is_empty() {
            trace!("stack frame left without a matching enter");
        }
        self.stack = self.frames.pop().unwrap_or_default();
    }

    /// `\save`: snapshot everything but the saved names.
    pub fn save_state(&mut self) {
        let mut snapshot = self.clone();
        snapshot.saved_states.clear();
        snapshot.saved.clear();
        self.saved_states.push(snapshot);
    }

    /// `\restore`: return to the last snapshot. Names saved since survive.
    pub fn restore_state(&mut self) -> Result<(), ExecutionError> {
        let snapshot = self
            .saved_states
            .pop()
            .ok_or(ExecutionError::UnbalancedRestore)?;
        let saved = std::mem::take(&mut self.saved);
        let states = std::mem::take(&mut self.saved_states);
        *self = snapshot;
        self.saved = saved;
        self.saved_states = states;
        Ok(())
    }

    /// Where the line through `p` and `c` meets an axis of the basis, or
    /// `c` itself when they are parallel.
    pub fn axis_meet(&self, axis: BaseAxis) -> DVec2 {
        let (p, c) = (self.p.at(), self.c.at());
        let along = match axis {
            BaseAxis::X => self.basis.x,
            BaseAxis::Y => self.basis.y,
        };
        let d = c - p;
        // p = origin + a·along + b·d, so the meet is p - b·d.
        let skew = Basis {
            origin: self.basis.origin,
            x: along,
            y: d,
        };
        match skew.solve(p) {
            Some(ab) => p - d * ab.y,
            None => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Basis tests
    // ========================================================================

    #[test]
    fn solve_inverts_point() {
        let basis = Basis {
            origin: dvec2(1.0, 1.0),
            x: dvec2(2.0, 0.0),
            y: dvec2(1.0, 1.0),
        };
        let p = basis.point(3.0, -2.0);
        assert!(basis.solve(p).unwrap().abs_diff_eq(dvec2(3.0, -2.0), 1e-12));

        let flat = Basis {
            origin: DVec2::ZERO,
            x: dvec2(1.0, 0.0),
            y: dvec2(2.0, 0.0),
        };
        assert!(flat.solve(dvec2(1.0, 1.0)).is_none());
    }

    // ========================================================================
    // Stack tests
    // ========================================================================

    #[test]
    fn stack_positions_count_from_the_top() {
        let mut env = Env::new(1.0);
        env.push(Region::Point(dvec2(1.0, 0.0)));
        env.push(Region::Point(dvec2(2.0, 0.0)));
        assert_eq!(env.stack_position(0).unwrap().at(), dvec2(2.0, 0.0));
        assert_eq!(env.stack_position(1).unwrap().at(), dvec2(1.0, 0.0));
        assert_eq!(
            env.stack_position(2),
            Err(ExecutionError::StackIndex { index: 2, len: 2 })
        );
    }

    #[test]
    fn pop_on_empty_stack_fails() {
        let mut env = Env::new(1.0);
        assert_eq!(env.pop(), Err(ExecutionError::EmptyStack));
    }

    #[test]
    fn frames_hide_the_outer_stack() {
        let mut env = Env::new(1.0);
        env.push(Region::Point(dvec2(1.0, 0.0)));
        env.enter_frame();
        assert!(env.stack.is_empty());
        env.push(Region::Point(dvec2(5.0, 0.0)));
        env.leave_frame();
        assert_eq!(env.stack.len(), 1);
        assert_eq!(env.stack[0].at(), dvec2(1.0, 0.0));
        // Unmatched leave empties the stack.
        env.leave_frame();
        assert!(env.stack.is_empty());
    }

    // ========================================================================
    // Save/restore tests
    // ========================================================================

    #[test]
    fn restore_keeps_names_saved_in_between() {
        let mut env = Env::new(1.0);
        env.c = Region::Point(dvec2(1.0, 1.0));
        env.save_state();
        env.c = Region::Point(dvec2(9.0, 9.0));
        env.saved
            .insert("A".into(), Saved::Position(Region::Point(dvec2(9.0, 9.0))));
        env.restore_state().unwrap();
        assert_eq!(env.c.at(), dvec2(1.0, 1.0));
        assert!(env.lookup("A").is_ok());
        assert_eq!(env.restore_state(), Err(ExecutionError::UnbalancedRestore));
    }

    #[test]
    fn nested_saves_unwind_in_order() {
        let mut env = Env::new(1.0);
        env.angle = 1.0;
        env.save_state();
        env.angle = 2.0;
        env.save_state();
        env.angle = 3.0;
        env.restore_state().unwrap();
        assert_eq!(env.angle, 2.0);
        env.restore_state().unwrap();
        assert_eq!(env.angle, 1.0);
    }

    // ========================================================================
    // Axis tests
    // ========================================================================

    #[test]
    fn line_meets_axes() {
        let mut env = Env::new(1.0);
        env.p = Region::Point(dvec2(1.0, 1.0));
        env.c = Region::Point(dvec2(2.0, 3.0));
        assert!(env.axis_meet(BaseAxis::X).abs_diff_eq(dvec2(0.5, 0.0), 1e-12));
        assert!(env.axis_meet(BaseAxis::Y).abs_diff_eq(dvec2(0.0, -1.0), 1e-12));

        env.c = Region::Point(dvec2(3.0, 1.0));
        assert_eq!(env.axis_meet(BaseAxis::X), dvec2(3.0, 1.0));
    }

    #[test]
    fn axes_of_a_skewed_basis_are_met() {
        let mut env = Env::new(1.0);
        env.basis = Basis {
            origin: dvec2(0.0, 1.0),
            x: dvec2(1.0, 1.0),
            y: dvec2(0.0, 2.0),
        };
        env.p = Region::Point(DVec2::ZERO);
        env.c = Region::Point(dvec2(1.0, 0.0));
        assert!(env.axis_meet(BaseAxis::X).abs_diff_eq(dvec2(-1.0, 0.0), 1e-12));
        assert!(env.axis_meet(BaseAxis::Y).abs_diff_eq(dvec2(0.0, 0.0), 1e-12));
    }

    // ========================================================================
    // Matrix cursor tests
    // ========================================================================

    #[test]
    fn hops_walk_the_grid() {
        let grid = vec![
            vec![Region::Point(dvec2(0.0, 0.0)), Region::Point(dvec2(5.0, 0.0))],
            vec![Region::Point(dvec2(0.0, -5.0)), Region::Point(dvec2(5.0, -5.0))],
        ];
        let cursor = MatrixCursor {
            row: 0,
            col: 0,
            grid: Rc::new(grid),
            label_margin: 0.25,
        };
        assert_eq!(
            cursor.hop(&[Hop::Right, Hop::Down]).unwrap().at(),
            dvec2(5.0, -5.0)
        );
        assert_eq!(
            cursor.hop(&[Hop::Up]),
            Err(ExecutionError::NoSuchEntry { row: 0, column: 1 })
        );
        assert_eq!(
            cursor.hop(&[Hop::Right, Hop::Right]),
            Err(ExecutionError::NoSuchEntry { row: 1, column: 3 })
        );
    }
}

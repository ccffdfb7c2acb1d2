//! The environment interpreter.
//!
//! Walks a parsed [`PosDecor`] left to right, threading one [`Env`] through
//! positions, objects and decorations, and collects the drawn [`Shape`]s.
//! Nothing is recovered: the first [`ExecutionError`] ends the run.

mod env;
mod eval;
mod matrix;
mod object;
mod path;

use glam::DVec2;

use crate::ast::PosDecor;
use crate::curve::ClipOptions;
use crate::errors::ExecutionError;
use crate::geometry::Region;
use crate::host::Host;
use crate::log::debug;
use crate::shape::Shape;
use crate::types::Metrics;

pub use env::{BaseAxis, Basis, Env, MatrixCursor, Saved};

/// Nesting limit for saved coordinates that expand into other saved coordinates.
const MAX_MACRO_DEPTH: usize = 64;

/// A finished diagram.
#[derive(Debug, Clone)]
pub struct Diagram {
    pub shape: Shape,
    /// Extent of everything drawn, anchored at the origin
    pub frame: Region,
}

pub struct Interpreter<'h> {
    host: &'h dyn Host,
    metrics: Metrics,
    options: ClipOptions,
    shapes: Vec<Shape>,
    macro_depth: usize,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h dyn Host, metrics: Metrics) -> Self {
        let options = ClipOptions::from(&metrics);
        Self {
            host,
            metrics,
            options,
            shapes: Vec::new(),
            macro_depth: 0,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// A fresh environment in this interpreter's basis.
    pub fn env(&self) -> Env {
        Env::new(self.metrics.base_unit)
    }

    /// Evaluate `root` in `env`, returning what it drew.
    pub fn run(&mut self, env: &mut Env, root: &PosDecor) -> Result<Shape, ExecutionError> {
        let (shape, ()) = self.collect(|this| this.pos_decor(env, root))?;
        Ok(shape)
    }

    /// Run `f` with an empty output list and hand back what it drew.
    fn collect<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<(Shape, T), ExecutionError> {
        let outer = std::mem::take(&mut self.shapes);
        let result = f(self);
        let inner = std::mem::replace(&mut self.shapes, outer);
        Ok((Shape::composite(inner), result?))
    }

    fn emit(&mut self, shape: Shape) {
        if !shape.is_empty() {
            self.shapes.push(shape);
        }
    }
}

/// Interpret a parsed diagram.
pub fn evaluate(
    root: &PosDecor,
    host: &dyn Host,
    metrics: Metrics,
) -> Result<Diagram, ExecutionError> {
    let mut interpreter = Interpreter::new(host, metrics);
    let mut env = interpreter.env();
    let shape = interpreter.run(&mut env, root)?;
    let frame = match shape.bounds() {
        Some(bounds) => bounds.to_region(DVec2::ZERO),
        None => Region::default(),
    };
    debug!(?frame, "diagram evaluated");
    Ok(Diagram { shape, frame })
}

//! A pure Rust engine for xy-pic style diagram notation.
//!
//! Source text is parsed by a small parser-combinator library into an AST,
//! then interpreted against a mutable environment of points, bases and
//! stacks. The result is a tree of [`Shape`]s: strokes clipped against the
//! objects they connect, text placeholders, arrow tips and frames. Text is
//! never typeset here; a [`Host`] creates and measures it.
//!
//! ```
//! use xyru::{Metrics, MonospaceHost, xy};
//!
//! let host = MonospaceHost::new();
//! let diagram = xy("\\xymatrix{A \\ar[r] & B}", &host, Metrics::default()).unwrap();
//! assert!(!diagram.shape.is_empty());
//! ```

pub mod log;

pub mod ast;
pub mod combinator;
pub mod curve;
pub mod errors;
pub mod geometry;
pub mod host;
pub mod interp;
pub mod parse;
pub mod shape;
pub mod types;

pub use ast::PosDecor;
pub use curve::{ClipOptions, Curve, ParamRange, Parametric};
pub use errors::{ExecutionError, SourceInfo, SyntaxError, XyError};
pub use geometry::{Bounds, Margins, Region};
pub use host::{Host, MonospaceHost, TextExtent, TextHandle};
pub use interp::{Diagram, Env, Interpreter, evaluate};
pub use parse::{parse, parse_named};
pub use shape::{Painter, Shape, StrokeStyle};
pub use types::{Dimension, Metrics, Unit};

/// Parse and evaluate one diagram.
pub fn xy(source: &str, host: &dyn Host, metrics: Metrics) -> Result<Diagram, XyError> {
    let root = parse(source, host)?;
    Ok(evaluate(&root, host, metrics)?)
}

/// Like [`xy`], reporting syntax errors against `info`.
pub fn xy_named(
    source: &str,
    info: &SourceInfo,
    host: &dyn Host,
    metrics: Metrics,
) -> Result<Diagram, XyError> {
    let root = parse_named(source, info, host)?;
    Ok(evaluate(&root, host, metrics)?)
}

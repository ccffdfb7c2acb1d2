//! End-to-end behaviour through the public API.

use glam::{DVec2, dvec2};
use xyru::ast::Coord;
use xyru::combinator::{Context, Input, Reply, either, literal};
use xyru::curve::find_intersections;
use xyru::geometry::Margins;
use xyru::{
    ClipOptions, Curve, ExecutionError, Interpreter, Metrics, MonospaceHost, Parametric, Region,
    Shape, XyError, parse, xy,
};

fn metrics() -> Metrics {
    Metrics::default().with_base_unit(1.0).unwrap()
}

fn count_strokes(shape: &Shape) -> usize {
    match shape {
        Shape::Stroke(_) => 1,
        Shape::Composite(children) => children.iter().map(count_strokes).sum(),
        _ => 0,
    }
}

fn options() -> ClipOptions {
    ClipOptions::from(&metrics())
}

// ============================================================================
// Positions
// ============================================================================

#[test]
fn current_position_stays_put() {
    let host = MonospaceHost::new();
    let root = parse("c", &host).unwrap();
    assert_eq!(root.pos.coord, Coord::C);
    assert!(root.pos.ops.is_empty());

    let mut interp = Interpreter::new(&host, metrics());
    let mut env = interp.env();
    env.c = Region::Point(dvec2(3.0, 4.0));
    interp.run(&mut env, &root).unwrap();
    assert_eq!(env.c.at(), dvec2(3.0, 4.0));
}

#[test]
fn offsets_apply_left_to_right() {
    let host = MonospaceHost::new();
    let root = parse("c+(1,0)+(0,1)", &host).unwrap();
    assert_eq!(root.pos.ops.len(), 2);

    let mut interp = Interpreter::new(&host, metrics());
    let mut env = interp.env();
    interp.run(&mut env, &root).unwrap();
    assert!(env.c.at().abs_diff_eq(dvec2(1.0, 1.0), 1e-12));
}

// ============================================================================
// Clipping
// ============================================================================

#[test]
fn line_crosses_a_box_twice() {
    let line = Curve::line(DVec2::ZERO, dvec2(10.0, 0.0));
    let rect = Region::rect(dvec2(5.0, 0.0), Margins::uniform(1.0));
    let ts = line.t_of_intersections(&rect, &options());
    assert_eq!(ts.len(), 2, "{ts:?}");
    assert!((ts[0] - 0.4).abs() < 1e-4);
    assert!((ts[1] - 0.6).abs() < 1e-4);
}

#[test]
fn shaving_against_points_keeps_the_line() {
    let line = Curve::line(DVec2::ZERO, dvec2(10.0, 0.0));
    let from = Region::Point(DVec2::ZERO);
    let to = Region::Point(dvec2(10.0, 0.0));
    let shaved = line.shave(&from, &to, &options()).unwrap();
    assert_eq!(shaved.kind(), "line");
    assert_eq!(shaved.start(), line.start());
    assert_eq!(shaved.end(), line.end());
    assert!((shaved.total_length() - 10.0).abs() < 1e-9);
}

#[test]
fn intersections_are_symmetric() {
    let arch = Curve::through(DVec2::ZERO, &[dvec2(5.0, 10.0)], dvec2(10.0, 0.0));
    let wave = Curve::through(
        dvec2(0.0, 2.0),
        &[dvec2(3.0, -4.0), dvec2(7.0, 8.0)],
        dvec2(10.0, 2.0),
    );
    let ab = find_intersections(&arch, &wave, &options());
    let ba = find_intersections(&wave, &arch, &options());
    assert!(!ab.is_empty());
    for (mine, theirs) in &ab {
        let p = arch.position(mine.mid());
        assert!(p.distance(wave.position(theirs.mid())) < 1e-3);
        assert!(
            ba.iter()
                .any(|(m, _)| wave.position(m.mid()).distance(p) < 1e-3),
            "no partner for {p:?}"
        );
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn ordered_choice_keeps_the_first_success() {
    let host = MonospaceHost::new();
    let ctx = Context::new(&host);
    let rule = either(vec![literal("a"), literal("ab")]);
    match rule.parse(Input::new("ab", &ctx)) {
        Reply::Success(value, rest) => {
            assert_eq!(value, "a");
            assert_eq!(rest.offset(), 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn committed_failure_is_not_retried() {
    let host = MonospaceHost::new();
    let ctx = Context::new(&host);
    let rule = either(vec![
        literal("@").ignore_then(literal("x").commit()),
        literal("@y"),
    ]);
    assert!(matches!(rule.parse(Input::new("@y", &ctx)), Reply::Error(_)));
}

#[test]
fn bad_stem_is_reported_where_it_starts() {
    let host = MonospaceHost::new();
    let err = match xy("\\ar@{-#>}[r]", &host, metrics()) {
        Err(XyError::Syntax(err)) => err,
        other => panic!("expected a syntax error, got {other:?}"),
    };
    assert_eq!((err.line, err.column), (1, 7));
    insta::assert_snapshot!(format!("{}\n{}", err.source_line, err.caret), @r"
\ar@{-#>}[r]
      ^
");
}

// ============================================================================
// Diagrams
// ============================================================================

#[test]
fn square_diagram_draws_four_arrows() {
    let host = MonospaceHost::new();
    let diagram = xy(
        "\\xymatrix{A \\ar[r] \\ar[d] & B \\ar[d] \\\\ C \\ar[r] & D}",
        &host,
        metrics(),
    )
    .unwrap();
    assert_eq!(host.created(), 4);
    assert_eq!(count_strokes(&diagram.shape), 4);
    let bounds = diagram.shape.bounds().unwrap();
    assert!(diagram.frame.bounds().contains(&bounds, 1e-9));
}

#[test]
fn execution_errors_surface_through_xy() {
    let host = MonospaceHost::new();
    let err = xy("(0,0)@-", &host, metrics()).unwrap_err();
    assert!(matches!(err, XyError::Execution(ExecutionError::EmptyStack)));
}

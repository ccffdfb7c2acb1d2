//! Positions, coordinates, vectors, directions and decorations.

use std::f64::consts::FRAC_PI_2;

use glam::{DVec2, dvec2};

use super::env::{BaseAxis, Env, Saved};
use super::{Interpreter, MAX_MACRO_DEPTH};
use crate::ast::*;
use crate::curve::{Curve, Parametric, find_intersections};
use crate::errors::ExecutionError;
use crate::geometry::{EPSILON, Region};
use crate::log::debug;
use crate::types::Dimension;

type Result<T> = std::result::Result<T, ExecutionError>;

impl Interpreter<'_> {
    pub(crate) fn pos_decor(&mut self, env: &mut Env, pd: &PosDecor) -> Result<()> {
        self.pos(env, &pd.pos)?;
        self.decor(env, &pd.decor)
    }

    pub(crate) fn pos(&mut self, env: &mut Env, pos: &Pos) -> Result<()> {
        env.c = self.coord(env, &pos.coord)?;
        for op in &pos.ops {
            self.pos_op(env, op)?;
        }
        Ok(())
    }

    pub(crate) fn em(&self, dim: Dimension) -> f64 {
        self.metrics.to_em(dim)
    }

    fn pos_op(&mut self, env: &mut Env, op: &PosOp) -> Result<()> {
        match op {
            PosOp::Plus(coord) => {
                let r = self.coord(env, coord)?;
                let v = r.at() - env.basis.origin;
                env.c = r.moved_to(env.c.at() + v);
            }
            PosOp::Minus(coord) => {
                let r = self.coord(env, coord)?;
                let v = r.at() - env.basis.origin;
                env.c = r.moved_to(env.c.at() - v);
            }
            PosOp::Skew(coord) => {
                let r = self.coord(env, coord)?;
                env.c = env.c.shift_frame(r.at() - env.basis.origin);
            }
            PosOp::Cover(coord) => {
                let r = self.coord(env, coord)?;
                env.c = env.c.combine(&r);
            }
            PosOp::Then(coord) => {
                let r = self.coord(env, coord)?;
                let previous = env.c;
                if let Some(buffer) = env.capture.as_mut() {
                    buffer.push(previous);
                }
                env.c = r;
            }
            PosOp::SwapPAndC(coord) => {
                env.p = env.c;
                env.c = self.coord(env, coord)?;
            }
            PosOp::SetBase(coord) => {
                let origin = env.p.at();
                let x = env.c.at() - origin;
                if x.length() < EPSILON {
                    debug!("base: p and c coincide, x axis collapses");
                }
                env.basis.origin = origin;
                env.basis.x = x;
                env.basis.y = x.perp();
                env.c = self.coord(env, coord)?;
            }
            PosOp::SetYBase(coord) => {
                env.basis.y = env.c.at() - env.basis.origin;
                env.c = self.coord(env, coord)?;
            }
            PosOp::Drop(object) => self.drop_object(env, object)?,
            PosOp::Connect(object) => self.connect(env, object)?,
            PosOp::Place(place) => self.place(env, place)?,
            PosOp::PushCoord(coord) => {
                env.c = self.coord(env, coord)?;
                env.push(env.c);
            }
            PosOp::PopCoord(coord) => {
                env.c = self.coord(env, coord)?;
                env.pop()?;
            }
            PosOp::LoadStack(coord) => self.load_stack(env, coord)?,
            PosOp::DoCoord(coord) => {
                for entry in env.stack.clone() {
                    env.c = entry;
                    env.c = self.coord(env, coord)?;
                }
            }
            PosOp::InitStack => env.stack.clear(),
            PosOp::EnterFrame => env.enter_frame(),
            PosOp::LeaveFrame => env.leave_frame(),
            PosOp::SavePos(name) => {
                env.saved.insert(name.clone(), Saved::Position(env.c));
            }
            PosOp::SaveMacro(coord, name) => {
                env.saved.insert(name.clone(), Saved::Macro(coord.clone()));
            }
            PosOp::SaveBase(name) => {
                env.saved.insert(name.clone(), Saved::Base(env.basis));
            }
            PosOp::SaveStack(name) => {
                env.saved.insert(name.clone(), Saved::Stack(env.stack.clone()));
            }
        }
        Ok(())
    }

    /// `@=`: load a saved stack, or collect every position the coordinate
    /// passes through with `,` as the new stack.
    fn load_stack(&mut self, env: &mut Env, coord: &Coord) -> Result<()> {
        if let Coord::Id(name) = coord {
            match env.saved.get(name) {
                Some(Saved::Stack(stack)) => {
                    env.stack = stack.clone();
                    return Ok(());
                }
                Some(found @ Saved::Base(_)) => {
                    return Err(ExecutionError::WrongSavedKind {
                        name: name.clone(),
                        expected: "stack",
                        found: found.kind(),
                    });
                }
                _ => {}
            }
        }
        let outer = env.capture.replace(Vec::new());
        let result = self.coord(env, coord);
        let mut captured = std::mem::replace(&mut env.capture, outer).unwrap_or_default();
        env.c = result?;
        captured.push(env.c);
        env.stack = captured;
        Ok(())
    }

    // ========================================================================
    // Coordinates
    // ========================================================================

    pub(crate) fn coord(&mut self, env: &mut Env, coord: &Coord) -> Result<Region> {
        Ok(match coord {
            Coord::C => env.c,
            Coord::P => env.p,
            Coord::X => Region::Point(env.axis_meet(BaseAxis::X)),
            Coord::Y => Region::Point(env.axis_meet(BaseAxis::Y)),
            Coord::StackPosition(n) => env.stack_position(*n)?,
            Coord::Id(name) => self.saved_coord(env, name)?,
            Coord::Group(pd) => {
                let mut inner = env.clone();
                self.pos_decor(&mut inner, pd)?;
                env.capture = inner.capture;
                inner.c
            }
            Coord::Hop(hops) => env
                .matrix
                .as_ref()
                .ok_or(ExecutionError::HopOutsideMatrix)?
                .hop(hops)?,
            Coord::Vector(v) => Region::Point(env.basis.origin + self.vector(env, v)?),
        })
    }

    fn saved_coord(&mut self, env: &mut Env, name: &str) -> Result<Region> {
        match env.lookup(name)?.clone() {
            Saved::Position(region) => Ok(region),
            Saved::Macro(coord) => {
                if self.macro_depth >= MAX_MACRO_DEPTH {
                    return Err(ExecutionError::RecursiveMacro {
                        name: name.to_string(),
                    });
                }
                self.macro_depth += 1;
                let result = self.coord(env, &coord);
                self.macro_depth -= 1;
                result
            }
            Saved::Base(basis) => {
                env.basis = basis;
                Ok(env.c)
            }
            Saved::Stack(stack) => {
                env.stack = stack;
                Ok(env.c)
            }
        }
    }

    // ========================================================================
    // Vectors and directions
    // ========================================================================

    pub(crate) fn vector(&mut self, env: &mut Env, vector: &Vector) -> Result<DVec2> {
        Ok(match vector {
            Vector::InBase { x, y } => env.basis.vector(*x, *y),
            Vector::Absolute { x, y } => dvec2(self.em(*x), self.em(*y)),
            Vector::Angle(degrees) => {
                let r = degrees.to_radians();
                dvec2(r.cos(), r.sin()) * env.basis.x.length()
            }
            Vector::Corner { corner, factor } => {
                corner_offset(&env.c, env.p.at(), *corner) * factor.unwrap_or(1.0)
            }
            Vector::Along { direction, length } => {
                let angle = self.direction(env, direction)?;
                dvec2(angle.cos(), angle.sin()) * self.em(*length)
            }
        })
    }

    /// Angle in radians.
    pub(crate) fn direction(&mut self, env: &mut Env, direction: &Direction) -> Result<f64> {
        let base = match &direction.base {
            DirectionBase::Current => env.angle,
            DirectionBase::Diagonal(d) => d.degrees().to_radians(),
            DirectionBase::Vector(v) => {
                let v = self.vector(env, v)?;
                angle_of(v).unwrap_or(env.angle)
            }
            DirectionBase::Toward(pd) => {
                let mut inner = env.clone();
                self.pos_decor(&mut inner, pd)?;
                angle_of(inner.c.at() - env.c.at()).unwrap_or(env.angle)
            }
        };
        Ok(direction
            .turns
            .iter()
            .fold(base, |angle, turn| match turn {
                Turn::Anticlockwise => angle + FRAC_PI_2,
                Turn::Clockwise => angle - FRAC_PI_2,
            }))
    }

    // ========================================================================
    // Places
    // ========================================================================

    fn place(&mut self, env: &mut Env, place: &Place) -> Result<()> {
        let curve = env
            .last_curve
            .clone()
            .unwrap_or_else(|| Curve::line(env.p.at(), env.c.at()));
        let (from, to) = (env.p, env.c);
        let t = self.place_t(env, &curve, &from, &to, place)?;
        env.c = Region::Point(curve.position(t));
        env.angle = curve.angle(t);
        Ok(())
    }

    /// Parameter on `curve` selected by `place`, where `from` and `to` are
    /// the objects the curve runs between.
    pub(crate) fn place_t(
        &mut self,
        env: &mut Env,
        curve: &Curve,
        from: &Region,
        to: &Region,
        place: &Place,
    ) -> Result<f64> {
        let margin = self.metrics.object_margin;
        let mut t0 = 0.0;
        let mut t1 = 1.0;
        if place.shave_start > 0 {
            t0 = curve.t_of_shaved_start(from, &self.options).unwrap_or(0.0);
            let extra = (place.shave_start - 1) as f64 * margin;
            if extra > 0.0 {
                t0 = curve.t_of_length(curve.length(t0) + extra);
            }
        }
        if place.shave_end > 0 {
            t1 = curve.t_of_shaved_end(to, &self.options).unwrap_or(1.0);
            let extra = (place.shave_end - 1) as f64 * margin;
            if extra > 0.0 {
                t1 = curve.t_of_length((curve.length(t1) - extra).max(0.0));
            }
        }
        let factor = place.factor.unwrap_or(
            match (place.shave_start > 0, place.shave_end > 0) {
                (true, false) => 0.0,
                (false, true) => 1.0,
                _ => 0.5,
            },
        );
        let mut t = t0 + factor * (t1 - t0);

        if let Some(pd) = &place.intercept {
            let mut inner = env.clone();
            self.pos_decor(&mut inner, pd)?;
            let line = Curve::line(inner.p.at(), inner.c.at());
            let hit = find_intersections(curve, &line, &self.options)
                .first()
                .map(|(mine, _)| mine.mid());
            match hit {
                Some(hit) => t = hit,
                None => {
                    debug!("place: intercept line misses the curve");
                }
            }
        }

        if let Some(slide) = place.slide {
            t = curve.t_of_length(curve.length(t) + self.em(slide));
        }
        Ok(t.clamp(0.0, 1.0))
    }

    // ========================================================================
    // Decorations
    // ========================================================================

    pub(crate) fn decor(&mut self, env: &mut Env, decor: &Decor) -> Result<()> {
        for command in &decor.commands {
            self.command(env, command)?;
        }
        Ok(())
    }

    fn command(&mut self, env: &mut Env, command: &Command) -> Result<()> {
        match command {
            Command::Save(pos) => {
                env.save_state();
                self.pos(env, pos)
            }
            Command::Restore => env.restore_state(),
            Command::Pos(pos) => self.pos(env, pos),
            Command::AfterPos { decor, pos } => {
                self.pos(env, pos)?;
                self.decor(env, decor)
            }
            Command::Drop(object) => self.drop_object(env, object),
            Command::Connect(object) => self.connect(env, object),
            Command::Relax => Ok(()),
            Command::Ignore(pd) => {
                let mut inner = env.clone();
                self.pos_decor(&mut inner, pd)
            }
            Command::Ar { forms, path } => self.arrow(env, forms, path),
            Command::Path(path) => self.path(env, path),
        }
    }
}

fn angle_of(v: DVec2) -> Option<f64> {
    (v.length() >= EPSILON).then(|| v.y.atan2(v.x))
}

/// Offset from the anchor of `c` to one of its corners or edge points.
pub(super) fn corner_offset(c: &Region, p: DVec2, corner: Corner) -> DVec2 {
    let m = c.margins();
    let mid_x = (m.r - m.l) / 2.0;
    let mid_y = (m.u - m.d) / 2.0;
    match corner {
        Corner::L => dvec2(-m.l, 0.0),
        Corner::R => dvec2(m.r, 0.0),
        Corner::U => dvec2(0.0, m.u),
        Corner::D => dvec2(0.0, -m.d),
        Corner::CL => dvec2(-m.l, mid_y),
        Corner::CR => dvec2(m.r, mid_y),
        Corner::CU => dvec2(mid_x, m.u),
        Corner::CD => dvec2(mid_x, -m.d),
        Corner::LD => dvec2(-m.l, -m.d),
        Corner::RD => dvec2(m.r, -m.d),
        Corner::LU => dvec2(-m.l, m.u),
        Corner::RU => dvec2(m.r, m.u),
        Corner::E => c.edge_point(p) - c.at(),
        Corner::P => c.proportional_edge_point(p) - c.at(),
        Corner::A => dvec2(mid_x, mid_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Margins;
    use crate::host::MonospaceHost;
    use crate::parse::parse;
    use crate::types::Metrics;

    fn metrics() -> Metrics {
        Metrics::default().with_base_unit(1.0).unwrap()
    }

    /// Evaluate a bare position in a fresh environment.
    fn eval_in(env: &mut Env, source: &str) -> Result<()> {
        let host = MonospaceHost::new();
        let pd = parse(source, &host).unwrap();
        let mut interp = Interpreter::new(&host, metrics());
        interp.pos_decor(env, &pd)
    }

    fn eval(source: &str) -> Env {
        let mut env = Env::new(1.0);
        eval_in(&mut env, source).unwrap();
        env
    }

    fn at(env: &Env) -> DVec2 {
        env.c.at()
    }

    // ========================================================================
    // Position tests
    // ========================================================================

    #[test]
    fn a_plain_vector_sets_c() {
        let env = eval("(3,4)");
        assert_eq!(at(&env), dvec2(3.0, 4.0));
        assert!(env.c.is_point());
    }

    #[test]
    fn offsets_add_up() {
        let env = eval("(0,0)+(1,0)+(0,1)");
        assert!(at(&env).abs_diff_eq(dvec2(1.0, 1.0), 1e-12));
        let env = eval("(5,5)-(2,1)");
        assert!(at(&env).abs_diff_eq(dvec2(3.0, 4.0), 1e-12));
    }

    #[test]
    fn semicolon_moves_c_into_p() {
        let env = eval("(1,2);(3,4)");
        assert_eq!(env.p.at(), dvec2(1.0, 2.0));
        assert_eq!(at(&env), dvec2(3.0, 4.0));
    }

    #[test]
    fn comma_leaves_p_alone() {
        let env = eval("(1,2),(3,4)");
        assert_eq!(env.p.at(), DVec2::ZERO);
        assert_eq!(at(&env), dvec2(3.0, 4.0));
    }

    #[test]
    fn cover_extends_c_around_its_anchor() {
        let env = eval("(0,0).(2,1)");
        assert_eq!(at(&env), DVec2::ZERO);
        assert_eq!(env.c.margins(), Margins::new(0.0, 2.0, 1.0, 0.0));
    }

    #[test]
    fn skew_moves_the_anchor_inside_the_extent() {
        let env = eval("(0,0).(2,2)!(1,1)");
        assert_eq!(at(&env), dvec2(1.0, 1.0));
        assert_eq!(env.c.margins(), Margins::uniform(1.0));
    }

    #[test]
    fn base_change_rescales_vectors() {
        // origin (1,0), x = (2,0), y = (0,2)
        let env = eval("(1,0);(3,0):(1,1)");
        assert!(at(&env).abs_diff_eq(dvec2(3.0, 2.0), 1e-12));
        // y becomes c - origin = (0,6)
        let env = eval("(1,0);(3,0):(0,3)::(1,1)");
        assert!(at(&env).abs_diff_eq(dvec2(3.0, 6.0), 1e-12));
    }

    #[test]
    fn axis_coordinates() {
        let env = eval("(1,1);(2,3),x");
        assert!(at(&env).abs_diff_eq(dvec2(0.5, 0.0), 1e-12));
        let env = eval("(1,1);(2,3),y");
        assert!(at(&env).abs_diff_eq(dvec2(0.0, -1.0), 1e-12));
    }

    #[test]
    fn groups_only_return_c() {
        let env = eval("(7,7);{(1,1);(2,2)}");
        assert_eq!(env.p.at(), dvec2(7.0, 7.0));
        assert_eq!(at(&env), dvec2(2.0, 2.0));
    }

    // ========================================================================
    // Saved name tests
    // ========================================================================

    #[test]
    fn saved_positions_and_macros() {
        let env = eval("(2,0)=\"A\",(0,0)+\"A\"");
        assert_eq!(at(&env), dvec2(2.0, 0.0));

        // A saved coordinate is evaluated where it is used.
        let env = eval("(0,0)={c+(1,0)}\"next\",(5,5),\"next\"");
        assert_eq!(at(&env), dvec2(6.0, 5.0));
    }

    #[test]
    fn undefined_name_is_an_error() {
        let mut env = Env::new(1.0);
        assert_eq!(
            eval_in(&mut env, "\"nowhere\""),
            Err(ExecutionError::UndefinedPosition {
                name: "nowhere".into()
            })
        );
    }

    #[test]
    fn self_referencing_macro_is_stopped() {
        let mut env = Env::new(1.0);
        let err = eval_in(&mut env, "(0,0)={\"loop\"}\"loop\",\"loop\"").unwrap_err();
        assert_eq!(err, ExecutionError::RecursiveMacro { name: "loop".into() });
    }

    #[test]
    fn saved_base_is_restored_by_name() {
        let env = eval("(0,0);(2,0):(0,0)=:\"wide\";(0,0);(.5,0):(0,0),\"wide\",(1,0)");
        assert!(at(&env).abs_diff_eq(dvec2(2.0, 0.0), 1e-12));
    }

    // ========================================================================
    // Stack tests
    // ========================================================================

    #[test]
    fn push_and_stack_positions() {
        let env = eval("(1,0)@+c,(2,0)@+c,s1");
        assert_eq!(env.stack.len(), 2);
        assert_eq!(at(&env), dvec2(1.0, 0.0));
    }

    #[test]
    fn pop_discards_the_top() {
        let env = eval("(1,0)@+c,(2,0)@+c@-c");
        assert_eq!(env.stack.len(), 1);
        assert_eq!(env.stack[0].at(), dvec2(1.0, 0.0));
        let mut env = Env::new(1.0);
        assert_eq!(eval_in(&mut env, "@-c"), Err(ExecutionError::EmptyStack));
    }

    #[test]
    fn load_stack_captures_comma_lists() {
        let env = eval("@={(0,0),(1,0),(2,0)}");
        let xs: Vec<f64> = env.stack.iter().map(|r| r.at().x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        assert!(env.capture.is_none());
    }

    #[test]
    fn saved_stacks_round_trip() {
        let env = eval("@={(0,0),(1,0)}=@\"pts\"@i@=\"pts\"");
        assert_eq!(env.stack.len(), 2);
    }

    #[test]
    fn loading_a_base_as_a_stack_fails() {
        let mut env = Env::new(1.0);
        assert_eq!(
            eval_in(&mut env, "(0,0)=:\"b\"@=\"b\""),
            Err(ExecutionError::WrongSavedKind {
                name: "b".into(),
                expected: "stack",
                found: "base",
            })
        );
    }

    #[test]
    fn do_visits_every_entry() {
        let env = eval("@={(0,0),(1,0),(4,0)}@@{c+(0,1)=\"last\"}");
        assert_eq!(at(&env), dvec2(4.0, 1.0));
    }

    #[test]
    fn frames_hide_the_stack() {
        let env = eval("(0,0)@+c@(@+c@+c@)");
        assert_eq!(env.stack.len(), 1);
    }

    // ========================================================================
    // Vector and direction tests
    // ========================================================================

    #[test]
    fn corner_vectors_read_the_current_extent() {
        let env = eval("(0,0).(2,1).(-1,-1)+R");
        assert!(at(&env).abs_diff_eq(dvec2(2.0, 0.0), 1e-12));
        let env = eval("(0,0).(2,1).(-1,-1)+LU(.5)");
        assert!(at(&env).abs_diff_eq(dvec2(-0.5, 0.5), 1e-12));
    }

    #[test]
    fn angle_vectors_use_the_x_base_length() {
        let env = eval("(0,0);(2,0):a(90)");
        assert!(at(&env).abs_diff_eq(dvec2(0.0, 2.0), 1e-9));
    }

    #[test]
    fn along_directions() {
        let env = eval("(0,0)+/u 1em/");
        assert!(at(&env).abs_diff_eq(dvec2(0.0, 1.0), 1e-12));
        let env = eval("(0,0)+/r^ 2em/");
        assert!(at(&env).abs_diff_eq(dvec2(0.0, 2.0), 1e-12));
    }

    #[test]
    fn along_a_vector_direction() {
        let env = eval("(0,0)+/v(1,1) 2em/");
        let half = std::f64::consts::SQRT_2;
        assert!(at(&env).abs_diff_eq(dvec2(half, half), 1e-12));
    }

    // ========================================================================
    // Place tests
    // ========================================================================

    #[test]
    fn place_defaults_to_the_middle() {
        let env = eval("(0,0);(10,0)?");
        assert!(at(&env).abs_diff_eq(dvec2(5.0, 0.0), 1e-9));
    }

    #[test]
    fn place_factor_and_slide() {
        let env = eval("(0,0);(10,0)?(.2)");
        assert!(at(&env).abs_diff_eq(dvec2(2.0, 0.0), 1e-9));
        let env = eval("(0,0);(10,0)?(0)/1em/");
        assert!(at(&env).abs_diff_eq(dvec2(1.0, 0.0), 1e-6));
    }

    #[test]
    fn place_shaves_against_the_objects() {
        let env = eval("(0,0).(-1,-1).(1,1);(10,0)?<");
        assert!(at(&env).abs_diff_eq(dvec2(1.0, 0.0), 1e-5));
    }

    #[test]
    fn place_intercepts_a_line() {
        let env = eval("(0,0);(10,0)?!{(3,-1);(3,1)}");
        assert!(at(&env).abs_diff_eq(dvec2(3.0, 0.0), 1e-5));
    }

    #[test]
    fn missed_intercept_keeps_the_place() {
        let env = eval("(0,0);(10,0)?!{(20,-1);(20,1)}");
        assert!(at(&env).abs_diff_eq(dvec2(5.0, 0.0), 1e-9));
    }

    // ========================================================================
    // Decoration tests
    // ========================================================================

    #[test]
    fn save_and_restore() {
        let env = eval("(1,1)\\save(5,5)=\"far\"\\restore");
        assert_eq!(at(&env), dvec2(1.0, 1.0));
        assert!(env.lookup("far").is_ok());
    }

    #[test]
    fn restore_without_save_fails() {
        let mut env = Env::new(1.0);
        assert_eq!(
            eval_in(&mut env, "(0,0)\\restore"),
            Err(ExecutionError::UnbalancedRestore)
        );
    }

    #[test]
    fn pos_and_ignore() {
        let env = eval("(1,1)\\POS(2,2)\\xyignore{(9,9)}");
        assert_eq!(at(&env), dvec2(2.0, 2.0));
    }

    #[test]
    fn hop_outside_a_matrix_fails() {
        let mut env = Env::new(1.0);
        assert_eq!(
            eval_in(&mut env, "[r]"),
            Err(ExecutionError::HopOutsideMatrix)
        );
    }
}

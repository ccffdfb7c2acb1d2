//! Grammar for xy diagrams, built on [`crate::combinator`].
//!
//! Each rule is a memoized thunk declared with [`crate::rule!`]; rules refer
//! to one another through [`lazy`], so declaration order does not matter.
//! Text fragments (`{...}` objects, raw matrix entries, labels) are handed
//! to the host as soon as they are recognized and only their handle is kept.

use crate::ast::*;
use crate::combinator::{
    Context, Input, Parser, Reply, either, end, failure, lazy, literal, longest_or, named_pattern,
    success,
};
use crate::errors::{SourceInfo, SyntaxError};
use crate::host::Host;
use crate::log::debug;
use crate::rule;
use crate::types::{Dimension, Unit};

/// Arrow tips, longest spelling first.
const TIPS: &str = r">>|<<|\|\||\^>|_>|\^<|_<|\^\||_\||\^\(|_\(|\^\)|_\)|>|<|\||\(|\)|x|/|\+|o|\*";
/// Arrow stems, longest spelling first.
const STEMS: &str = r"--|-|\.\.|\.|==|=|~~|~|::|:";
const DIR_NAMES: &str = r">>|<<|\|\||\^>|_>|\^<|_<|\^\||_\||\^\(|_\(|\^\)|_\)|>|<|\||\(|\)|x|/|\+|o|\*|--|-|\.\.|\.|==|=|~~|~|::|:";
const DIAGONALS: &str = "ul|ur|dl|dr|lu|ld|ru|rd|l|r|u|d";

/// Commands that end the raw text of a matrix entry.
const DECOR_COMMANDS: [&str; 10] = [
    "save", "restore", "POS", "afterPOS", "drop", "connect", "relax", "xyignore", "ar", "PATH",
];

/// Parse a complete diagram.
pub fn parse(source: &str, host: &dyn Host) -> Result<PosDecor, SyntaxError> {
    parse_named(source, &SourceInfo::default(), host)
}

/// Parse a complete diagram whose position in the enclosing document is
/// described by `info`.
pub fn parse_named(
    source: &str,
    info: &SourceInfo,
    host: &dyn Host,
) -> Result<PosDecor, SyntaxError> {
    parse_with(&diagram(), source, info, host)
}

/// Run any rule over the whole of `source`.
pub fn parse_with<T: 'static>(
    rule: &Parser<T>,
    source: &str,
    info: &SourceInfo,
    host: &dyn Host,
) -> Result<T, SyntaxError> {
    let ctx = Context::new(host);
    let input = Input::new(source, &ctx);
    let whole = rule.clone().then_ignore(end());
    match whole.parse(input) {
        Reply::Success(value, _) => Ok(value),
        Reply::Failure(failed) | Reply::Error(failed) => {
            let (offset, message) = match ctx.deepest() {
                Some(deepest) if deepest.offset >= failed.at.offset() => {
                    (deepest.offset, deepest.message)
                }
                _ => (failed.at.offset(), failed.message.into_owned()),
            };
            debug!(offset, message = %message, "diagram rejected");
            Err(SyntaxError::at(info, source, offset, message))
        }
    }
}

// ============================================================================
// Token helpers
// ============================================================================

fn lit(text: &'static str) -> Parser<&'static str> {
    literal(text)
}

fn token<T: Clone + 'static>(text: &'static str, value: T) -> Parser<T> {
    literal(text).map(move |_| value.clone())
}

/// `\name`, not followed by another letter.
fn control(name: &'static str) -> Parser<()> {
    Parser::new(move |input: Input<'_>| {
        let at = input.skip_ignorable();
        let matched = at
            .rest()
            .strip_prefix('\\')
            .and_then(|rest| rest.strip_prefix(name))
            .is_some_and(|after| !after.starts_with(|c: char| c.is_ascii_alphabetic()));
        if matched {
            Reply::Success((), at.advance(name.len() + 1))
        } else {
            at.fail(format!("expected `\\{name}`"))
        }
    })
}

/// Byte index of the `}` closing the `{` that starts `text`.
fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The raw source between balanced braces.
fn braced_source() -> Parser<String> {
    Parser::new(|input: Input<'_>| {
        let at = input.skip_ignorable();
        let rest = at.rest();
        if !rest.starts_with('{') {
            return at.fail("expected `{`");
        }
        match closing_brace(rest) {
            Some(close) => Reply::Success(rest[1..close].to_string(), at.advance(close + 1)),
            None => at.fail("unbalanced `{`"),
        }
    })
}

/// Turn matched source into a host text node.
fn as_text(source: Parser<String>) -> Parser<TextBox> {
    Parser::new(move |input: Input<'_>| {
        let start = input.skip_ignorable().offset();
        let ctx = input.context();
        source.parse(input).map(|source| {
            let handle = ctx.create_text(start, &source);
            TextBox { source, handle }
        })
    })
}

fn quoted_id() -> Parser<String> {
    named_pattern(r#""[^"]*""#, "quoted name").map(|s| s[1..s.len() - 1].to_string())
}

fn to_number(text: String) -> Parser<f64> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match cleaned.parse::<f64>() {
        Ok(value) => success(value),
        Err(_) => failure("malformed number"),
    }
}

fn diagonal() -> Parser<Diagonal> {
    named_pattern(DIAGONALS, "direction").flat_map(|name| match Diagonal::from_name(&name) {
        Some(d) => success(d),
        None => failure("expected direction"),
    })
}

fn adjust() -> Parser<Adjust> {
    either(vec![
        token("=", Adjust::Set),
        token("+", Adjust::Add),
        token("-", Adjust::Sub),
    ])
}

fn number_pair() -> Parser<(f64, f64)> {
    lit("(")
        .ignore_then(lazy(number))
        .then_ignore(lit(","))
        .then(lazy(number))
        .then_ignore(lit(")"))
}

fn frame_kind(name: &str) -> Option<FrameKind> {
    Some(match name {
        "-" => FrameKind::Solid,
        "--" => FrameKind::Dashed,
        "." => FrameKind::Dotted,
        "=" | "==" => FrameKind::Double,
        "o" => FrameKind::Circle,
        "oo" => FrameKind::DoubleCircle,
        "e" => FrameKind::Ellipse,
        "," => FrameKind::Shadow,
        _ => return None,
    })
}

// ============================================================================
// Numbers and dimensions
// ============================================================================

rule! {
    fn decimal() -> f64 {
        named_pattern(r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)", "number").flat_map(to_number)
    }
}

rule! {
    /// A decimal that may contain spaces around its point, as in `1 .5`.
    fn loose_decimal() -> f64 {
        named_pattern(r"[+-]?\s*(?:\d+(?:\s*\.\s*\d*)?|\.\s*\d+)", "number").flat_map(to_number)
    }
}

rule! {
    pub fn number() -> f64 {
        longest_or(lazy(decimal), lazy(loose_decimal))
    }
}

rule! {
    fn unit() -> Unit {
        named_pattern("em|ex|px|pt|pc|in|cm|mm|mu|bp|dd|cc|sp", "unit").flat_map(|name| {
            match Unit::from_name(&name) {
                Some(unit) => success(unit),
                None => failure("expected unit"),
            }
        })
    }
}

rule! {
    pub fn dimen() -> Dimension {
        lazy(number)
            .then(lazy(unit))
            .map(|(value, unit)| Dimension::new(value, unit))
    }
}

// ============================================================================
// Positions
// ============================================================================

rule! {
    pub fn pos_decor() -> PosDecor {
        lazy(pos)
            .then(lazy(decor))
            .map(|(pos, decor)| PosDecor { pos, decor })
    }
}

rule! {
    pub fn pos() -> Pos {
        lazy(coord)
            .then(lazy(pos_op).repeated())
            .map(|(coord, ops)| Pos { coord, ops })
    }
}

rule! {
    fn pos_op() -> PosOp {
        either(vec![
            lit("+").ignore_then(lazy(coord)).map(PosOp::Plus),
            lit("-").ignore_then(lazy(coord)).map(PosOp::Minus),
            lit("!").ignore_then(lazy(coord)).map(PosOp::Skew),
            lit(".").ignore_then(lazy(coord)).map(PosOp::Cover),
            lit(",").ignore_then(lazy(coord)).map(PosOp::Then),
            lit(";").ignore_then(lazy(coord)).map(PosOp::SwapPAndC),
            lit("::").ignore_then(lazy(coord)).map(PosOp::SetYBase),
            lit(":").ignore_then(lazy(coord)).map(PosOp::SetBase),
            lit("**").ignore_then(lazy(object)).map(PosOp::Connect),
            lit("*").ignore_then(lazy(object)).map(PosOp::Drop),
            lit("?").ignore_then(lazy(place)).map(PosOp::Place),
            lit("@+").ignore_then(lazy(coord)).map(PosOp::PushCoord),
            lit("@-").ignore_then(lazy(coord)).map(PosOp::PopCoord),
            lit("@=").ignore_then(lazy(coord)).map(PosOp::LoadStack),
            lit("@@").ignore_then(lazy(coord)).map(PosOp::DoCoord),
            token("@i", PosOp::InitStack),
            token("@(", PosOp::EnterFrame),
            token("@)", PosOp::LeaveFrame),
            lit("=:").ignore_then(quoted_id()).map(PosOp::SaveBase),
            lit("=@").ignore_then(quoted_id()).map(PosOp::SaveStack),
            lit("=").ignore_then(either(vec![
                quoted_id().map(PosOp::SavePos),
                lazy(nonempty_coord)
                    .then(quoted_id())
                    .map(|(coord, id)| PosOp::SaveMacro(coord, id)),
            ])),
        ])
    }
}

rule! {
    pub fn coord() -> Coord {
        lazy(nonempty_coord).or(success(Coord::C))
    }
}

rule! {
    fn nonempty_coord() -> Coord {
        either(vec![
            lazy(vector).map(Coord::Vector),
            token("c", Coord::C),
            token("p", Coord::P),
            token("x", Coord::X),
            token("y", Coord::Y),
            lazy(stack_position),
            quoted_id().map(Coord::Id),
            lit("{")
                .ignore_then(lazy(pos_decor))
                .then_ignore(lit("}"))
                .map(|pd| Coord::Group(Box::new(pd))),
            lit("[")
                .ignore_then(lazy(hop).repeated())
                .then_ignore(lit("]"))
                .map(Coord::Hop),
        ])
    }
}

rule! {
    fn stack_position() -> Coord {
        lit("s")
            .ignore_then(either(vec![
                named_pattern(r"\d", "digit"),
                lit("{")
                    .ignore_then(named_pattern(r"\d+", "stack index"))
                    .then_ignore(lit("}")),
            ]))
            .flat_map(|digits| match digits.parse() {
                Ok(n) => success(Coord::StackPosition(n)),
                Err(_) => failure("expected stack index"),
            })
    }
}

rule! {
    fn hop() -> Hop {
        either(vec![
            token("u", Hop::Up),
            token("d", Hop::Down),
            token("l", Hop::Left),
            token("r", Hop::Right),
        ])
    }
}

rule! {
    pub fn vector() -> Vector {
        either(vec![
            lit("(")
                .ignore_then(lazy(number))
                .then_ignore(lit(","))
                .then(lazy(number))
                .then_ignore(lit(")"))
                .map(|(x, y)| Vector::InBase { x, y }),
            lit("<")
                .ignore_then(lazy(dimen))
                .then(lit(",").ignore_then(lazy(dimen)).optional())
                .then_ignore(lit(">"))
                .map(|(x, y)| Vector::Absolute { x, y: y.unwrap_or(x) }),
            lit("a")
                .ignore_then(lit("("))
                .ignore_then(lazy(number))
                .then_ignore(lit(")"))
                .map(Vector::Angle),
            named_pattern("CL|CR|CD|CU|LD|RD|LU|RU|L|R|D|U|E|P|A", "corner")
                .then(lit("(").ignore_then(lazy(number)).then_ignore(lit(")")).optional())
                .flat_map(|(name, factor)| match Corner::from_name(&name) {
                    Some(corner) => success(Vector::Corner { corner, factor }),
                    None => failure("expected corner"),
                }),
            lit("/")
                .ignore_then(lazy(direction))
                .then(lazy(dimen))
                .then_ignore(lit("/"))
                .map(|(direction, length)| Vector::Along { direction, length }),
        ])
    }
}

rule! {
    pub fn place() -> Place {
        either(vec![token("<", true), token(">", false)])
            .repeated()
            .then(lit("(").ignore_then(lazy(number)).then_ignore(lit(")")).optional())
            .then(
                lit("!")
                    .ignore_then(lit("{"))
                    .ignore_then(lazy(pos_decor))
                    .then_ignore(lit("}"))
                    .optional(),
            )
            .then(lazy(slide).optional())
            .map(|(((shaves, factor), intercept), slide)| Place {
                shave_start: shaves.iter().filter(|&&start| start).count(),
                shave_end: shaves.iter().filter(|&&start| !start).count(),
                factor,
                intercept: intercept.map(Box::new),
                slide,
            })
    }
}

rule! {
    fn slide() -> Dimension {
        lit("/").ignore_then(lazy(dimen)).then_ignore(lit("/"))
    }
}

// ============================================================================
// Directions
// ============================================================================

rule! {
    pub fn direction() -> Direction {
        either(vec![lazy(direction_base), success(DirectionBase::Current)])
            .then(lazy(turn).repeated())
            .map(|(base, turns)| Direction { base, turns })
    }
}

rule! {
    /// A direction that names something, usable where an empty one would be
    /// ambiguous.
    fn nonempty_direction() -> Direction {
        lazy(direction_base)
            .then(lazy(turn).repeated())
            .map(|(base, turns)| Direction { base, turns })
    }
}

rule! {
    fn direction_base() -> DirectionBase {
        either(vec![
            diagonal().map(DirectionBase::Diagonal),
            lit("v")
                .ignore_then(lazy(vector))
                .map(|v| DirectionBase::Vector(Box::new(v))),
            lit("q")
                .ignore_then(lit("{"))
                .ignore_then(lazy(pos_decor))
                .then_ignore(lit("}"))
                .map(|pd| DirectionBase::Toward(Box::new(pd))),
        ])
    }
}

rule! {
    fn turn() -> Turn {
        either(vec![
            token("^", Turn::Anticlockwise),
            token("_", Turn::Clockwise),
        ])
    }
}

// ============================================================================
// Objects
// ============================================================================

rule! {
    pub fn object() -> Object {
        lazy(modifier)
            .repeated()
            .then(lazy(object_box))
            .map(|(modifiers, object)| Object { modifiers, object })
    }
}

rule! {
    fn modifier() -> Modifier {
        either(vec![
            lit("!").ignore_then(lazy(vector)).map(Modifier::Shift),
            token("!", Modifier::ResetReference),
            lit("+").ignore_then(lazy(vector).optional()).map(Modifier::Grow),
            lit("-").ignore_then(lazy(vector).optional()).map(Modifier::Shrink),
            lit("=").ignore_then(lazy(vector)).map(Modifier::Size),
            lit("[")
                .ignore_then(lazy(shape_modifier))
                .then_ignore(lit("]"))
                .map(Modifier::Shape),
            token("i", Modifier::Invisible),
            token("h", Modifier::Hidden),
            lazy(nonempty_direction).map(Modifier::Direction),
        ])
    }
}

rule! {
    fn shape_modifier() -> ShapeModifier {
        named_pattern(r"F--|F-|F=|F\.|F,|Fo|F|o|l|r|u|d|c", "shape").flat_map(|name| {
            let shape = match name.as_str() {
                "o" => ShapeModifier::Circle,
                "l" => ShapeModifier::Left,
                "r" => ShapeModifier::Right,
                "u" => ShapeModifier::Up,
                "d" => ShapeModifier::Down,
                "c" => ShapeModifier::Center,
                "F" => ShapeModifier::Frame(FrameKind::Solid),
                frame => match frame_kind(&frame[1..]) {
                    Some(kind) => ShapeModifier::Frame(kind),
                    None => return failure("expected shape"),
                },
            };
            success(shape)
        })
    }
}

rule! {
    fn text() -> TextBox {
        as_text(braced_source())
    }
}

rule! {
    fn object_box() -> ObjectBox {
        either(vec![
            lazy(text).map(ObjectBox::Text),
            control("txt").ignore_then(lazy(txt_lines)).map(ObjectBox::Txt),
            lit("@").ignore_then(lazy(dir_spec)),
            control("dir").ignore_then(lazy(dir_spec)),
            control("cir")
                .ignore_then(lazy(vector).optional())
                .then(lit("{").ignore_then(lazy(cir_arc).optional()).then_ignore(lit("}")))
                .map(|(radius, arc)| ObjectBox::Cir {
                    radius,
                    arc: arc.unwrap_or(CirArc::Full),
                }),
            control("frm")
                .ignore_then(lazy(vector).optional())
                .then(
                    lit("{")
                        .ignore_then(named_pattern(r"--|-|\.|==|=|oo|o|e|,", "frame kind"))
                        .then_ignore(lit("}")),
                )
                .flat_map(|(radius, name)| match frame_kind(&name) {
                    Some(kind) => success(ObjectBox::Frame { radius, kind }),
                    None => failure("expected frame kind"),
                }),
            control("object")
                .ignore_then(lazy(object))
                .map(|o| ObjectBox::Object(Box::new(o))),
            control("composite")
                .ignore_then(lit("{"))
                .ignore_then(lazy(object).separated_by(lit("*")))
                .then_ignore(lit("}"))
                .map(ObjectBox::Composite),
            control("xybox")
                .ignore_then(lit("{"))
                .ignore_then(lazy(pos_decor))
                .then_ignore(lit("}"))
                .map(|pd| ObjectBox::XyBox(Box::new(pd))),
            control("crv")
                .ignore_then(lit("{"))
                .ignore_then(lazy(pos).separated_by(lit("&")))
                .then_ignore(lit("}"))
                .map(ObjectBox::Curve),
            control("xyimport")
                .ignore_then(number_pair())
                .then(number_pair().optional())
                .then(lazy(text))
                .map(|(((width, height), origin), body)| {
                    let (x, y) = origin.unwrap_or((0.0, 0.0));
                    ObjectBox::Import {
                        width,
                        height,
                        x,
                        y,
                        body,
                    }
                }),
            control("xymatrix")
                .ignore_then(lazy(matrix))
                .map(|m| ObjectBox::Matrix(Box::new(m))),
        ])
    }
}

rule! {
    /// `\txt` body: lines separated by `\\`, each its own text node.
    fn txt_lines() -> Vec<TextBox> {
        Parser::new(|input: Input<'_>| {
            let start = input.skip_ignorable().offset();
            let ctx = input.context();
            braced_source().parse(input).map(|body| {
                body.split("\\\\")
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .enumerate()
                    .map(|(i, line)| TextBox {
                        source: line.to_string(),
                        handle: ctx.create_text(start + i, line),
                    })
                    .collect()
            })
        })
    }
}

rule! {
    /// `variant? {name}` after `\dir` or `@`.
    fn dir_spec() -> ObjectBox {
        either(vec![
            token("^", DirVariant::Above),
            token("_", DirVariant::Below),
            token("2", DirVariant::Double),
            token("3", DirVariant::Triple),
        ])
        .optional()
        .then(
            lit("{")
                .ignore_then(named_pattern(DIR_NAMES, "direction name").optional())
                .then_ignore(lit("}")),
        )
        .map(|(variant, name)| ObjectBox::Dir {
            variant: variant.unwrap_or(DirVariant::Plain),
            name: name.unwrap_or_default(),
        })
    }
}

rule! {
    fn cir_arc() -> CirArc {
        diagonal()
            .then(lazy(turn))
            .then(diagonal())
            .map(|((from, orientation), to)| CirArc::Arc {
                from,
                orientation,
                to,
            })
    }
}

// ============================================================================
// Decorations, arrows and paths
// ============================================================================

rule! {
    pub fn decor() -> Decor {
        lazy(command).repeated().map(|commands| Decor { commands })
    }
}

rule! {
    fn command() -> Command {
        either(vec![
            control("save").ignore_then(lazy(pos)).map(Command::Save),
            control("restore").map(|_| Command::Restore),
            control("POS").ignore_then(lazy(pos)).map(Command::Pos),
            control("afterPOS")
                .ignore_then(lit("{"))
                .ignore_then(lazy(decor))
                .then_ignore(lit("}"))
                .then(lazy(pos))
                .map(|(decor, pos)| Command::AfterPos { decor, pos }),
            control("drop").ignore_then(lazy(object)).map(Command::Drop),
            control("connect").ignore_then(lazy(object)).map(Command::Connect),
            control("relax").map(|_| Command::Relax),
            control("xyignore")
                .ignore_then(lit("{"))
                .ignore_then(lazy(pos_decor))
                .then_ignore(lit("}"))
                .map(|pd| Command::Ignore(Box::new(pd))),
            control("ar")
                .ignore_then(lazy(arrow).commit())
                .map(|(forms, path)| Command::Ar { forms, path }),
            control("PATH")
                .ignore_then(lazy(path).commit())
                .map(Command::Path),
        ])
    }
}

rule! {
    fn arrow() -> (Vec<ArrowForm>, Path) {
        lazy(arrow_form).repeated().then(lazy(path))
    }
}

rule! {
    fn arrow_form() -> ArrowForm {
        let tip = || named_pattern(TIPS, "arrow tip").optional();
        let style = tip()
            .then(named_pattern(STEMS, "arrow stem").optional())
            .then(tip())
            .then_ignore(lit("}"))
            .map(|((tail, stem), head)| match (tail, stem, head) {
                (Some(only), None, None) => ArrowForm::Style {
                    tail: String::new(),
                    stem: String::new(),
                    head: only,
                },
                (tail, stem, head) => ArrowForm::Style {
                    tail: tail.unwrap_or_default(),
                    stem: stem.unwrap_or_default(),
                    head: head.unwrap_or_default(),
                },
            });
        lit("@").ignore_then(either(vec![
            lit("{").ignore_then(style.commit()),
            lit("/")
                .ignore_then(lazy(turn))
                .then(lazy(dimen).optional())
                .then_ignore(lit("/"))
                .map(|(side, amount)| ArrowForm::Curve { side, amount }),
            lit("<")
                .ignore_then(lazy(dimen))
                .then_ignore(lit(">"))
                .map(ArrowForm::Slide),
            lit("(")
                .ignore_then(lazy(direction))
                .then_ignore(lit(","))
                .then(lazy(direction))
                .then_ignore(lit(")"))
                .map(|(out, into)| ArrowForm::Loop { out, into }),
            token("2", ArrowForm::Variant(2)),
            token("3", ArrowForm::Variant(3)),
        ]))
    }
}

rule! {
    fn path() -> Path {
        either(vec![
            token("'", SegmentKind::Straight),
            token("`", SegmentKind::Turn),
        ])
        .then(lazy(segment))
        .repeated()
        .then(lazy(segment))
        .map(|(turns, last)| {
            let mut segments: Vec<Segment> = turns
                .into_iter()
                .map(|(kind, segment)| Segment { kind, ..segment })
                .collect();
            segments.push(last);
            Path { segments }
        })
    }
}

rule! {
    fn segment() -> Segment {
        lazy(pos)
            .then(lazy(slide).optional())
            .then(lazy(label).repeated())
            .map(|((pos, slide), labels)| Segment {
                kind: SegmentKind::Last,
                pos,
                slide,
                labels,
            })
    }
}

rule! {
    fn label() -> Label {
        either(vec![
            token("^", LabelSide::Above),
            token("_", LabelSide::Below),
            token("|", LabelSide::At),
        ])
        .then(lazy(place))
        .then(lazy(label_object))
        .map(|((side, place), object)| Label {
            side,
            place,
            object,
        })
    }
}

rule! {
    fn label_object() -> Object {
        either(vec![
            lit("*").ignore_then(lazy(object)),
            lit("@").ignore_then(lazy(dir_spec)).map(Object::plain),
            lazy(text).map(|t| Object::plain(ObjectBox::Text(t))),
            as_text(named_pattern(r"\\[A-Za-z]+|[A-Za-z0-9]", "label"))
                .map(|t| Object::plain(ObjectBox::Text(t))),
        ])
    }
}

// ============================================================================
// Matrices
// ============================================================================

rule! {
    pub fn matrix() -> Matrix {
        lazy(matrix_setup)
            .repeated()
            .then(lit("{").ignore_then(lazy(matrix_rows)).then_ignore(lit("}")))
            .map(|(setup, rows)| Matrix { setup, rows })
    }
}

rule! {
    fn matrix_setup() -> MatrixSetup {
        let axis = || either(vec![token("R", Axis::Rows), token("C", Axis::Columns)]);
        lit("@").ignore_then(either(vec![
            lit("!")
                .ignore_then(either(vec![axis().map(Some), token("0", None)]).optional())
                .map(|switch| match switch {
                    None => MatrixSetup::Equal(Axis::Both),
                    Some(Some(axis)) => MatrixSetup::Equal(axis),
                    Some(None) => MatrixSetup::IgnoreEntrySizes,
                }),
            lit("M")
                .ignore_then(adjust())
                .then(lazy(dimen))
                .map(|(a, d)| MatrixSetup::EntryMargin(a, d)),
            lit("W")
                .ignore_then(adjust())
                .then(lazy(dimen))
                .map(|(a, d)| MatrixSetup::EntryWidth(a, d)),
            lit("H")
                .ignore_then(adjust())
                .then(lazy(dimen))
                .map(|(a, d)| MatrixSetup::EntryHeight(a, d)),
            lit("L")
                .ignore_then(adjust())
                .then(lazy(dimen))
                .map(|(a, d)| MatrixSetup::LabelMargin(a, d)),
            lit("*")
                .ignore_then(lazy(modifier).repeated1())
                .map(MatrixSetup::EntryModifiers),
            axis()
                .optional()
                .then(adjust())
                .then(lazy(dimen))
                .map(|((axis, adjust), amount)| MatrixSetup::Spacing {
                    axis: axis.unwrap_or(Axis::Both),
                    adjust,
                    amount,
                }),
        ]))
    }
}

rule! {
    fn matrix_rows() -> Vec<Vec<Entry>> {
        lazy(matrix_row)
            .separated_by(lit("\\\\"))
            .map(|mut rows| {
                while rows
                    .last()
                    .is_some_and(|row| row.len() == 1 && row[0].is_empty())
                {
                    rows.pop();
                }
                rows
            })
    }
}

rule! {
    fn matrix_row() -> Vec<Entry> {
        lazy(entry).separated_by(lit("&"))
    }
}

rule! {
    fn entry() -> Entry {
        either(vec![
            lit("*").ignore_then(lazy(object)).map(Some),
            entry_text().map(|text| text.map(|t| Object::plain(ObjectBox::Text(t)))),
        ])
        .then(lazy(decor))
        .map(|(object, decor)| Entry { object, decor })
    }
}

/// Raw entry text, up to the next `&`, `\\`, closing `}` or decoration
/// command at brace depth zero.
fn entry_text() -> Parser<Option<TextBox>> {
    Parser::new(|input: Input<'_>| {
        let at = input.skip_ignorable();
        let rest = at.rest();
        let mut depth = 0usize;
        let mut end = rest.len();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    end = i;
                    break;
                }
                '}' => depth -= 1,
                '&' if depth == 0 => {
                    end = i;
                    break;
                }
                '\\' => {
                    let after = &rest[i + 1..];
                    if depth == 0 && after.starts_with('\\') {
                        end = i;
                        break;
                    }
                    let name_len = after
                        .find(|c: char| !c.is_ascii_alphabetic())
                        .unwrap_or(after.len());
                    if name_len == 0 {
                        chars.next();
                        continue;
                    }
                    if depth == 0 && DECOR_COMMANDS.contains(&&after[..name_len]) {
                        end = i;
                        break;
                    }
                    for _ in 0..name_len {
                        chars.next();
                    }
                }
                _ => {}
            }
        }
        let source = rest[..end].trim();
        let next = at.advance(end);
        if source.is_empty() {
            Reply::Success(None, next)
        } else {
            let handle = at.context().create_text(at.offset(), source);
            Reply::Success(
                Some(TextBox {
                    source: source.to_string(),
                    handle,
                }),
                next,
            )
        }
    })
}

// ============================================================================
// Root
// ============================================================================

rule! {
    /// A whole diagram: a bare `\xymatrix`, an `\xy ... \endxy` block, or a
    /// position with its decoration.
    pub fn diagram() -> PosDecor {
        either(vec![
            control("xymatrix").ignore_then(lazy(matrix)).map(|m| PosDecor {
                pos: Pos {
                    coord: Coord::C,
                    ops: vec![PosOp::Drop(Object::plain(ObjectBox::Matrix(Box::new(m))))],
                },
                decor: Decor::default(),
            }),
            control("xy")
                .ignore_then(lazy(pos_decor))
                .then_ignore(control("endxy")),
            lazy(pos_decor),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MonospaceHost;

    fn parse_rule<T: 'static>(rule: Parser<T>, src: &str) -> Result<T, SyntaxError> {
        let host = MonospaceHost::new();
        parse_with(&rule, src, &SourceInfo::default(), &host)
    }

    fn root(src: &str) -> PosDecor {
        let host = MonospaceHost::new();
        parse(src, &host).unwrap()
    }

    // ========================================================================
    // Number tests
    // ========================================================================

    #[test]
    fn numbers_strict_and_loose() {
        assert_eq!(parse_rule(number(), "1.5").unwrap(), 1.5);
        assert_eq!(parse_rule(number(), "-.25").unwrap(), -0.25);
        assert_eq!(parse_rule(number(), "3.").unwrap(), 3.0);
        assert_eq!(parse_rule(number(), "1 .5").unwrap(), 1.5);
        assert_eq!(parse_rule(number(), "- 2").unwrap(), -2.0);
    }

    #[test]
    fn dimensions_carry_units() {
        assert_eq!(parse_rule(dimen(), "2pc").unwrap(), Dimension::new(2.0, Unit::Pc));
        assert_eq!(parse_rule(dimen(), "1.5 em").unwrap(), Dimension::em(1.5));
        assert!(parse_rule(dimen(), "3 furlongs").is_err());
    }

    // ========================================================================
    // Position tests
    // ========================================================================

    #[test]
    fn current_coordinate() {
        let pd = root("c");
        assert_eq!(pd.pos.coord, Coord::C);
        assert!(pd.pos.ops.is_empty());
        assert!(pd.decor.commands.is_empty());
    }

    #[test]
    fn postfix_operators_stay_unevaluated_and_ordered() {
        let pd = root("(0,0)+(1,0)+(0,1)");
        assert_eq!(
            pd.pos.coord,
            Coord::Vector(Vector::InBase { x: 0.0, y: 0.0 })
        );
        assert_eq!(
            pd.pos.ops,
            vec![
                PosOp::Plus(Coord::Vector(Vector::InBase { x: 1.0, y: 0.0 })),
                PosOp::Plus(Coord::Vector(Vector::InBase { x: 0.0, y: 1.0 })),
            ]
        );
    }

    #[test]
    fn every_operator_has_its_own_variant() {
        let pd = root(r#"c;p:(1,0)::(0,1),x.y!"A"-s0@+c@-c@=c@@c@i@(@)="B"=(1,1)"M"=:"b"=@"st""#);
        let names: Vec<&str> = pd
            .pos
            .ops
            .iter()
            .map(|op| match op {
                PosOp::SwapPAndC(_) => "swap",
                PosOp::SetBase(_) => "base",
                PosOp::SetYBase(_) => "ybase",
                PosOp::Then(_) => "then",
                PosOp::Cover(_) => "cover",
                PosOp::Skew(_) => "skew",
                PosOp::Minus(_) => "minus",
                PosOp::PushCoord(_) => "push",
                PosOp::PopCoord(_) => "pop",
                PosOp::LoadStack(_) => "load",
                PosOp::DoCoord(_) => "do",
                PosOp::InitStack => "init",
                PosOp::EnterFrame => "enter",
                PosOp::LeaveFrame => "leave",
                PosOp::SavePos(_) => "save",
                PosOp::SaveMacro(..) => "macro",
                PosOp::SaveBase(_) => "savebase",
                PosOp::SaveStack(_) => "savestack",
                _ => "other",
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "swap", "base", "ybase", "then", "cover", "skew", "minus", "push", "pop", "load",
                "do", "init", "enter", "leave", "save", "macro", "savebase", "savestack"
            ]
        );
    }

    #[test]
    fn vectors_and_corners() {
        assert_eq!(
            parse_rule(vector(), "<2pt>").unwrap(),
            Vector::Absolute {
                x: Dimension::pt(2.0),
                y: Dimension::pt(2.0)
            }
        );
        assert_eq!(
            parse_rule(vector(), "RU(.5)").unwrap(),
            Vector::Corner {
                corner: Corner::RU,
                factor: Some(0.5)
            }
        );
        assert_eq!(parse_rule(vector(), "a(30)").unwrap(), Vector::Angle(30.0));
        let along = parse_rule(vector(), "/ur^ 1em/").unwrap();
        assert_eq!(
            along,
            Vector::Along {
                direction: Direction {
                    base: DirectionBase::Diagonal(Diagonal::RU),
                    turns: vec![Turn::Anticlockwise],
                },
                length: Dimension::em(1.0),
            }
        );
        let toward = parse_rule(vector(), "/v(1,2) 3mm/").unwrap();
        assert_eq!(
            toward,
            Vector::Along {
                direction: Direction {
                    base: DirectionBase::Vector(Box::new(Vector::InBase { x: 1.0, y: 2.0 })),
                    turns: vec![],
                },
                length: Dimension::new(3.0, Unit::Mm),
            }
        );
    }

    #[test]
    fn places_count_shaves() {
        let parsed = parse_rule(place(), "<<(.3)/2pt/").unwrap();
        assert_eq!(parsed.shave_start, 2);
        assert_eq!(parsed.shave_end, 0);
        assert_eq!(parsed.factor, Some(0.3));
        assert_eq!(parsed.slide, Some(Dimension::pt(2.0)));
        assert_eq!(parse_rule(place(), "").unwrap(), Place::default());
    }

    // ========================================================================
    // Object tests
    // ========================================================================

    #[test]
    fn objects_with_modifiers() {
        let obj = parse_rule(object(), "+<1pt>[o][F]!{A}").unwrap();
        assert_eq!(obj.modifiers.len(), 4);
        assert_eq!(obj.modifiers[1], Modifier::Shape(ShapeModifier::Circle));
        assert_eq!(
            obj.modifiers[2],
            Modifier::Shape(ShapeModifier::Frame(FrameKind::Solid))
        );
        assert_eq!(obj.modifiers[3], Modifier::ResetReference);
        match obj.object {
            ObjectBox::Text(t) => assert_eq!(t.source, "A"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dir_cir_and_frm() {
        assert_eq!(
            parse_rule(object(), "\\dir2{>>}").unwrap().object,
            ObjectBox::Dir {
                variant: DirVariant::Double,
                name: ">>".into()
            }
        );
        assert_eq!(
            parse_rule(object(), "\\dir{}").unwrap().object,
            ObjectBox::Dir {
                variant: DirVariant::Plain,
                name: String::new()
            }
        );
        assert_eq!(
            parse_rule(object(), "\\cir<4pt>{ur_dl}").unwrap().object,
            ObjectBox::Cir {
                radius: Some(Vector::Absolute {
                    x: Dimension::pt(4.0),
                    y: Dimension::pt(4.0)
                }),
                arc: CirArc::Arc {
                    from: Diagonal::RU,
                    orientation: Turn::Clockwise,
                    to: Diagonal::LD
                },
            }
        );
        assert_eq!(
            parse_rule(object(), "\\frm{--}").unwrap().object,
            ObjectBox::Frame {
                radius: None,
                kind: FrameKind::Dashed
            }
        );
    }

    #[test]
    fn nested_braces_in_text() {
        let obj = parse_rule(object(), "{\\frac{a}{b}}").unwrap();
        match obj.object {
            ObjectBox::Text(t) => assert_eq!(t.source, "\\frac{a}{b}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_callback_runs_once_per_fragment() {
        let host = MonospaceHost::new();
        let pd = parse("(0,0)*{A}*{B}", &host).unwrap();
        assert_eq!(pd.pos.ops.len(), 2);
        assert_eq!(host.created(), 2);
    }

    #[test]
    fn txt_splits_lines() {
        let obj = parse_rule(object(), "\\txt{one\\\\two}").unwrap();
        match obj.object {
            ObjectBox::Txt(lines) => {
                let sources: Vec<_> = lines.iter().map(|l| l.source.as_str()).collect();
                assert_eq!(sources, vec!["one", "two"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // ========================================================================
    // Arrow and path tests
    // ========================================================================

    #[test]
    fn arrow_with_forms_and_labels() {
        let pd = root("\\ar@{=>}@/^1pc/@<2pt>[rr]^f_{g}|*{h}");
        let Command::Ar { forms, path } = &pd.decor.commands[0] else {
            panic!("expected \\ar");
        };
        assert_eq!(
            forms[0],
            ArrowForm::Style {
                tail: String::new(),
                stem: "=".into(),
                head: ">".into()
            }
        );
        assert_eq!(
            forms[1],
            ArrowForm::Curve {
                side: Turn::Anticlockwise,
                amount: Some(Dimension::new(1.0, Unit::Pc))
            }
        );
        assert_eq!(forms[2], ArrowForm::Slide(Dimension::pt(2.0)));
        let segment = &path.segments[0];
        assert_eq!(segment.pos.coord, Coord::Hop(vec![Hop::Right, Hop::Right]));
        let sides: Vec<_> = segment.labels.iter().map(|l| l.side).collect();
        assert_eq!(sides, vec![LabelSide::Above, LabelSide::Below, LabelSide::At]);
    }

    #[test]
    fn lone_tip_is_a_head() {
        let pd = root("\\ar@{>}[r]");
        let Command::Ar { forms, .. } = &pd.decor.commands[0] else {
            panic!("expected \\ar");
        };
        assert_eq!(
            forms[0],
            ArrowForm::Style {
                tail: String::new(),
                stem: String::new(),
                head: ">".into()
            }
        );
    }

    #[test]
    fn path_segments() {
        let pd = root("\\PATH '(1,0) `(1,1) (0,1)");
        let Command::Path(path) = &pd.decor.commands[0] else {
            panic!("expected \\PATH");
        };
        let kinds: Vec<_> = path.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Straight, SegmentKind::Turn, SegmentKind::Last]
        );
    }

    #[test]
    fn bad_stem_is_reported_where_it_occurs() {
        let host = MonospaceHost::new();
        let err = parse("\\ar@{-#>}[r]", &host).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 7);
    }

    // ========================================================================
    // Matrix tests
    // ========================================================================

    #[test]
    fn matrix_rows_entries_and_decor() {
        let pd = root("\\xymatrix@R=1pc@!C{ A \\ar[r] & *+[F]{B} \\\\ & C \\\\ }");
        let PosOp::Drop(obj) = &pd.pos.ops[0] else {
            panic!("expected a dropped matrix");
        };
        let ObjectBox::Matrix(m) = &obj.object else {
            panic!("expected a matrix");
        };
        assert_eq!(
            m.setup,
            vec![
                MatrixSetup::Spacing {
                    axis: Axis::Rows,
                    adjust: Adjust::Set,
                    amount: Dimension::new(1.0, Unit::Pc)
                },
                MatrixSetup::Equal(Axis::Columns),
            ]
        );
        assert_eq!(m.rows.len(), 2);
        assert_eq!(m.rows[0].len(), 2);
        assert_eq!(m.rows[0][0].decor.commands.len(), 1);
        assert!(m.rows[1][0].object.is_none());
        match &m.rows[1][1].object {
            Some(Object {
                object: ObjectBox::Text(t),
                ..
            }) => assert_eq!(t.source, "C"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn entry_text_keeps_nested_groups_and_macros() {
        let pd = root("\\xymatrix{ {a & b} & \\bullet \\save c \\restore }");
        let PosOp::Drop(obj) = &pd.pos.ops[0] else {
            panic!("expected a dropped matrix");
        };
        let ObjectBox::Matrix(m) = &obj.object else {
            panic!("expected a matrix");
        };
        assert_eq!(m.rows[0].len(), 2);
        let Some(Object {
            object: ObjectBox::Text(second),
            ..
        }) = &m.rows[0][1].object
        else {
            panic!("expected text");
        };
        assert_eq!(second.source, "\\bullet");
        assert_eq!(m.rows[0][1].decor.commands.len(), 2);
    }

    #[test]
    fn xy_block_and_comments() {
        let pd = root("\\xy (0,0)*{A} % the source\n ; (10,0) **\\dir{-} \\endxy");
        assert_eq!(pd.pos.ops.len(), 3);
        assert!(matches!(pd.pos.ops[2], PosOp::Connect(_)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let host = MonospaceHost::new();
        let err = parse("(0,0) *{A} #", &host).unwrap_err();
        assert_eq!(err.column, 12);
    }
}

//! AST types for xy diagrams
//!
//! One closed enum per syntactic category. Nodes own only their syntactic
//! children and are never evaluated during parsing: position operators are
//! kept as a left-to-right list on [`Pos`].

use crate::host::TextHandle;
use crate::types::Dimension;

/// Root of a diagram: a position followed by decoration commands.
#[derive(Debug, Clone, PartialEq)]
pub struct PosDecor {
    pub pos: Pos,
    pub decor: Decor,
}

// ============================================================================
// Positions
// ============================================================================

/// `coord pos2*`
#[derive(Debug, Clone, PartialEq)]
pub struct Pos {
    pub coord: Coord,
    pub ops: Vec<PosOp>,
}

impl Pos {
    pub fn just(coord: Coord) -> Self {
        Self {
            coord,
            ops: Vec::new(),
        }
    }
}

/// One postfix operator of the position algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum PosOp {
    /// `+ coord`
    Plus(Coord),
    /// `- coord`
    Minus(Coord),
    /// `! coord`
    Skew(Coord),
    /// `. coord`
    Cover(Coord),
    /// `, coord`
    Then(Coord),
    /// `; coord`
    SwapPAndC(Coord),
    /// `: coord`
    SetBase(Coord),
    /// `:: coord`
    SetYBase(Coord),
    /// `* object`
    Drop(Object),
    /// `** object`
    Connect(Object),
    /// `? place`
    Place(Place),
    /// `@+ coord`
    PushCoord(Coord),
    /// `@- coord`
    PopCoord(Coord),
    /// `@= coord`
    LoadStack(Coord),
    /// `@@ coord`
    DoCoord(Coord),
    /// `@i`
    InitStack,
    /// `@(`
    EnterFrame,
    /// `@)`
    LeaveFrame,
    /// `= "id"`
    SavePos(String),
    /// `= coord "id"`
    SaveMacro(Coord, String),
    /// `=: "id"`
    SaveBase(String),
    /// `=@ "id"`
    SaveStack(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coord {
    /// `c`, also the empty coordinate
    C,
    /// `p`
    P,
    /// `x`: where the line p–c meets the x axis
    X,
    /// `y`: where the line p–c meets the y axis
    Y,
    /// `s<n>` / `s{n}`
    StackPosition(usize),
    /// `"id"`
    Id(String),
    /// `{pos decor}`
    Group(Box<PosDecor>),
    /// `[hops]`, relative to the current matrix entry
    Hop(Vec<Hop>),
    Vector(Vector),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    /// `(x,y)` in the current basis
    InBase { x: f64, y: f64 },
    /// `<dx,dy>` absolute
    Absolute { x: Dimension, y: Dimension },
    /// `a(degrees)`
    Angle(f64),
    /// corner of the current object, optionally scaled: `L`, `RU(.5)`, ...
    Corner { corner: Corner, factor: Option<f64> },
    /// `/direction dimen/`
    Along {
        direction: Direction,
        length: Dimension,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    L,
    R,
    D,
    U,
    CL,
    CR,
    CD,
    CU,
    LD,
    RD,
    LU,
    RU,
    /// edge point towards p
    E,
    /// proportional edge point towards p
    P,
    /// centre of the object's extent
    A,
}

impl Corner {
    pub fn from_name(name: &str) -> Option<Corner> {
        Some(match name {
            "L" => Corner::L,
            "R" => Corner::R,
            "D" => Corner::D,
            "U" => Corner::U,
            "CL" => Corner::CL,
            "CR" => Corner::CR,
            "CD" => Corner::CD,
            "CU" => Corner::CU,
            "LD" => Corner::LD,
            "RD" => Corner::RD,
            "LU" => Corner::LU,
            "RU" => Corner::RU,
            "E" => Corner::E,
            "P" => Corner::P,
            "A" => Corner::A,
            _ => return None,
        })
    }
}

/// A point along the last curve.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Place {
    /// number of leading `<`
    pub shave_start: usize,
    /// number of leading `>`
    pub shave_end: usize,
    /// `(f)`
    pub factor: Option<f64>,
    /// `!{pos decor}`
    pub intercept: Option<Box<PosDecor>>,
    /// `/dimen/`
    pub slide: Option<Dimension>,
}

// ============================================================================
// Directions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Direction {
    pub base: DirectionBase,
    pub turns: Vec<Turn>,
}

impl Direction {
    pub fn current() -> Self {
        Self {
            base: DirectionBase::Current,
            turns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectionBase {
    /// empty: the current angle
    Current,
    Diagonal(Diagonal),
    /// `v vector`
    Vector(Box<Vector>),
    /// `q{pos decor}`: towards the position
    Toward(Box<PosDecor>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagonal {
    L,
    R,
    U,
    D,
    LU,
    LD,
    RU,
    RD,
}

impl Diagonal {
    pub fn from_name(name: &str) -> Option<Diagonal> {
        Some(match name {
            "l" => Diagonal::L,
            "r" => Diagonal::R,
            "u" => Diagonal::U,
            "d" => Diagonal::D,
            "lu" | "ul" => Diagonal::LU,
            "ld" | "dl" => Diagonal::LD,
            "ru" | "ur" => Diagonal::RU,
            "rd" | "dr" => Diagonal::RD,
            _ => return None,
        })
    }

    /// Angle in degrees, counter-clockwise from the positive x axis.
    pub fn degrees(self) -> f64 {
        match self {
            Diagonal::R => 0.0,
            Diagonal::RU => 45.0,
            Diagonal::U => 90.0,
            Diagonal::LU => 135.0,
            Diagonal::L => 180.0,
            Diagonal::LD => 225.0,
            Diagonal::D => 270.0,
            Diagonal::RD => 315.0,
        }
    }
}

/// `^` turns anticlockwise, `_` clockwise, a quarter turn each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Anticlockwise,
    Clockwise,
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub modifiers: Vec<Modifier>,
    pub object: ObjectBox,
}

impl Object {
    pub fn plain(object: ObjectBox) -> Self {
        Self {
            modifiers: Vec::new(),
            object,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// `!vector`: displace the object against its reference point
    Shift(Vector),
    /// `!`: restore the original reference point
    ResetReference,
    /// `+vector` / `+`
    Grow(Option<Vector>),
    /// `-vector` / `-`
    Shrink(Option<Vector>),
    /// `=vector`
    Size(Vector),
    /// `[shape]`
    Shape(ShapeModifier),
    /// `i`
    Invisible,
    /// `h`
    Hidden,
    Direction(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeModifier {
    /// `[o]`
    Circle,
    /// `[l]`, `[r]`, `[u]`, `[d]`: move the reference point to that edge
    Left,
    Right,
    Up,
    Down,
    /// `[c]`
    Center,
    /// `[F]`, `[F-]`, `[F=]`, `[F.]`, `[F--]`
    Frame(FrameKind),
}

/// A text fragment, already handed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub source: String,
    pub handle: TextHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBox {
    /// `{text}`
    Text(TextBox),
    /// `\txt{line \\ line}`
    Txt(Vec<TextBox>),
    /// `\dir{name}`, `@name`
    Dir { variant: DirVariant, name: String },
    /// `\cir<r>{arc}`
    Cir {
        radius: Option<Vector>,
        arc: CirArc,
    },
    /// `\frm<r>{kind}`
    Frame {
        radius: Option<Vector>,
        kind: FrameKind,
    },
    /// `\object obj`
    Object(Box<Object>),
    /// `\composite{obj * obj ...}`
    Composite(Vec<Object>),
    /// `\xybox{pos decor}`
    XyBox(Box<PosDecor>),
    /// `\crv{pos & pos ...}`
    Curve(Vec<Pos>),
    /// `\xyimport(w,h)(x,y){text}`
    Import {
        width: f64,
        height: f64,
        x: f64,
        y: f64,
        body: TextBox,
    },
    /// `\xymatrix setup {entries}`
    Matrix(Box<Matrix>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirVariant {
    Plain,
    /// `^`
    Above,
    /// `_`
    Below,
    /// `2`
    Double,
    /// `3`
    Triple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CirArc {
    Full,
    Arc {
        from: Diagonal,
        orientation: Turn,
        to: Diagonal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `-`
    Solid,
    /// `--`
    Dashed,
    /// `.`
    Dotted,
    /// `=`
    Double,
    /// `o`
    Circle,
    /// `oo`
    DoubleCircle,
    /// `e`
    Ellipse,
    /// `,`
    Shadow,
}

// ============================================================================
// Decorations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decor {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `\save pos`
    Save(Pos),
    /// `\restore`
    Restore,
    /// `\POS pos`
    Pos(Pos),
    /// `\afterPOS{decor} pos`
    AfterPos { decor: Decor, pos: Pos },
    /// `\drop obj`
    Drop(Object),
    /// `\connect obj`
    Connect(Object),
    /// `\relax`
    Relax,
    /// `\xyignore{pos decor}`
    Ignore(Box<PosDecor>),
    /// `\ar form* path`
    Ar { forms: Vec<ArrowForm>, path: Path },
    /// `\PATH path`
    Path(Path),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowForm {
    /// `@{tail stem head}`
    Style {
        tail: String,
        stem: String,
        head: String,
    },
    /// `@/^dimen/`, `@/_dimen/`
    Curve {
        side: Turn,
        amount: Option<Dimension>,
    },
    /// `@<dimen>`
    Slide(Dimension),
    /// `@(dir,dir)`
    Loop { out: Direction, into: Direction },
    /// `@2`, `@3`
    Variant(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// introduced by `'`
    Straight,
    /// introduced by `` ` ``
    Turn,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub pos: Pos,
    pub slide: Option<Dimension>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSide {
    /// `^`: left of the direction of travel
    Above,
    /// `_`: right of the direction of travel
    Below,
    /// `|`: on the curve, breaking it
    At,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub side: LabelSide,
    pub place: Place,
    pub object: Object,
}

// ============================================================================
// Matrices
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub setup: Vec<MatrixSetup>,
    pub rows: Vec<Vec<Entry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjust {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixSetup {
    /// `@R=`, `@C+`, `@=` ...
    Spacing {
        axis: Axis,
        adjust: Adjust,
        amount: Dimension,
    },
    /// `@!`, `@!R`, `@!C`
    Equal(Axis),
    /// `@!0`: ignore entry sizes
    IgnoreEntrySizes,
    /// `@M`
    EntryMargin(Adjust, Dimension),
    /// `@W`
    EntryWidth(Adjust, Dimension),
    /// `@H`
    EntryHeight(Adjust, Dimension),
    /// `@L`
    LabelMargin(Adjust, Dimension),
    /// `@*[mods]`
    EntryModifiers(Vec<Modifier>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub object: Option<Object>,
    pub decor: Decor,
}

impl Entry {
    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.decor.commands.is_empty()
    }
}

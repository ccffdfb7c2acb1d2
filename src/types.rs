//! Units, dimensions and the metric configuration table.
//!
//! Everything inside the engine is measured in ems. Dimensions written in
//! diagram source carry a TeX unit and are converted through [`Metrics`],
//! which the host supplies (or takes from [`Metrics::default`]).

use std::fmt;

/// Error type for invalid metric values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericError {
    /// Value is NaN
    NaN,
    /// Value is infinite
    Infinite,
    /// Value is zero or negative when positive required
    NotPositive,
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericError::NaN => write!(f, "value is NaN"),
            NumericError::Infinite => write!(f, "value is infinite"),
            NumericError::NotPositive => write!(f, "value must be positive"),
        }
    }
}

impl std::error::Error for NumericError {}

fn positive(val: f64) -> Result<f64, NumericError> {
    if val.is_nan() {
        Err(NumericError::NaN)
    } else if val.is_infinite() {
        Err(NumericError::Infinite)
    } else if val <= 0.0 {
        Err(NumericError::NotPositive)
    } else {
        Ok(val)
    }
}

/// A TeX length unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Em,
    Ex,
    Px,
    Pt,
    Pc,
    In,
    Cm,
    Mm,
    Mu,
    Bp,
    Dd,
    Cc,
    Sp,
}

impl Unit {
    pub fn from_name(name: &str) -> Option<Unit> {
        Some(match name {
            "em" => Unit::Em,
            "ex" => Unit::Ex,
            "px" => Unit::Px,
            "pt" => Unit::Pt,
            "pc" => Unit::Pc,
            "in" => Unit::In,
            "cm" => Unit::Cm,
            "mm" => Unit::Mm,
            "mu" => Unit::Mu,
            "bp" => Unit::Bp,
            "dd" => Unit::Dd,
            "cc" => Unit::Cc,
            "sp" => Unit::Sp,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Unit::Em => "em",
            Unit::Ex => "ex",
            Unit::Px => "px",
            Unit::Pt => "pt",
            Unit::Pc => "pc",
            Unit::In => "in",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
            Unit::Mu => "mu",
            Unit::Bp => "bp",
            Unit::Dd => "dd",
            Unit::Cc => "cc",
            Unit::Sp => "sp",
        }
    }

    /// Points per unit for the units fixed relative to the TeX point.
    fn points(self) -> Option<f64> {
        match self {
            Unit::Pt => Some(1.0),
            Unit::Pc => Some(12.0),
            Unit::In => Some(72.27),
            Unit::Cm => Some(72.27 / 2.54),
            Unit::Mm => Some(72.27 / 25.4),
            Unit::Bp => Some(72.27 / 72.0),
            Unit::Dd => Some(1238.0 / 1157.0),
            Unit::Cc => Some(12.0 * 1238.0 / 1157.0),
            Unit::Sp => Some(1.0 / 65536.0),
            Unit::Em | Unit::Ex | Unit::Px | Unit::Mu => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A length as written in the source: a factor and a unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dimension {
    pub value: f64,
    pub unit: Unit,
}

impl Dimension {
    pub const fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub const fn em(value: f64) -> Self {
        Self::new(value, Unit::Em)
    }

    pub const fn pt(value: f64) -> Self {
        Self::new(value, Unit::Pt)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Built-in metric defaults, in points unless noted.
pub mod defaults {
    /// Points per em of the surrounding font
    pub const PT_PER_EM: f64 = 10.0;
    /// Height of an ex, in ems
    pub const EX_PER_EM: f64 = 0.43;
    /// Screen pixels per em
    pub const PX_PER_EM: f64 = 16.0;
    /// Default coordinate basis unit, in millimetres
    pub const BASE_MM: f64 = 1.0;
    pub const LINE_THICKNESS: f64 = 0.4;
    pub const OBJECT_MARGIN: f64 = 3.0;
    pub const LABEL_MARGIN: f64 = 2.5;
    /// Matrix row separation (2pc)
    pub const ROW_SEP: f64 = 24.0;
    /// Matrix column separation (2pc)
    pub const COL_SEP: f64 = 24.0;
    /// Radius of rounded path corners
    pub const TURN_RADIUS: f64 = 10.0;
    /// Extent of an arrow tip glyph
    pub const TIP_SIZE: f64 = 5.0;
    /// Default sagitta of `@/^/` curving
    pub const CURVE_DEFAULT: f64 = 10.0;
    /// Reach of `@(d,d)` loop control points
    pub const LOOP_SIZE: f64 = 30.0;
    /// Clipper target width of a parameter range
    pub const GOAL_ACCURACY: f64 = 1e-6;
    /// Clipper iteration and recursion cap
    pub const MAX_ITERATIONS: u32 = 30;
}

/// The host-supplied length and metric configuration table.
///
/// Every length field is in ems; [`Metrics::to_em`] converts source
/// dimensions into the same unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub pt_per_em: f64,
    pub ex_per_em: f64,
    pub px_per_em: f64,
    /// Length of the initial x and y basis vectors
    pub base_unit: f64,
    pub line_thickness: f64,
    pub object_margin: f64,
    pub label_margin: f64,
    pub row_sep: f64,
    pub col_sep: f64,
    pub turn_radius: f64,
    pub tip_size: f64,
    pub curve_default: f64,
    pub loop_size: f64,
    pub goal_accuracy: f64,
    pub max_iterations: u32,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::from_points_per_em(defaults::PT_PER_EM)
    }
}

impl Metrics {
    /// Metrics for a font whose em is `pt_per_em` points (validated).
    pub fn try_new(pt_per_em: f64) -> Result<Self, NumericError> {
        positive(pt_per_em).map(Self::from_points_per_em)
    }

    fn from_points_per_em(pt_per_em: f64) -> Self {
        let em = |pt: f64| pt / pt_per_em;
        Self {
            pt_per_em,
            ex_per_em: defaults::EX_PER_EM,
            px_per_em: defaults::PX_PER_EM,
            base_unit: em(defaults::BASE_MM * 72.27 / 25.4),
            line_thickness: em(defaults::LINE_THICKNESS),
            object_margin: em(defaults::OBJECT_MARGIN),
            label_margin: em(defaults::LABEL_MARGIN),
            row_sep: em(defaults::ROW_SEP),
            col_sep: em(defaults::COL_SEP),
            turn_radius: em(defaults::TURN_RADIUS),
            tip_size: em(defaults::TIP_SIZE),
            curve_default: em(defaults::CURVE_DEFAULT),
            loop_size: em(defaults::LOOP_SIZE),
            goal_accuracy: defaults::GOAL_ACCURACY,
            max_iterations: defaults::MAX_ITERATIONS,
        }
    }

    /// Override the initial basis unit (validated).
    pub fn with_base_unit(mut self, em: f64) -> Result<Self, NumericError> {
        self.base_unit = positive(em)?;
        Ok(self)
    }

    /// Convert a source dimension to ems.
    pub fn to_em(&self, dim: Dimension) -> f64 {
        let per_unit = match dim.unit {
            Unit::Em => 1.0,
            Unit::Ex => self.ex_per_em,
            Unit::Px => 1.0 / self.px_per_em,
            Unit::Mu => 1.0 / 18.0,
            fixed => fixed.points().unwrap_or(1.0) / self.pt_per_em,
        };
        dim.value * per_unit
    }

    /// Convert a point count to ems.
    pub fn pt(&self, points: f64) -> f64 {
        points / self.pt_per_em
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ========================================================================
    // Unit tests
    // ========================================================================

    #[test]
    fn unit_names_round_trip() {
        for name in [
            "em", "ex", "px", "pt", "pc", "in", "cm", "mm", "mu", "bp", "dd", "cc", "sp",
        ] {
            let unit = Unit::from_name(name).unwrap();
            assert_eq!(unit.name(), name);
        }
        assert_eq!(Unit::from_name("furlong"), None);
    }

    // ========================================================================
    // Metrics tests
    // ========================================================================

    #[test]
    fn conversions_against_ten_point_em() {
        let m = Metrics::default();
        assert!(close(m.to_em(Dimension::pt(10.0)), 1.0));
        assert!(close(m.to_em(Dimension::new(1.0, Unit::Pc)), 1.2));
        assert!(close(m.to_em(Dimension::new(1.0, Unit::In)), 7.227));
        assert!(close(m.to_em(Dimension::new(2.54, Unit::Cm)), 7.227));
        assert!(close(m.to_em(Dimension::new(18.0, Unit::Mu)), 1.0));
        assert!(close(m.to_em(Dimension::new(2.0, Unit::Ex)), 0.86));
        assert!(close(m.to_em(Dimension::em(3.0)), 3.0));
    }

    #[test]
    fn defaults_are_expressed_in_ems() {
        let m = Metrics::default();
        assert!(close(m.object_margin, 0.3));
        assert!(close(m.row_sep, 2.4));
        assert!(close(m.base_unit, 72.27 / 254.0));
    }

    #[test]
    fn rejects_bad_em_sizes() {
        assert_eq!(Metrics::try_new(0.0), Err(NumericError::NotPositive));
        assert_eq!(Metrics::try_new(f64::NAN), Err(NumericError::NaN));
        assert_eq!(
            Metrics::try_new(f64::INFINITY),
            Err(NumericError::Infinite)
        );
        let m = Metrics::try_new(12.0).unwrap();
        assert!(close(m.to_em(Dimension::pt(12.0)), 1.0));
    }

    #[test]
    fn base_unit_override() {
        let m = Metrics::default().with_base_unit(1.0).unwrap();
        assert_eq!(m.base_unit, 1.0);
        assert!(Metrics::default().with_base_unit(-1.0).is_err());
    }
}

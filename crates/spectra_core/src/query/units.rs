//! Spectral unit conversion for line listings.
//!
//! # Invariants
//! - Stored values are never mutated; conversion happens on read.
//! - Wavelength <-> wavenumber conversion is reciprocal and rejects
//!   non-positive inputs instead of producing infinities.

use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// `1 cm^-1` corresponds to `1e7 nm`.
const NM_PER_INVERSE_CM: f64 = 1.0e7;

pub type UnitResult<T> = Result<T, UnitError>;

#[derive(Debug, Clone, PartialEq)]
pub enum UnitError {
    Unknown(String),
    NoConversion { from: String, to: SpectralUnit },
    NonPositive { value: f64, unit: SpectralUnit },
}

impl Display for UnitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(unit) => write!(
                f,
                "unknown unit `{unit}` (expected one of nm, A, um, cm-1)"
            ),
            Self::NoConversion { from, to } => {
                write!(f, "no conversion defined from `{from}` to `{to}`")
            }
            Self::NonPositive { value, unit } => write!(
                f,
                "cannot convert non-positive value {value} {unit} across wavelength/wavenumber"
            ),
        }
    }
}

impl Error for UnitError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpectralUnit {
    #[serde(rename = "nm")]
    Nanometer,
    #[serde(rename = "A")]
    Angstrom,
    #[serde(rename = "um")]
    Micrometer,
    #[serde(rename = "cm-1")]
    Wavenumber,
}

impl SpectralUnit {
    pub const ALL: [Self; 4] = [
        Self::Nanometer,
        Self::Angstrom,
        Self::Micrometer,
        Self::Wavenumber,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanometer => "nm",
            Self::Angstrom => "A",
            Self::Micrometer => "um",
            Self::Wavenumber => "cm-1",
        }
    }

    pub fn is_wavelength(self) -> bool {
        !matches!(self, Self::Wavenumber)
    }

    /// Nanometres per one unit of a wavelength unit.
    fn nm_scale(self) -> f64 {
        match self {
            Self::Nanometer => 1.0,
            Self::Angstrom => 0.1,
            Self::Micrometer => 1000.0,
            Self::Wavenumber => 1.0,
        }
    }

    /// Converts `value` from `self` to `target`.
    pub fn convert(self, value: f64, target: Self) -> UnitResult<f64> {
        if self == target {
            return Ok(value);
        }
        match (self.is_wavelength(), target.is_wavelength()) {
            (true, true) => Ok(value * self.nm_scale() / target.nm_scale()),
            (true, false) => {
                let nm = self.require_positive(value)? * self.nm_scale();
                Ok(NM_PER_INVERSE_CM / nm)
            }
            (false, true) => {
                let nm = NM_PER_INVERSE_CM / self.require_positive(value)?;
                Ok(nm / target.nm_scale())
            }
            (false, false) => Ok(value),
        }
    }

    /// Converts a value and its uncertainty. Reciprocal conversions scale
    /// the uncertainty by the local derivative `|d(1/x)| = dx / x^2`.
    pub fn convert_with_uncertainty(
        self,
        value: f64,
        uncertainty: Option<f64>,
        target: Self,
    ) -> UnitResult<(f64, Option<f64>)> {
        let converted = self.convert(value, target)?;
        let uncertainty = uncertainty.map(|unc| {
            if self.is_wavelength() == target.is_wavelength() {
                unc * self.nm_scale() / target.nm_scale()
            } else {
                (unc * converted / value).abs()
            }
        });
        Ok((converted, uncertainty))
    }

    fn require_positive(self, value: f64) -> UnitResult<f64> {
        if value > 0.0 && value.is_finite() {
            Ok(value)
        } else {
            Err(UnitError::NonPositive { value, unit: self })
        }
    }
}

impl Display for SpectralUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpectralUnit {
    type Err = UnitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed {
            "A" | "Å" | "\u{212b}" => return Ok(Self::Angstrom),
            _ => {}
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "nm" | "nanometer" | "nanometre" => Ok(Self::Nanometer),
            "a" | "angstrom" | "angstroms" => Ok(Self::Angstrom),
            "um" | "µm" | "μm" | "micron" | "micrometer" | "micrometre" => Ok(Self::Micrometer),
            "cm-1" | "cm^-1" | "1/cm" | "cm⁻¹" | "wavenumber" => Ok(Self::Wavenumber),
            _ => Err(UnitError::Unknown(trimmed.to_string())),
        }
    }
}

/// Converts a stored `(value, unit)` pair into `target`.
///
/// A stored unit outside the supported set is a request-level error, not a
/// pass-through.
pub fn convert_stored(
    value: f64,
    uncertainty: Option<f64>,
    stored_unit: &str,
    target: SpectralUnit,
) -> UnitResult<(f64, Option<f64>)> {
    let from = stored_unit
        .parse::<SpectralUnit>()
        .map_err(|_| UnitError::NoConversion {
            from: stored_unit.to_string(),
            to: target,
        })?;
    from.convert_with_uncertainty(value, uncertainty, target)
}

#[cfg(test)]
mod tests {
    use super::{convert_stored, SpectralUnit, UnitError};

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9 * right.abs().max(1.0)
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("nm".parse::<SpectralUnit>(), Ok(SpectralUnit::Nanometer));
        assert_eq!("Angstrom".parse::<SpectralUnit>(), Ok(SpectralUnit::Angstrom));
        assert_eq!("A".parse::<SpectralUnit>(), Ok(SpectralUnit::Angstrom));
        assert_eq!("um".parse::<SpectralUnit>(), Ok(SpectralUnit::Micrometer));
        assert_eq!("cm-1".parse::<SpectralUnit>(), Ok(SpectralUnit::Wavenumber));
        assert!(matches!("MHz".parse::<SpectralUnit>(), Err(UnitError::Unknown(_))));
    }

    #[test]
    fn converts_between_wavelength_units() {
        let nm = SpectralUnit::Angstrom
            .convert(5000.0, SpectralUnit::Nanometer)
            .expect("convert");
        assert!(close(nm, 500.0));
        let um = SpectralUnit::Nanometer
            .convert(1500.0, SpectralUnit::Micrometer)
            .expect("convert");
        assert!(close(um, 1.5));
    }

    #[test]
    fn wavenumber_conversion_is_reciprocal() {
        let (nm, unc) = SpectralUnit::Wavenumber
            .convert_with_uncertainty(20_000.0, Some(2.0), SpectralUnit::Nanometer)
            .expect("convert");
        assert!(close(nm, 500.0));
        assert!(close(unc.expect("uncertainty"), 0.05));

        let back = SpectralUnit::Nanometer
            .convert(nm, SpectralUnit::Wavenumber)
            .expect("convert");
        assert!(close(back, 20_000.0));
    }

    #[test]
    fn rejects_non_positive_reciprocal_input() {
        let err = SpectralUnit::Wavenumber
            .convert(0.0, SpectralUnit::Nanometer)
            .expect_err("zero wavenumber");
        assert!(matches!(err, UnitError::NonPositive { .. }));
    }

    #[test]
    fn unknown_stored_unit_has_no_conversion() {
        let err = convert_stored(1.0, None, "MHz", SpectralUnit::Nanometer).expect_err("MHz");
        assert_eq!(
            err,
            UnitError::NoConversion {
                from: "MHz".to_string(),
                to: SpectralUnit::Nanometer
            }
        );
    }
}

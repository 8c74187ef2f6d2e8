//! Density tokens controlling thumbnail counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse token controlling how many thumbnails a mosaic contains for a
/// given duration, and how aggressively previews sample the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Density {
    Xxs,
    Xs,
    S,
    #[default]
    M,
    L,
    Xl,
    Xxl,
}

impl Density {
    /// All density tokens, sparsest first.
    pub const ALL: &'static [Density] = &[
        Density::Xxs,
        Density::Xs,
        Density::S,
        Density::M,
        Density::L,
        Density::Xl,
        Density::Xxl,
    ];

    /// Scaling factor applied to the raw thumbnail count and to the
    /// preview extract rate. Both call sites divide by this factor.
    pub fn factor(&self) -> f64 {
        match self {
            Density::Xxs => 0.25,
            Density::Xs => 0.5,
            Density::S => 1.0,
            Density::M => 1.5,
            Density::L => 2.0,
            Density::Xl => 4.0,
            Density::Xxl => 8.0,
        }
    }

    /// Token as it appears in file names and catalog rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Density::Xxs => "XXS",
            Density::Xs => "XS",
            Density::S => "S",
            Density::M => "M",
            Density::L => "L",
            Density::Xl => "XL",
            Density::Xxl => "XXL",
        }
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Density {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XXS" => Ok(Density::Xxs),
            "XS" => Ok(Density::Xs),
            "S" => Ok(Density::S),
            "M" => Ok(Density::M),
            "L" => Ok(Density::L),
            "XL" => Ok(Density::Xl),
            "XXL" => Ok(Density::Xxl),
            other => Err(format!("unknown density token: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_ordering() {
        let factors: Vec<f64> = Density::ALL.iter().map(|d| d.factor()).collect();
        let mut sorted = factors.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(factors, sorted);
    }

    #[test]
    fn test_round_trip() {
        for d in Density::ALL {
            assert_eq!(d.as_str().parse::<Density>().unwrap(), *d);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("xxl".parse::<Density>().unwrap(), Density::Xxl);
        assert!("XLL".parse::<Density>().is_err());
    }
}

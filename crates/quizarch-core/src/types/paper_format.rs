//! Paper formats supported for PDF export.

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Paper format for the rendered attempt PDF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperFormat {
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl PaperFormat {
    /// All accepted paper format names, in request order.
    pub const ALL: [Self; 11] = [
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
        Self::A6,
        Self::Letter,
        Self::Legal,
        Self::Tabloid,
        Self::Ledger,
    ];

    /// Page dimensions in inches (width, height), as expected by the CDP
    /// `Page.printToPDF` command.
    #[must_use]
    pub const fn size_inches(self) -> (f64, f64) {
        match self {
            Self::A0 => (33.1, 46.8),
            Self::A1 => (23.4, 33.1),
            Self::A2 => (16.54, 23.4),
            Self::A3 => (11.7, 16.54),
            Self::A4 => (8.27, 11.7),
            Self::A5 => (5.83, 8.27),
            Self::A6 => (4.13, 5.83),
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
            Self::Tabloid => (11.0, 17.0),
            Self::Ledger => (17.0, 11.0),
        }
    }

    /// Canonical name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A0 => "A0",
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
            Self::Tabloid => "Tabloid",
            Self::Ledger => "Ledger",
        }
    }
}

impl std::str::FromStr for PaperFormat {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| WorkerError::validation(format!("Paper format \"{s}\" is invalid.")))
    }
}

impl std::fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_formats() {
        for format in PaperFormat::ALL {
            assert_eq!(format.as_str().parse::<PaperFormat>().unwrap(), format);
        }
    }

    #[test]
    fn rejects_unknown_format() {
        assert!("B5".parse::<PaperFormat>().is_err());
        assert!("a4".parse::<PaperFormat>().is_err());
    }

    #[test]
    fn ledger_is_landscape_tabloid() {
        let (tw, th) = PaperFormat::Tabloid.size_inches();
        let (lw, lh) = PaperFormat::Ledger.size_inches();
        assert_eq!((tw, th), (lh, lw));
    }
}

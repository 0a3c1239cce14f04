//! Console signals emitted by the injected report page JavaScript.

/// Signals the report page can emit on the browser console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportSignal {
    /// Typesetting finished, the page is ready for PDF export.
    ReadyForExport,
    /// MathJax was found on the page.
    MathJaxFound,
    /// MathJax was not found on the page.
    MathJaxNotFound,
}

impl ReportSignal {
    /// The exact console message text for this signal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadyForExport => "x-quiz-archiver-page-ready-for-export",
            Self::MathJaxFound => "x-quiz-archiver-mathjax-found",
            Self::MathJaxNotFound => "x-quiz-archiver-mathjax-not-found",
        }
    }
}

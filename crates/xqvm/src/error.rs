use crate::consts::ERR_NS;
use crate::datamodel::ValueTag;
use crate::names::QName;
use compact_str::CompactString;
use core::fmt;
use std::sync::Arc;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Type errors
    XPTY0004, // wrong tag / runtime type mismatch
    XPDY0050, // node required
    // Casts and arguments
    FORG0001, // cast / lexical failure
    FORG0006, // invalid argument for effective boolean value
    FOCA0002, // NaN or infinity cast to xs:decimal or xs:integer
    FOCA0003, // value too large for xs:integer
    // Arithmetic
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    // Raised by the query itself
    FOER0000,
    FOCH0002, // unknown collation
    FODC0002, // resource retrieval failure
    // Engine failures: bugs, encoding limits, malformed values
    SYSE0001,
    // Fallback for codes raised by fn:error outside the known set
    Unknown,
}

impl ErrorCode {
    pub const fn local(self) -> &'static str {
        match self {
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FOCA0003 => "FOCA0003",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::FODC0002 => "FODC0002",
            ErrorCode::SYSE0001 => "SYSE0001",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// The code as `err:LOCAL`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::XPTY0004 => "err:XPTY0004",
            ErrorCode::XPDY0050 => "err:XPDY0050",
            ErrorCode::FORG0001 => "err:FORG0001",
            ErrorCode::FORG0006 => "err:FORG0006",
            ErrorCode::FOCA0002 => "err:FOCA0002",
            ErrorCode::FOCA0003 => "err:FOCA0003",
            ErrorCode::FOAR0001 => "err:FOAR0001",
            ErrorCode::FOAR0002 => "err:FOAR0002",
            ErrorCode::FOER0000 => "err:FOER0000",
            ErrorCode::FOCH0002 => "err:FOCH0002",
            ErrorCode::FODC0002 => "err:FODC0002",
            ErrorCode::SYSE0001 => "err:SYSE0001",
            ErrorCode::Unknown => "err:UNKNOWN",
        }
    }

    /// Parses `err:LOCAL` or a bare `LOCAL`. Anything else maps to [`ErrorCode::Unknown`].
    pub fn from_code(s: &str) -> Self {
        let local = s.strip_prefix("err:").unwrap_or(s);
        match local {
            "XPTY0004" => ErrorCode::XPTY0004,
            "XPDY0050" => ErrorCode::XPDY0050,
            "FORG0001" => ErrorCode::FORG0001,
            "FORG0006" => ErrorCode::FORG0006,
            "FOCA0002" => ErrorCode::FOCA0002,
            "FOCA0003" => ErrorCode::FOCA0003,
            "FOAR0001" => ErrorCode::FOAR0001,
            "FOAR0002" => ErrorCode::FOAR0002,
            "FOER0000" => ErrorCode::FOER0000,
            "FOCH0002" => ErrorCode::FOCH0002,
            "FODC0002" => ErrorCode::FODC0002,
            "SYSE0001" => ErrorCode::SYSE0001,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn qname(self) -> QName {
        QName::new("err", ERR_NS, self.local())
    }

    pub const fn is_system(self) -> bool {
        matches!(self, ErrorCode::SYSE0001)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of the failing expression in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub module: Option<CompactString>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{m}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

fn location_suffix(location: Option<&SourceLocation>) -> String {
    location.map(|l| format!(" at {l}")).unwrap_or_default()
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}{}", location_suffix(.location.as_ref()))]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            location: None,
            source: None,
        }
    }

    /// Engine failure: malformed encoding, exceeded limit, broken plan.
    pub fn system(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SYSE0001, msg)
    }

    /// A typed view or operation met a value with the wrong tag.
    pub fn type_mismatch(expected: &str, actual: ValueTag) -> Self {
        Self::new(
            ErrorCode::XPTY0004,
            format!("expected {expected}, found {actual:?}"),
        )
    }

    pub(crate) fn truncated(at: usize, wanted: usize) -> Self {
        Self::system(format!("value truncated: {wanted} bytes at offset {at}"))
    }

    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn is_system(&self) -> bool {
        self.code.is_system()
    }

    pub fn format_code(&self) -> &'static str {
        self.code.as_str()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorCode::FODC0002, e.to_string())
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Error::system("malformed UTF-8 in encoded string")
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::XPTY0004)]
    #[case(ErrorCode::FOAR0001)]
    #[case(ErrorCode::SYSE0001)]
    #[case(ErrorCode::FOCH0002)]
    fn code_roundtrip(#[case] code: ErrorCode) {
        assert_eq!(ErrorCode::from_code(code.as_str()), code);
        assert_eq!(ErrorCode::from_code(code.local()), code);
    }

    #[rstest]
    fn display_includes_location() {
        let err = Error::new(ErrorCode::FOER0000, "boom").at(SourceLocation {
            module: None,
            line: 3,
            column: 7,
        });
        assert_eq!(err.to_string(), "err:FOER0000: boom at 3:7");
    }

    #[rstest]
    fn only_syse_is_system() {
        assert!(Error::system("x").is_system());
        assert!(!Error::new(ErrorCode::XPTY0004, "x").is_system());
    }
}

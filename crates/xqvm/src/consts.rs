/// Namespace URI of the W3C error codes (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const JN_NS: &str = "http://jsoniq.org/functions";

pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
pub const SIMPLE_CASE_URI: &str = "urn:xqvm:collation:simple-case";
pub const SIMPLE_ACCENT_URI: &str = "urn:xqvm:collation:simple-accent";
pub const SIMPLE_CASE_ACCENT_URI: &str = "urn:xqvm:collation:simple-case-accent";

/// Timezone marker for date/time values without a timezone.
pub const NO_TIMEZONE: i8 = 127;

/// Longest string (in UTF-8 bytes) a single encoded string can hold.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Largest data area a composite value (sequence, chunk, dictionary) can hold.
pub const MAX_DATA_LEN: usize = i32::MAX as usize;

/// Largest decimal scale the codec accepts.
pub const MAX_DECIMAL_SCALE: u8 = 18;

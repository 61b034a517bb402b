//! Small shared helpers.

use chrono::Utc;

/// Current time as an RFC3339 string, the wire format used throughout the
/// store for timestamp columns (`spec.md` §4.1 serialization rules).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

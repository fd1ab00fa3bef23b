// Output naming
//
// Output artifacts are named after their source document plus the UTC
// time the summary was written: `<base>-<YYYYMMDDThhmmssZ>.txt`.

use chrono::{DateTime, Utc};

/// strftime pattern of the timestamp embedded in output names
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Identifier with its last extension removed.
///
/// Everything before the last `.` is kept; an identifier without a `.` is
/// returned whole.
pub fn base_name(identifier: &str) -> &str {
    match identifier.rsplit_once('.') {
        Some((base, _)) => base,
        None => identifier,
    }
}

/// Output artifact name for `identifier` written at `at`
pub fn output_name(identifier: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}.txt",
        base_name(identifier),
        at.format(OUTPUT_TIMESTAMP_FORMAT)
    )
}

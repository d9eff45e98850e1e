use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current UTC time formatted as RFC 3339, used for `generated_at` and
/// `timestamp` fields in gateway payloads.
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(datetime: OffsetDateTime) -> String {
    datetime
        .format(&Rfc3339)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

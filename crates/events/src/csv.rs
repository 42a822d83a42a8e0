//! RFC 4180 CSV rendering of audit events.

use crate::AuditEvent;

pub const CSV_HEADER: [&str; 9] = [
    "id",
    "timestamp",
    "subject",
    "event_type",
    "severity",
    "region",
    "success",
    "reason",
    "context",
];

/// Render `events` with a header row, CRLF line endings.
///
/// Context entries are flattened to `key=value` pairs joined by `; `.
pub fn to_csv(events: &[AuditEvent]) -> Vec<u8> {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER.iter().map(|h| h.to_string()));

    for event in events {
        let context = event
            .context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");

        push_row(
            &mut out,
            [
                event.id.to_string(),
                event.timestamp.to_rfc3339(),
                event.subject.to_string(),
                event.event_type.to_string(),
                event.severity.to_string(),
                event.region.as_ref().map(ToString::to_string).unwrap_or_default(),
                event.success.to_string(),
                event.reason.clone(),
                context,
            ],
        );
    }

    out.into_bytes()
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(&field));
    }
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

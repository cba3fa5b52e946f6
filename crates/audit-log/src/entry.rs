use chrono::{DateTime, Utc};
use policy_engine::Verdict;
use serde::{Deserialize, Serialize};

/// One persisted flow decision: who, which host, what verdict, and when.
///
/// Serialised with camelCase keys. Absent optional fields are written as
/// `null` and read back as `None`, whether the key is `null` or missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Time of evaluation, as an ISO-8601 / RFC 3339 string on the wire.
    pub timestamp: DateTime<Utc>,
    /// Uid as observed at evaluation time; may be the unknown sentinel.
    pub uid: u32,
    /// Process that initiated the flow.
    #[serde(default)]
    pub process_name: Option<String>,
    /// Remote hostname or address.
    #[serde(default)]
    pub remote_host: Option<String>,
    /// The verdict that was applied.
    pub verdict: Verdict,
}

impl AuditRecord {
    /// Create a record stamped with the current UTC time.
    pub fn new(
        uid: u32,
        process_name: Option<String>,
        remote_host: Option<String>,
        verdict: Verdict,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            uid,
            process_name,
            remote_host,
            verdict,
        }
    }

    /// Replace the timestamp, consuming and returning `self`.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Serialise as a single newline-terminated JSON line.
    pub fn to_json_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse one line of the audit log. Surrounding whitespace is ignored.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn round_trip_with_all_fields() {
        let record = AuditRecord::new(
            501,
            Some("curl".into()),
            Some("example.com".into()),
            Verdict::Allow,
        );
        let line = record.to_json_line().unwrap();
        let decoded = AuditRecord::from_json_line(std::str::from_utf8(&line).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trip_with_absent_optionals() {
        let record = AuditRecord::new(502, None, None, Verdict::Deny);
        let json = serde_json::to_string(&record).unwrap();
        let decoded: AuditRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.verdict, Verdict::Deny);
        assert!(decoded.process_name.is_none());
        assert!(decoded.remote_host.is_none());
    }

    #[test]
    fn wire_format_matches_schema() {
        let record = AuditRecord::new(501, None, Some("example.com".into()), Verdict::Allow)
            .with_timestamp(fixed_time());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["timestamp"], "2025-03-14T09:26:53Z");
        assert_eq!(value["uid"], 501);
        assert!(value["processName"].is_null());
        assert_eq!(value["remoteHost"], "example.com");
        assert_eq!(value["verdict"], "allow");
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn json_line_is_newline_terminated_single_line() {
        let record = AuditRecord::new(1, Some("a\nb".into()), None, Verdict::Deny);
        let line = record.to_json_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn missing_optional_keys_decode_as_none() {
        let line = r#"{"timestamp":"2025-03-14T09:26:53Z","uid":7,"verdict":"deny"}"#;
        let decoded = AuditRecord::from_json_line(line).unwrap();
        assert_eq!(decoded.uid, 7);
        assert!(decoded.process_name.is_none());
        assert!(decoded.remote_host.is_none());
        assert_eq!(decoded.timestamp, fixed_time());
    }

    #[test]
    fn empty_string_stays_empty_string() {
        let record = AuditRecord::new(1, Some(String::new()), None, Verdict::Allow);
        let json = serde_json::to_string(&record).unwrap();
        let decoded: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.process_name.as_deref(), Some(""));
    }

    #[test]
    fn unknown_verdict_string_rejected() {
        let line = r#"{"timestamp":"2025-03-14T09:26:53Z","uid":7,"verdict":"block"}"#;
        assert!(AuditRecord::from_json_line(line).is_err());
    }
}

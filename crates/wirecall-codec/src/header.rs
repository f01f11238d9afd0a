use serde::{Deserialize, Serialize};

/// The header that precedes every request and response body.
///
/// The client picks `seq`; the server echoes it back so responses can be
/// matched to calls regardless of arrival order. `error` is empty on requests
/// and on successful responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// Target in `Service.Method` form.
    pub service_method: String,
    /// Sequence number chosen by the client. 0 is never assigned to a call.
    pub seq: u64,
    /// Failure reported by the server; empty on success.
    #[serde(default)]
    pub error: String,
}

impl Header {
    /// Header for an outgoing request.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// True when the server reported a failure for this call.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_pascal_case_names() {
        let header = Header::request("Arith.Sum", 7);
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ServiceMethod": "Arith.Sum", "Seq": 7, "Error": ""})
        );
        assert!(!header.is_error());
    }

    #[test]
    fn missing_error_field_defaults_to_empty() {
        let header: Header =
            serde_json::from_str(r#"{"ServiceMethod":"Echo.Say","Seq":3}"#).unwrap();
        assert_eq!(header.seq, 3);
        assert!(header.error.is_empty());
    }
}

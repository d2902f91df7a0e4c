//! Secret redaction for logs and error messages.
//!
//! The toolkit echoes deployment credentials in several places: the
//! `deployment config` output, error text from a failed `deployment create`,
//! and the files we hand it. [`SecretRedactor`] replaces known secret values
//! with [`REDACTED`] using an Aho-Corasick automaton, and
//! [`redact_json_secrets`] masks credential fields in JSON documents.

use std::borrow::Cow;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Values shorter than this are never treated as secrets ("true", "1", "admin").
const MIN_SECRET_LENGTH: usize = 6;

/// Environment variable suffixes whose values are secrets.
const SECRET_VAR_SUFFIXES: &[&str] = &["_PASSWORD", "_TOKEN", "_SECRET", "_API_KEY"];

/// JSON object keys whose values are masked by [`redact_json_secrets`].
const SECRET_JSON_KEYS: &[&str] = &["password", "token", "secret", "api_key"];

/// Replaces known secret values with [`REDACTED`].
///
/// Secrets are never exposed via Debug.
pub struct SecretRedactor {
    secrets: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl std::fmt::Debug for SecretRedactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRedactor")
            .field("secret_count", &self.secrets.len())
            .finish_non_exhaustive()
    }
}

impl SecretRedactor {
    /// Build from explicit secret values.
    #[must_use]
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(|s| s.into().trim().to_string())
            .filter(|s| s.len() >= MIN_SECRET_LENGTH)
            .collect();

        // Longest first so overlapping secrets are fully masked by the fallback.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();

        let automaton = if secrets.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .build(&secrets)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!(
                        secret_count = secrets.len(),
                        "SecretRedactor automaton build failed; using fallback redaction ({e})"
                    );
                    None
                }
            }
        };

        Self { secrets, automaton }
    }

    /// Collect values of `OS_PASSWORD`-style variables from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let secrets = std::env::vars()
            .filter(|(name, _)| {
                let upper = name.to_ascii_uppercase();
                SECRET_VAR_SUFFIXES.iter().any(|sfx| upper.ends_with(sfx))
            })
            .map(|(_, value)| value);
        let redactor = Self::new(secrets);
        tracing::debug!(
            secret_count = redactor.secret_count(),
            "SecretRedactor initialized"
        );
        redactor
    }

    /// Process-wide redactor built from the environment on first use.
    pub fn global() -> &'static SecretRedactor {
        static GLOBAL: OnceLock<SecretRedactor> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    /// A new redactor that also masks `extra`.
    #[must_use]
    pub fn with_secrets<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let combined = self
            .secrets
            .iter()
            .cloned()
            .chain(extra.into_iter().map(Into::into));
        Self::new(combined)
    }

    #[must_use]
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if self.secrets.is_empty() {
            return Cow::Borrowed(input);
        }

        if let Some(ac) = &self.automaton {
            if !ac.is_match(input) {
                return Cow::Borrowed(input);
            }
            let mut result = String::with_capacity(input.len());
            ac.replace_all_with(input, &mut result, |_, _, dst| {
                dst.push_str(REDACTED);
                true
            });
            return Cow::Owned(result);
        }

        let mut output: Option<String> = None;
        for secret in &self.secrets {
            let haystack = output.as_deref().unwrap_or(input);
            if haystack.contains(secret.as_str()) {
                output = Some(haystack.replace(secret.as_str(), REDACTED));
            }
        }
        output.map_or(Cow::Borrowed(input), Cow::Owned)
    }

    #[must_use]
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }
}

/// Mask credential-looking fields anywhere in `value`. Returns how many were masked.
pub fn redact_json_secrets(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut masked = 0;
            for (key, field) in map.iter_mut() {
                let lower = key.to_ascii_lowercase();
                if SECRET_JSON_KEYS.contains(&lower.as_str()) && field.is_string() {
                    *field = Value::String(REDACTED.to_string());
                    masked += 1;
                } else {
                    masked += redact_json_secrets(field);
                }
            }
            masked
        }
        Value::Array(items) => items.iter_mut().map(redact_json_secrets).sum(),
        _ => 0,
    }
}

/// Values of credential fields anywhere in `value`, for feeding a [`SecretRedactor`].
#[must_use]
pub fn collect_json_secrets(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_into(value, &mut out);
    out
}

fn collect_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, field) in map {
                let lower = key.to_ascii_lowercase();
                match field {
                    Value::String(secret) if SECRET_JSON_KEYS.contains(&lower.as_str()) => {
                        out.push(secret.clone());
                    }
                    other => collect_into(other, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, out)),
        _ => {}
    }
}

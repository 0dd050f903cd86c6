//! HTTP Authorization headers. Basic payloads are decoded and scored like
//! leaked credential pairs; JWT bearer payloads are decoded for expiry.

use super::jwt::decode_claims;
use crate::entropy::shannon_entropy;
use crate::rule::{fixture, Enrichment, Outcome, Rule, RuleSpec};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde_json::Value;

pub fn authorization() -> Box<dyn Rule> {
    let spec = RuleSpec::new(
        "http-auth-header",
        "HTTP Authorization Header",
        Regex::new(r"(?i)(Authorization|x-auth|x-token)[ ]?:[ ]?([a-z_0-9]{1,50}) ([A-Za-z0-9/+=.-]+)")
            .expect("http auth pattern"),
    )
    .keywords(&["Authorization"])
    .fp_regex(
        Regex::new(
            r"[a-zA-Z0-9_-]{2,30}://(<?)(user|username|usuario)(>?):(<?)(pass|password|token|secret|senha)(>?)@",
        )
        .expect("http auth fp pattern"),
    )
    .exclude(&["\n", "sqlserver://", "smtp://", "mailto:"])
    .true_positives([
        fixture("url", "Authorization: Bearer testeok\nnop"),
        fixture("url", "Authorization:Token testeok"),
        fixture("url", "Authorization: Basic dXNlcjpwYXNzMQ=="),
    ]);

    Box::new(AuthorizationHeader {
        spec,
        parts: Regex::new(r"(?i)^(.*):[ ]?([a-z_0-9]{1,50}) ([A-Za-z0-9/+=.-]+)$")
            .expect("http auth parts pattern"),
    })
}

struct AuthorizationHeader {
    spec: RuleSpec,
    parts: Regex,
}

impl Rule for AuthorizationHeader {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn post_process(&self, _text: &str, candidate: &str) -> Outcome {
        let Some(caps) = self.parts.captures(candidate) else {
            return Outcome::keep();
        };
        let auth_type = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let auth = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        let mut enrichment = Enrichment::default()
            .severity(60)
            .field("token", format!("{auth_type} {auth}"));

        match auth_type.to_lowercase().as_str() {
            "jwt" | "bearer" => {
                if let Some((header, payload)) = decode_claims(auth) {
                    let exp = payload.get("exp").and_then(Value::as_i64).unwrap_or(0);
                    let still_valid = exp >= chrono::Utc::now().timestamp() + 10_080;
                    enrichment = enrichment
                        .severity(if still_valid { 80 } else { 10 })
                        .field("header", header)
                        .field("payload", payload)
                        .field("still_valid", still_valid);
                }
            }
            "basic" => {
                if let Some((username, password)) = decode_basic(auth) {
                    if username.trim().is_empty() || password.trim().is_empty() {
                        return Outcome::Keep(enrichment);
                    }
                    let entropy = shannon_entropy(&password);
                    let mut severity: u8 = 100;
                    if entropy < 1.7 {
                        severity = 65;
                    }
                    if entropy <= 0.7 {
                        severity = 30;
                    }
                    if username.chars().count() <= 2 || password.chars().count() <= 2 {
                        return Outcome::Keep(enrichment);
                    }
                    enrichment = enrichment
                        .severity(severity)
                        .entropy(entropy)
                        .field("username", username)
                        .field("password", password);
                }
            }
            _ => {}
        }

        Outcome::Keep(enrichment)
    }
}

fn decode_basic(auth: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(auth.as_bytes()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

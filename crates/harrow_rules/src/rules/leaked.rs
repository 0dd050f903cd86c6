//! Leaked credential pairs in their common dump shapes: url/user/pass
//! blocks, `email:password` lines, and inline `user:password@host`.

use crate::entropy::{domain_of, score_credentials, LeakContext};
use crate::rule::{Outcome, Rule, RuleSpec};
use regex::Regex;

pub fn rules(context: LeakContext) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(CredentialBlock::new(context.clone())),
        Box::new(EmailPasswordPair::new(context.clone())),
        Box::new(InlineCredentials::new(context)),
    ]
}

// ============================================================================
// url / user / pass block
// ============================================================================

struct CredentialBlock {
    spec: RuleSpec,
    parts: Regex,
    context: LeakContext,
}

impl CredentialBlock {
    fn new(context: LeakContext) -> Self {
        let spec = RuleSpec::new(
            "leaked-credential-block",
            "Leaked Credentials (url/user/pass block)",
            Regex::new(
                r#"(?i)([a-zA-Z0-9_]+)[: ]{1,3}([a-zA-Z0-9_-]{2,30}://[^"'\n]{1,1024})\n[ \t]{0,5}(user|username|login|email)[ :]{1,3}([^\n]{3,1024})\n[ \t]{0,5}(pass|password|token|secret|senha|pwd)[ :]{1,3}([^\n]{3,1024})"#,
            )
            .expect("credential block pattern"),
        )
        .keywords(&["://"])
        .true_positives(["URL: http://domain.com.br/login\nUSER: fake_user\nPASS: fake_pass"])
        .false_positives(["Url: http://domain.com.br/login\nUSER: \nPASS: "]);

        Self {
            spec,
            parts: Regex::new(
                r#"(?i)^[a-zA-Z0-9_]{2,30}[: ]{1,3}([a-zA-Z0-9_-]{2,30}://[^"'\n]{1,1024})\n[ \t]{0,5}[a-zA-Z0-9_]{2,30}[ :]{1,3}([^\n]{1,1024})\n[ \t]{0,5}[a-zA-Z0-9_]{2,30}[ :]{1,3}([^\n]{1,1024})"#,
            )
            .expect("credential block parts pattern"),
            context,
        }
    }
}

impl Rule for CredentialBlock {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn post_process(&self, _text: &str, candidate: &str) -> Outcome {
        let normalized = candidate.replace('\r', "");
        let Some(caps) = self.parts.captures(&normalized) else {
            return Outcome::keep();
        };
        let url = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let username = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let password = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        if url.trim().is_empty() || password.trim().is_empty() {
            return Outcome::keep();
        }

        let domain = domain_of(username);
        if let Some(domain) = &domain {
            if self.context.is_excluded(domain) {
                return Outcome::FalsePositive;
            }
        }

        let enrichment =
            score_credentials(username, password, candidate, domain.as_deref(), &self.context)
                .field("url", url);
        Outcome::Keep(enrichment)
    }
}

// ============================================================================
// email:password
// ============================================================================

struct EmailPasswordPair {
    spec: RuleSpec,
    parts: Regex,
    context: LeakContext,
}

impl EmailPasswordPair {
    fn new(context: LeakContext) -> Self {
        let spec = RuleSpec::new(
            "leaked-email-pair",
            "Leaked Credentials (email:password)",
            Regex::new(r"(?i)([a-zA-Z0-9_-]{2,30}@[a-zA-Z0-9._-]{2,256}\.[a-zA-Z0-9.]{2,256}):(\S{1,1024})")
                .expect("email pair pattern"),
        )
        .keywords(&["@", ":"])
        .true_positives(["meuemail@mydomain.com:@Pass123"]);

        Self {
            spec,
            parts: Regex::new(
                r"(?i)^([a-zA-Z0-9_-]{2,30}@[a-zA-Z0-9._-]{2,256}\.[a-zA-Z0-9.]{2,256}):(\S{1,1024})$",
            )
            .expect("email pair parts pattern"),
            context,
        }
    }
}

impl Rule for EmailPasswordPair {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn post_process(&self, _text: &str, candidate: &str) -> Outcome {
        let normalized = candidate.replace('\r', "");
        let Some(caps) = self.parts.captures(&normalized) else {
            return Outcome::FalsePositive;
        };
        let username = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let password = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        if username.contains(' ') || username.contains("//") {
            return Outcome::FalsePositive;
        }
        if password.contains("://") {
            return Outcome::FalsePositive;
        }
        if username.trim().is_empty() || password.trim().is_empty() {
            return Outcome::FalsePositive;
        }

        let domain = domain_of(username);
        if let Some(domain) = &domain {
            if self.context.is_excluded(domain) {
                return Outcome::FalsePositive;
            }
        }

        Outcome::Keep(score_credentials(
            username,
            password,
            candidate,
            domain.as_deref(),
            &self.context,
        ))
    }
}

// ============================================================================
// user:password@host
// ============================================================================

struct InlineCredentials {
    spec: RuleSpec,
    parts: Regex,
    context: LeakContext,
}

impl InlineCredentials {
    fn new(context: LeakContext) -> Self {
        let spec = RuleSpec::new(
            "leaked-inline-creds",
            "Leaked Credentials (user:password@host)",
            Regex::new(r"([a-zA-Z0-9_.-]{2,30}):([^\s:]{4,1024}@[a-zA-Z0-9._-]{2,256}\.[a-zA-Z]{2,18})")
                .expect("inline creds pattern"),
        )
        .keywords(&["@", ":"])
        // URLs carry `host:port/path@...` shapes that are not credentials.
        .fp_regex(Regex::new(r"(?i)[a-zA-Z0-9_-]{2,30}://\S{1,1024}").expect("inline creds fp pattern"))
        .true_positives([
            "admin:Str0ngP@ss!@example.com",
            "backup_svc:Qr7!mZpX2@files.mycorp.net",
        ])
        .false_positives(["service_url = \"http://domain.com.br:8080/path@example.com\""]);

        Self {
            spec,
            parts: Regex::new(
                r"^([a-zA-Z0-9_.-]{2,30}):([^\s:]{1,1024})@([a-zA-Z0-9._-]{2,256}\.[a-zA-Z]{2,18})$",
            )
            .expect("inline creds parts pattern"),
            context,
        }
    }
}

impl Rule for InlineCredentials {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn post_process(&self, _text: &str, candidate: &str) -> Outcome {
        let normalized = candidate.replace('\r', "");
        let Some(caps) = self.parts.captures(&normalized) else {
            return Outcome::FalsePositive;
        };
        let username = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let password = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let host = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        if password.contains("://") {
            return Outcome::FalsePositive;
        }
        if self.context.is_excluded(host) {
            return Outcome::FalsePositive;
        }

        Outcome::Keep(score_credentials(
            username,
            password,
            candidate,
            Some(host),
            &self.context,
        ))
    }
}

//! Entropy scoring shared by the leaked-credential rules.

use crate::rule::Enrichment;
use serde_json::Value;

/// Shannon character-frequency entropy in nats (natural log base).
///
/// Placeholder secrets ("aaaa", "1234") land well below 1.7; realistic
/// passwords land above it.
pub fn shannon_entropy(data: &str) -> f64 {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 1 {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    for c in &chars {
        *counts.entry(*c).or_insert(0usize) += 1;
    }

    let len = chars.len() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.ln()
        })
        .sum()
}

/// Markers whose presence means a credential is almost certainly a sample.
const SAFE_MARKERS: [&str; 3] = ["localhost", "127.0.0.1", "example"];

/// Domain lists the leak rules consult: credentials on excluded domains are
/// suppressed outright, public mail domains only downgrade severity.
#[derive(Debug, Clone, Default)]
pub struct LeakContext {
    pub exclude_domains: Vec<String>,
    pub public_domains: Vec<String>,
}

impl LeakContext {
    pub fn is_excluded(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.exclude_domains
            .iter()
            .any(|d| domain.contains(&d.to_lowercase()))
    }

    pub fn is_public(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.public_domains
            .iter()
            .any(|d| domain.contains(&d.to_lowercase()))
    }
}

/// Severity ladder for a username/password pair, downgrading placeholders.
///
/// Monotone in entropy for a fixed password length: a higher-entropy secret
/// never scores below a lower-entropy one, all else equal.
pub fn score_credentials(
    username: &str,
    password: &str,
    found: &str,
    domain: Option<&str>,
    context: &LeakContext,
) -> Enrichment {
    let entropy = shannon_entropy(password);
    let found_lower = found.to_lowercase();

    let mut severity: i32 = 100;

    if password.starts_with('$') {
        // Shell/template expansion, not a literal secret.
        severity = 60;
    }
    if entropy < 1.7 {
        severity = 65;
    }
    if entropy <= 0.7 {
        severity = 30;
    }
    if entropy <= 2.0 && (found_lower.contains("@localhost") || found_lower.contains("@127.0.0.1"))
    {
        severity = 30;
    }
    if entropy <= 1.5 && found_lower.contains("example") {
        severity = 30;
    }
    if username.chars().count() <= 2 || password.chars().count() <= 2 {
        severity = 50;
    }
    if let Some(domain) = domain {
        if context.is_public(domain) {
            severity -= 20;
        }
    }

    let mut enrichment = Enrichment::default()
        .severity(severity.clamp(0, 100) as u8)
        .entropy(entropy)
        .field("username", username.trim())
        .field("password", password.trim());
    if let Some(domain) = domain {
        enrichment = enrichment.field("domain", Value::from(domain.trim().to_lowercase()));
    }
    enrichment
}

/// Extract an owning domain from `user@domain` or `DOMAIN\user` shaped
/// usernames, skipping known-safe markers.
pub fn domain_of(username: &str) -> Option<String> {
    if let Some((_, host)) = username.split_once('@') {
        let host = host.trim().to_lowercase();
        if host.len() > 3 && !SAFE_MARKERS.contains(&host.as_str()) {
            return Some(host);
        }
    }
    if let Some((realm, _)) = username.split_once('\\') {
        let realm = realm.trim().to_lowercase();
        if realm.len() > 3 && !SAFE_MARKERS.contains(&realm.as_str()) {
            return Some(realm);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_constant_string_is_zero() {
        assert_eq!(shannon_entropy("aaaaaaaa"), 0.0);
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("x"), 0.0);
    }

    #[test]
    fn entropy_grows_with_variety() {
        let low = shannon_entropy("aaaaaaab");
        let high = shannon_entropy("k9X2mQ7p");
        assert!(low < high);
        // Uniform 8 distinct chars: ln(8) nats.
        assert!((high - 8f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn severity_is_monotone_in_entropy() {
        let ctx = LeakContext::default();
        let low = score_credentials("user", "aaaaaaaa", "user:aaaaaaaa@mycorp.com", None, &ctx);
        let mid = score_credentials("user", "abababab", "user:abababab@mycorp.com", None, &ctx);
        let high = score_credentials("user", "k9X2mQ7p", "user:k9X2mQ7p@mycorp.com", None, &ctx);

        let (low, mid, high) = (
            low.severity.unwrap(),
            mid.severity.unwrap(),
            high.severity.unwrap(),
        );
        assert!(low <= mid && mid <= high);
        assert_eq!(high, 100);
        assert_eq!(low, 30);
    }

    #[test]
    fn safe_markers_downgrade() {
        let ctx = LeakContext::default();
        let e = score_credentials("root", "toor", "root:toor@localhost", None, &ctx);
        assert_eq!(e.severity.unwrap(), 30);
    }

    #[test]
    fn public_domain_downgrades() {
        let ctx = LeakContext {
            exclude_domains: vec![],
            public_domains: vec!["gmail.com".into()],
        };
        let e = score_credentials(
            "a.user@gmail.com",
            "Zx9!kQ2p",
            "a.user@gmail.com:Zx9!kQ2p",
            Some("gmail.com"),
            &ctx,
        );
        assert_eq!(e.severity.unwrap(), 80);
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("joe@corp.example.org"), Some("corp.example.org".into()));
        assert_eq!(domain_of("joe@example"), None);
        assert_eq!(domain_of("CORPDOM\\joe"), Some("corpdom".into()));
        assert_eq!(domain_of("plainuser"), None);
    }
}

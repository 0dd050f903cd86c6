//! The detection engine: validated rule registration and text scanning.

use crate::error::{Result, RuleError};
use crate::rule::{Outcome, Rule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// One rule match plus its enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "match")]
    pub matched: String,
    pub severity: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Hash of the match plus its serialized enrichment; dedup key for
    /// evidence downstream.
    pub fingerprint: String,
}

/// All findings one rule produced for a text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFindings {
    pub name: String,
    pub findings: Vec<Finding>,
}

/// Immutable set of validated rules, built once at startup and passed by
/// reference to whatever needs detection.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// Validate and register rules. Every true-positive fixture must produce
    /// at least one finding and every false-positive fixture must produce
    /// none; anything else fails registration. A broken detection rule must
    /// never run silently.
    pub fn register(rules: Vec<Box<dyn Rule>>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            let spec = rule.spec();
            if !seen.insert(spec.id) {
                return Err(RuleError::DuplicateId(spec.id.to_string()));
            }
            if spec.keywords.is_empty() {
                return Err(RuleError::NoKeywords {
                    rule: spec.id.to_string(),
                });
            }

            for tp in &spec.true_positives {
                if run_rule(rule.as_ref(), tp).is_empty() {
                    return Err(RuleError::TruePositiveMissed {
                        rule: spec.id.to_string(),
                        fixture: tp.clone(),
                    });
                }
            }
            for fp in &spec.false_positives {
                if !run_rule(rule.as_ref(), fp).is_empty() {
                    return Err(RuleError::FalsePositiveMatched {
                        rule: spec.id.to_string(),
                        fixture: fp.clone(),
                    });
                }
            }
            debug!(rule = spec.id, "rule validated");
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.spec().id).collect()
    }

    /// `(id, display name)` pairs, in registration order.
    pub fn summaries(&self) -> Vec<(&'static str, &'static str)> {
        self.rules
            .iter()
            .map(|r| (r.spec().id, r.spec().name))
            .collect()
    }

    /// Run every rule over `text`. Returns `None` when nothing fired.
    /// Overlapping rules each contribute their own findings.
    pub fn detect(&self, text: &str) -> Option<BTreeMap<String, RuleFindings>> {
        let mut all = BTreeMap::new();
        for rule in &self.rules {
            let findings = run_rule(rule.as_ref(), text);
            if !findings.is_empty() {
                let spec = rule.spec();
                all.insert(
                    spec.id.to_string(),
                    RuleFindings {
                        name: spec.name.to_string(),
                        findings,
                    },
                );
            }
        }

        if all.is_empty() {
            None
        } else {
            Some(all)
        }
    }
}

/// Run one rule over a text: keyword pre-filter, regex extraction, in-run
/// dedup, exclusion list, false-positive suppression (containment in either
/// direction), post-processing, fingerprinting.
fn run_rule(rule: &dyn Rule, text: &str) -> Vec<Finding> {
    let spec = rule.spec();

    if spec.keywords.is_empty() {
        return Vec::new();
    }
    let lowered = text.to_lowercase();
    if !spec
        .keywords
        .iter()
        .any(|k| lowered.contains(&k.to_lowercase()))
    {
        return Vec::new();
    }

    let mut candidates: Vec<String> = Vec::new();
    for candidate in extract(&spec.regex, spec.secret_group, text) {
        if candidates.contains(&candidate) {
            continue;
        }
        let lower = candidate.to_lowercase();
        if spec.exclude.iter().any(|x| lower.contains(&x.to_lowercase())) {
            continue;
        }
        candidates.push(candidate);
    }

    if let Some(fp_regex) = &spec.fp_regex {
        let fp_matches = extract(fp_regex, 0, text);
        candidates.retain(|candidate| {
            !fp_matches.iter().any(|fp| fp.contains(candidate.as_str()))
                && !fp_regex.is_match(candidate)
        });
    }

    let mut findings = Vec::new();
    for candidate in candidates {
        match rule.post_process(text, &candidate) {
            Outcome::FalsePositive => continue,
            Outcome::Keep(enrichment) => {
                let severity = enrichment.severity.unwrap_or(spec.severity);
                let mut finding = Finding {
                    matched: candidate,
                    severity,
                    entropy: enrichment.entropy,
                    fields: enrichment.fields,
                    fingerprint: String::new(),
                };
                finding.fingerprint = fingerprint_of(&finding);
                findings.push(finding);
            }
        }
    }

    findings
}

fn extract(regex: &Regex, group: usize, text: &str) -> Vec<String> {
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(group).map(|m| m.as_str().to_string()))
        .collect()
}

fn fingerprint_of(finding: &Finding) -> String {
    // serde_json maps iterate sorted, so the serialization is canonical.
    let serialized = serde_json::to_string(finding).unwrap_or_default();
    blake3::hash(format!("{}{}", finding.matched, serialized).as_bytes())
        .to_hex()
        .to_string()
}

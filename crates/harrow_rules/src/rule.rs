//! Rule definition: the static spec a detection pattern is built from, and
//! the hook through which a rule enriches or vetoes its candidates.

use regex::Regex;
use serde_json::{Map, Value};

/// Commonly used assignment operators or function call.
const OPERATOR: &str = r"(?:=|>|:=|\|\|:|<=|=>|:)";

/// Identifier tail between a keyword and its operator, e.g. `_api_key  `.
const IDENTIFIER_SUFFIX: &str = r#"(?:[0-9a-z\-_\t .]{0,20})(?:[\s|']|[\s|"]){0,3}"#;

/// Quoting/whitespace allowed right before a secret.
const SECRET_PREFIX: &str = r#"(?:'|"|\s|=|`){0,5}"#;

/// Boundary right after a secret.
const SECRET_SUFFIX: &str = r#"(?:['|"|\n|\r|\s|`|;]|$)"#;

/// Static configuration of one detection pattern. Immutable after
/// construction; compiled regexes live for the lifetime of the rule set.
pub struct RuleSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Cheap pre-filter: at least one keyword must occur in the lowercased
    /// text before the regex runs. A rule with no keywords never matches.
    pub keywords: Vec<&'static str>,
    pub regex: Regex,
    /// Capture group holding the secret; 0 takes the whole match.
    pub secret_group: usize,
    /// Candidates also matching this pattern (containment in either
    /// direction) are dropped.
    pub fp_regex: Option<Regex>,
    /// Candidates containing any of these substrings (case-insensitive) are
    /// dropped.
    pub exclude: Vec<&'static str>,
    /// Baseline severity, 0-100. Post-processors may override per finding.
    pub severity: u8,
    /// Samples that must each produce at least one finding at registration.
    pub true_positives: Vec<String>,
    /// Samples that must produce none.
    pub false_positives: Vec<String>,
}

impl RuleSpec {
    pub fn new(id: &'static str, name: &'static str, regex: Regex) -> Self {
        Self {
            id,
            name,
            keywords: Vec::new(),
            regex,
            secret_group: 0,
            fp_regex: None,
            exclude: Vec::new(),
            severity: 70,
            true_positives: Vec::new(),
            false_positives: Vec::new(),
        }
    }

    pub fn keywords(mut self, keywords: &[&'static str]) -> Self {
        self.keywords = keywords.to_vec();
        self
    }

    pub fn secret_group(mut self, group: usize) -> Self {
        self.secret_group = group;
        self
    }

    pub fn fp_regex(mut self, regex: Regex) -> Self {
        self.fp_regex = Some(regex);
        self
    }

    pub fn exclude(mut self, substrings: &[&'static str]) -> Self {
        self.exclude = substrings.to_vec();
        self
    }

    pub fn severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn true_positives<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.true_positives = samples.into_iter().map(Into::into).collect();
        self
    }

    pub fn false_positives<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.false_positives = samples.into_iter().map(Into::into).collect();
        self
    }
}

/// Structured data a post-processor attaches to a candidate.
#[derive(Debug, Default, Clone)]
pub struct Enrichment {
    /// Severity override; the spec baseline applies when absent.
    pub severity: Option<u8>,
    pub entropy: Option<f64>,
    pub fields: Map<String, Value>,
}

impl Enrichment {
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn severity(mut self, severity: u8) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn entropy(mut self, entropy: f64) -> Self {
        self.entropy = Some(entropy);
        self
    }
}

/// Verdict of a rule's post-processing hook for one candidate.
#[derive(Debug)]
pub enum Outcome {
    /// Keep the candidate, possibly enriched.
    Keep(Enrichment),
    /// Suppress the candidate. This is a classification, not an error.
    FalsePositive,
}

impl Outcome {
    pub fn keep() -> Self {
        Outcome::Keep(Enrichment::default())
    }
}

/// One registered detection pattern.
pub trait Rule: Send + Sync {
    fn spec(&self) -> &RuleSpec;

    /// Enrich or veto one regex candidate. `text` is the full scanned
    /// content, for rules that correlate surrounding context (e.g. an AWS
    /// secret near its access key). The default keeps the candidate as-is.
    fn post_process(&self, text: &str, candidate: &str) -> Outcome {
        let _ = (text, candidate);
        Outcome::keep()
    }
}

/// A rule that is fully described by its spec.
pub struct SimpleRule {
    spec: RuleSpec,
}

impl SimpleRule {
    pub fn new(spec: RuleSpec) -> Box<dyn Rule> {
        Box::new(Self { spec })
    }
}

impl Rule for SimpleRule {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }
}

/// `identifier <junk> <operator> <quote> secret <boundary>`, the shape of
/// most "named key" leaks in config files.
pub fn semi_generic_regex(identifiers: &[&str], secret_pattern: &str) -> Regex {
    let pattern = format!(
        r"(?i)(?:{ids}){IDENTIFIER_SUFFIX}{OPERATOR}{SECRET_PREFIX}({secret_pattern}){SECRET_SUFFIX}",
        ids = identifiers.join("|"),
    );
    compile(&pattern)
}

/// A token whose prefix alone identifies it (e.g. `ghp_`, `AGE-SECRET-KEY-1`).
pub fn unique_token_regex(secret_pattern: &str) -> Regex {
    let pattern = format!(r"(?i)\b({secret_pattern}){SECRET_SUFFIX}");
    compile(&pattern)
}

fn compile(pattern: &str) -> Regex {
    // Builders are only called with literal patterns that are exercised by
    // rule fixtures at registration time.
    Regex::new(pattern).expect("built-in rule pattern")
}

pub fn hex_of(len: usize) -> String {
    format!("[a-f0-9]{{{len}}}")
}

pub fn alpha_numeric_extended_short(len: usize) -> String {
    format!("[a-z0-9_-]{{{len}}}")
}

/// Wrap a secret in a realistic assignment for TP/FP fixtures.
pub fn fixture(identifier: &str, secret: &str) -> String {
    format!("{identifier}_access_secret = \"{secret}\"")
}

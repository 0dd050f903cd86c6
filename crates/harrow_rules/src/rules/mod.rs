//! Built-in detection rules.
//!
//! Adding a rule means adding a module here and listing its constructor in
//! [`builtin_rules`]; the dispatcher core never changes.

mod adafruit;
mod adobe;
mod age;
mod aws;
mod github;
mod gitlab;
mod http_header;
mod jwt;
mod leaked;
mod url_creds;

use crate::entropy::LeakContext;
use crate::rule::Rule;

/// Mail providers whose domains point at a person rather than an
/// organization; leaks there score lower.
pub const DEFAULT_PUBLIC_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "hotmail.com",
    "outlook.com",
    "live.com",
    "yahoo.com",
    "icloud.com",
    "proton.me",
    "protonmail.com",
];

/// The complete bootstrap list. Order is presentation-only; each rule is
/// independent.
pub fn builtin_rules(context: &LeakContext) -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = Vec::new();
    rules.push(aws::access_token());
    rules.extend(github::rules());
    rules.extend(gitlab::rules());
    rules.extend(adobe::rules());
    rules.push(adafruit::api_key());
    rules.push(age::secret_key());
    rules.push(jwt::token());
    rules.push(url_creds::credentials());
    rules.push(http_header::authorization());
    rules.extend(leaked::rules(context.clone()));
    rules
}

/// A [`LeakContext`] with the stock public-domain list and no exclusions.
pub fn default_context() -> LeakContext {
    LeakContext {
        exclude_domains: Vec::new(),
        public_domains: DEFAULT_PUBLIC_DOMAINS.iter().map(|s| s.to_string()).collect(),
    }
}

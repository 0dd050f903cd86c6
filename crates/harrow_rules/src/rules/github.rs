//! GitHub token families. All prefixes are self-identifying, so these are
//! plain spec rules with no post-processing.

use crate::rule::{fixture, Rule, RuleSpec, SimpleRule};
use regex::Regex;

const SAMPLE_36: &str = "1a2b3c4d5e6f7g8h9i0j1k2l3m4n5o6p7q8r";
const SAMPLE_82: &str =
    "0a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6q7r8s9t0u1v2w3x4y5z0a1b2c3d4e5f6g7h8i9j0k1l2m3n4o";

pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        SimpleRule::new(
            RuleSpec::new(
                "github-pat",
                "GitHub Personal Access Token",
                Regex::new(r"ghp_[0-9a-zA-Z]{36}").expect("github pat pattern"),
            )
            .keywords(&["ghp_"])
            .true_positives([fixture("github", &format!("ghp_{SAMPLE_36}"))]),
        ),
        SimpleRule::new(
            RuleSpec::new(
                "github-fine-grained-pat",
                "GitHub Fine-Grained Personal Access Token",
                Regex::new(r"github_pat_[0-9a-zA-Z_]{82}").expect("github fine-grained pattern"),
            )
            .keywords(&["github_pat_"])
            .true_positives([fixture("github", &format!("github_pat_{SAMPLE_82}"))]),
        ),
        SimpleRule::new(
            RuleSpec::new(
                "github-oauth",
                "GitHub OAuth Access Token",
                Regex::new(r"gho_[0-9a-zA-Z]{36}").expect("github oauth pattern"),
            )
            .keywords(&["gho_"])
            .true_positives([fixture("github", &format!("gho_{SAMPLE_36}"))]),
        ),
        SimpleRule::new(
            RuleSpec::new(
                "github-app-token",
                "GitHub App Token",
                Regex::new(r"(ghu|ghs)_[0-9a-zA-Z]{36}").expect("github app pattern"),
            )
            .keywords(&["ghu_", "ghs_"])
            .true_positives([
                fixture("github", &format!("ghu_{SAMPLE_36}")),
                fixture("github", &format!("ghs_{SAMPLE_36}")),
            ]),
        ),
        SimpleRule::new(
            RuleSpec::new(
                "github-refresh-token",
                "GitHub Refresh Token",
                Regex::new(r"ghr_[0-9a-zA-Z]{36}").expect("github refresh pattern"),
            )
            .keywords(&["ghr_"])
            .true_positives([fixture("github", &format!("ghr_{SAMPLE_36}"))]),
        ),
    ]
}

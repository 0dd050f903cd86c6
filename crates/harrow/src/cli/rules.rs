use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use harrow_rules::{builtin_rules, RuleSet};

#[derive(Args)]
pub struct RulesArgs {}

pub fn run(config: Config, _args: RulesArgs) -> Result<()> {
    let rules = RuleSet::register(builtin_rules(&config.general.leak_context()))
        .context("detection rules failed self-validation")?;

    println!("{} rules registered, all fixtures passing:", rules.len());
    for (id, name) in rules.summaries() {
        println!("  {id:<28} {name}");
    }
    Ok(())
}

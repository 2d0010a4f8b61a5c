use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::models::{Direction, NormalizedRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
    Regex,
}

/// Which booking leg a rule fills. `Auto` takes the leg opposite the bank account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RuleSide {
    #[default]
    Auto,
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRule {
    pub keyword: String,
    pub account_no: String,
    #[serde(default)]
    pub side: RuleSide,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub priority: i64,
}

impl PostingRule {
    /// Reject rules that could never match: empty keywords and bad patterns.
    pub fn validate(&self) -> Result<()> {
        let keyword = self.keyword.trim();
        if keyword.is_empty() {
            return Err(ImportError::Other("Rule keyword must not be empty".to_string()));
        }
        if self.match_type == MatchType::Regex {
            Regex::new(keyword)
                .map_err(|e| ImportError::Other(format!("Invalid regex '{keyword}': {e}")))?;
        }
        Ok(())
    }
}

fn matches(description: &str, pattern: &str, match_type: MatchType) -> bool {
    let desc_upper = description.to_uppercase();
    let pat_upper = pattern.to_uppercase();
    match match_type {
        MatchType::Contains => desc_upper.contains(&pat_upper),
        MatchType::StartsWith => desc_upper.starts_with(&pat_upper),
        MatchType::Regex => Regex::new(pattern)
            .map(|re| re.is_match(description))
            .unwrap_or(false),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AssignResult {
    pub assigned: usize,
    pub unmatched: usize,
}

/// Fill counter-accounts from the first matching rule, highest priority first.
/// Legs that already hold an account are left alone.
pub fn assign_accounts(records: &mut [NormalizedRecord], rules: &[PostingRule]) -> AssignResult {
    let mut ordered: Vec<&PostingRule> = rules
        .iter()
        .filter(|r| match r.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("skipping posting rule: {e}");
                false
            }
        })
        .collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut result = AssignResult::default();
    for record in records.iter_mut() {
        let rule = ordered
            .iter()
            .find(|r| matches(&record.description, r.keyword.trim(), r.match_type));
        let Some(rule) = rule else {
            result.unmatched += 1;
            continue;
        };
        let slot = match (rule.side, record.direction) {
            (RuleSide::Debit, _) | (RuleSide::Auto, Direction::Debit) => &mut record.debit_side_account,
            (RuleSide::Credit, _) | (RuleSide::Auto, Direction::Credit) => &mut record.credit_side_account,
        };
        if slot.is_empty() {
            *slot = rule.account_no.clone();
            result.assigned += 1;
            debug!("record {} -> {} via {:?}", record.id, rule.account_no, rule.keyword);
        } else {
            result.unmatched += 1;
        }
    }
    result
}

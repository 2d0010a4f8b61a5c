use comfy_table::{Cell, Table};

use crate::assigner::{MatchType, PostingRule, RuleSide};
use crate::error::{ImportError, Result};
use crate::settings::{load_settings, save_settings};

pub fn add(keyword: &str, account: &str, side: RuleSide, match_type: MatchType, priority: i64) -> Result<()> {
    let rule = PostingRule {
        keyword: keyword.trim().to_string(),
        account_no: account.trim().to_string(),
        side,
        match_type,
        priority,
    };
    rule.validate()?;
    let mut settings = load_settings();
    settings.posting_rules.push(rule);
    save_settings(&settings)?;
    println!("Added rule: '{keyword}' \u{2192} {account}");
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();
    let mut table = Table::new();
    table.set_header(vec!["#", "Keyword", "Type", "Side", "Account", "Priority"]);
    for (i, rule) in settings.posting_rules.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.keyword),
            Cell::new(format!("{:?}", rule.match_type).to_lowercase()),
            Cell::new(format!("{:?}", rule.side).to_lowercase()),
            Cell::new(&rule.account_no),
            Cell::new(rule.priority),
        ]);
    }
    println!("Posting rules\n{table}");
    Ok(())
}

pub fn remove(index: usize) -> Result<()> {
    let mut settings = load_settings();
    if index == 0 || index > settings.posting_rules.len() {
        return Err(ImportError::Other(format!("No rule at position {index}")));
    }
    let rule = settings.posting_rules.remove(index - 1);
    save_settings(&settings)?;
    println!("Removed rule {index}: '{}' \u{2192} {}", rule.keyword, rule.account_no);
    Ok(())
}

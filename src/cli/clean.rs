use colored::Colorize;

use crate::cleanup::{clean_description, CleanupRule};
use crate::error::{ImportError, Result};
use crate::settings::load_settings;

pub fn run(text: &str, disable: &[String], remove: &[String]) -> Result<()> {
    let mut options = load_settings().cleanup;
    for key in disable {
        let rule = CleanupRule::from_key(key)
            .ok_or_else(|| ImportError::Other(format!("Unknown cleanup rule: {key}")))?;
        options.set(rule, false);
    }
    options.custom_removals.extend(remove.iter().cloned());

    let result = clean_description(text, &options);
    println!("Before:  {text}");
    println!("After:   {}", result.text.bold());
    if result.changed_rules.is_empty() {
        println!("No rule changed the text.");
    } else {
        let keys: Vec<&str> = result.changed_rules.iter().map(|r| r.key()).collect();
        println!("Changed: {}", keys.join(", "));
    }
    Ok(())
}

use crate::cleanup::CleanupRule;
use crate::error::Result;
use crate::models::VatMode;
use crate::settings::{load_settings, save_settings, settings_path};

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

pub fn show() -> Result<()> {
    let settings = load_settings();
    println!("Settings:      {}", settings_path().display());
    println!(
        "Bank account:  {}",
        if settings.bank_account.is_empty() { "(not set)" } else { &settings.bank_account }
    );
    println!(
        "VAT:           {}",
        match settings.vat_mode {
            VatMode::With => "with",
            VatMode::Without => "without",
        }
    );
    println!("Currency:      {}", settings.default_currency);
    println!();
    println!("Cleanup rules:");
    for rule in CleanupRule::TOGGLES {
        println!("  {:<20}{}", rule.key(), on_off(settings.cleanup.enabled(rule)));
    }
    if !settings.cleanup.custom_removals.is_empty() {
        println!("  removals:           {}", settings.cleanup.custom_removals.join(" | "));
    }
    println!("Posting rules: {}", settings.posting_rules.len());
    Ok(())
}

pub fn set(
    bank_account: Option<String>,
    vat: Option<VatMode>,
    currency: Option<String>,
    add_removal: Vec<String>,
) -> Result<()> {
    let mut settings = load_settings();
    if let Some(account) = bank_account {
        settings.bank_account = account.trim().to_string();
    }
    if let Some(vat) = vat {
        settings.vat_mode = vat;
    }
    if let Some(currency) = currency {
        settings.default_currency = currency.trim().to_uppercase();
    }
    for removal in add_removal {
        if !removal.trim().is_empty() && !settings.cleanup.custom_removals.contains(&removal) {
            settings.cleanup.custom_removals.push(removal);
        }
    }
    save_settings(&settings)?;
    println!("Saved settings to {}", settings_path().display());
    Ok(())
}

//! Init command - write the crypto section of settings.json

use anyhow::{bail, Result};
use dialoguer::Password;

use cardledger_core::config::{Config, EnvOverrides, SETTINGS_FILE};
use cardledger_core::domain::MIN_SECRET_LEN;

use super::get_data_dir;
use crate::output;

pub fn run(secret: Option<String>, force: bool, json: bool) -> Result<()> {
    let data_dir = get_data_dir()?;

    // Replacing the key strands every stored card number
    let existing = Config::load_with(&data_dir, &EnvOverrides::default()).is_ok();
    if existing && !force {
        bail!(
            "{} already holds crypto settings; pass --force to replace them",
            data_dir.join(SETTINGS_FILE).display()
        );
    }

    let secret = match secret {
        Some(s) => s,
        None => Password::new()
            .with_prompt("Secret key")
            .with_confirmation("Repeat secret key", "Secret keys do not match")
            .interact()?,
    };
    if secret.chars().count() < MIN_SECRET_LEN {
        bail!("Secret key must be at least {} characters", MIN_SECRET_LEN);
    }

    let config = Config::init(&data_dir, &secret)?;

    if json {
        return output::json_ok(serde_json::json!({
            "settings": data_dir.join(SETTINGS_FILE).to_string_lossy(),
            "validity_years": config.cards.validity_years,
        }));
    }

    output::success("Settings written");
    output::info(&format!("  {}", data_dir.join(SETTINGS_FILE).display()));
    if existing {
        output::warning("Cards created with the previous key can no longer be decrypted.");
    }
    Ok(())
}

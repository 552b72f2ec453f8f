pub mod device;
pub mod group;
pub mod login;
pub mod progress;
pub mod tenant;

use crate::error::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Ask before mutating; `--yes` skips the prompt
pub(crate) fn confirm_or_skip(skip: bool, prompt: &str, default: bool) -> Result<bool> {
    if skip {
        return Ok(true);
    }
    let proceed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?;
    if !proceed {
        println!("{}", "Cancelled.".yellow());
    }
    Ok(proceed)
}

//! Interactive prompt utilities.

use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt for optional text input.
pub fn input_optional(prompt: &str) -> Result<Option<String>, dialoguer::Error> {
    let result: String = Input::with_theme(&theme())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    if result.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(result))
    }
}

/// Prompt for a new password twice (hidden input).
pub fn new_password(prompt: &str) -> Result<String, dialoguer::Error> {
    Password::with_theme(&theme())
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
}

/// Prompt for confirmation (yes/no).
pub fn confirm(prompt: &str) -> Result<bool, dialoguer::Error> {
    Confirm::with_theme(&theme())
        .with_prompt(prompt)
        .default(false)
        .interact()
}

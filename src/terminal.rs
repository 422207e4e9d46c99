use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input, Password};

pub fn input(prompt: &str) -> Result<String> {
    Ok(Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?)
}

/// Masked prompt for a fixed-length numeric secret (PIN, OTP).
pub fn secret_digits(prompt: &str, len: usize) -> Result<String> {
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .validate_with(move |value: &String| -> Result<(), String> {
            if value.len() != len {
                return Err(format!("needs to be exactly {len} digits"));
            }
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return Err("only digits are allowed".to_string());
            }
            Ok(())
        })
        .interact()?)
}

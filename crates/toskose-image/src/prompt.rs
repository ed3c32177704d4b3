//! Interactive providers for registry credentials and confirmations.
//!
//! Prompts block until the user answers; there is no timeout.

use dialoguer::{Confirm, Input, Password};
use toskose_common::error::{Result, ToskoseError};

use crate::engine::RegistryCredentials;

/// Supplies registry credentials.
pub trait CredentialProvider {
    /// Asks for credentials to access `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be collected.
    fn credentials(&self, image: &str) -> Result<RegistryCredentials>;
}

/// Answers yes/no questions.
pub trait ConfirmationProvider {
    /// Asks `question`, returning the answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be collected.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Console prompts backed by `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

fn prompt_failed(error: &dialoguer::Error) -> ToskoseError {
    tracing::error!(error = %error, "console prompt failed");
    ToskoseError::fatal("failed to read from the console")
}

impl CredentialProvider for ConsolePrompt {
    fn credentials(&self, image: &str) -> Result<RegistryCredentials> {
        tracing::info!(image = %image, "authenticate with the Docker registry");
        let username: String = Input::new()
            .with_prompt("Enter the username")
            .interact_text()
            .map_err(|e| prompt_failed(&e))?;
        let password = Password::new()
            .with_prompt("Enter the password")
            .interact()
            .map_err(|e| prompt_failed(&e))?;
        Ok(RegistryCredentials { username, password })
    }
}

impl ConfirmationProvider for ConsolePrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(question)
            .default(true)
            .interact()
            .map_err(|e| prompt_failed(&e))
    }
}

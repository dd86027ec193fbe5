//! User interaction during model acquisition.

use std::path::PathBuf;

use dialoguer::Input;

use crate::error::ModelError;

/// What the user supplied for a missing model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Url(String),
    Path(PathBuf),
    Skip,
}

impl Reply {
    /// Interpret a line of user input.
    ///
    /// `skip` (any case) skips the model, an `http://` or `https://` prefix
    /// marks a URL, anything else is a local path.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("skip") {
            Self::Skip
        } else if text.starts_with("http://") || text.starts_with("https://") {
            Self::Url(text.to_string())
        } else {
            Self::Path(PathBuf::from(text))
        }
    }
}

/// Source of replies and sink of notices for the acquisition loop.
pub trait UserInput {
    fn ask(&mut self, prompt: &str) -> Result<Reply, ModelError>;

    fn notify(&mut self, message: &str);
}

/// Interactive terminal prompts via `dialoguer`.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl UserInput for TerminalInput {
    fn ask(&mut self, prompt: &str) -> Result<Reply, ModelError> {
        let text: String = Input::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| ModelError::Prompt(e.to_string()))?;
        Ok(Reply::parse(&text))
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

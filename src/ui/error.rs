use crate::ui::types::ActionKind;
use thiserror::Error;

pub type UiResult<T> = std::result::Result<T, UiError>;

#[derive(Debug, Error)]
pub enum UiError {
    #[error("stale element reference")]
    StaleElement,

    #[error("comment editor not found")]
    EditorNotFound,

    #[error("element not found: {0}")]
    ElementMissing(String),

    #[error("{0} submission could not be verified")]
    NotVerified(ActionKind),

    #[error("authenticated session lost")]
    AuthenticationLost,

    #[error("automation driver unavailable: {0}")]
    DriverUnavailable(String),
}

impl UiError {
    /// Session-fatal errors end the run; everything else only affects the current item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, UiError::AuthenticationLost | UiError::DriverUnavailable(_))
    }
}

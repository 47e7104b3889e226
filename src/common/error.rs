use rust_tokenizers::error::TokenizerError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Value error: {0}")]
    ValueError(String),
}

impl From<std::io::Error> for QaError {
    fn from(error: std::io::Error) -> Self {
        QaError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for QaError {
    fn from(error: serde_json::Error) -> Self {
        QaError::InvalidConfigurationError(error.to_string())
    }
}

impl From<TokenizerError> for QaError {
    fn from(error: TokenizerError) -> Self {
        QaError::TokenizerError(error.to_string())
    }
}

impl From<TchError> for QaError {
    fn from(error: TchError) -> Self {
        QaError::TchError(error.to_string())
    }
}

use pinhole_core::ShortenerError;
use thiserror::Error;

/// Errors returned by short-code generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("every candidate was occupied after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl From<GeneratorError> for ShortenerError {
    fn from(value: GeneratorError) -> Self {
        ShortenerError::InternalGenerationFailure(value.to_string())
    }
}

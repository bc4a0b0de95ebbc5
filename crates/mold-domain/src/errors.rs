// error.rs
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// El molde no admite la operación en su estado actual (por ejemplo
  /// reubicar un molde ya desechado).
  #[error("Conflicto de estado: {0}")]
  StateConflict(String),
  #[error("Error externo: {0}")]
  ExternalError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

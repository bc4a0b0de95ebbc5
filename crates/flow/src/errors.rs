// Archivo: errors.rs
// Propósito: definir los errores del motor de workflows y el alias Result<T>
// usado por las APIs del crate.
use mold_domain::DomainError;
use thiserror::Error;

/// Errores del motor de workflows.
///
/// - `Validation`: entrada mal formada (estado desconocido, campo vacío).
/// - `NotFound`: workflow, etapa o molde inexistente.
/// - `StateConflict`: la petición es correcta en forma pero viola la máquina
///   de estados (transición ilegal, etapa fuera de orden, workflow terminal).
/// - `Unauthorized`: el actor no tiene el rol requerido.
/// - `Storage`: fallo de la transacción; todo se revierte.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Entrada inválida.
    #[error("Error de validación: {0}")]
    Validation(String),
    /// Entidad no encontrada.
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Conflicto con la máquina de estados.
    #[error("Conflicto de estado: {0}")]
    StateConflict(String),
    /// Actor sin permisos para la etapa o transición.
    #[error("No autorizado: {0}")]
    Unauthorized(String),
    /// Error de almacenamiento (BD, pool, transacción).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl FlowError {
    /// Código estable expuesto a los clientes.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Validation(_) => "validation_error",
            FlowError::NotFound(_) => "not_found",
            FlowError::StateConflict(_) => "state_conflict",
            FlowError::Unauthorized(_) => "authorization_error",
            FlowError::Storage(_) => "persistence_error",
        }
    }
}

impl From<DomainError> for FlowError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::ValidationError(m) => FlowError::Validation(m),
            DomainError::NotFound(m) => FlowError::NotFound(m),
            DomainError::StateConflict(m) => FlowError::StateConflict(m),
            DomainError::ExternalError(m) => FlowError::Storage(m),
            DomainError::SerializationError(m) => FlowError::Storage(m),
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Storage(format!("serialización: {}", e))
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FlowError>;

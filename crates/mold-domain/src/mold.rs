// mold.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Estado de ciclo de vida del molde en el registro maestro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoldStatus {
  Production,
  Repair,
  Transit,
  Storage,
  Scrapped,
}

impl MoldStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      MoldStatus::Production => "production",
      MoldStatus::Repair => "repair",
      MoldStatus::Transit => "transit",
      MoldStatus::Storage => "storage",
      MoldStatus::Scrapped => "scrapped",
    }
  }
}

impl fmt::Display for MoldStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for MoldStatus {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "production" => Ok(MoldStatus::Production),
      "repair" => Ok(MoldStatus::Repair),
      "transit" => Ok(MoldStatus::Transit),
      "storage" => Ok(MoldStatus::Storage),
      "scrapped" => Ok(MoldStatus::Scrapped),
      other => Err(DomainError::ValidationError(format!("Estado de molde desconocido: {}", other))),
    }
  }
}

/// Registro maestro de un molde.
///
/// Lo administra el sistema CRUD circundante; el motor de workflows sólo lo
/// modifica al completar una transferencia (`relocate`) o un desecho
/// (`scrap`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mold {
  id: Uuid,
  mold_code: String,
  status: MoldStatus,
  current_location_company_id: Uuid,
  current_shots: i64,
  updated_at: DateTime<Utc>,
}

impl Mold {
  /// Crea un molde nuevo en producción ubicado en `company_id`.
  pub fn new(mold_code: &str, company_id: Uuid, current_shots: i64) -> Result<Self, DomainError> {
    Self::from_parts(Uuid::new_v4(), mold_code, MoldStatus::Production, company_id, current_shots, Utc::now())
  }

  /// Reconstruye un molde desde la persistencia aplicando las mismas
  /// validaciones que `new`.
  pub fn from_parts(id: Uuid,
                    mold_code: &str,
                    status: MoldStatus,
                    current_location_company_id: Uuid,
                    current_shots: i64,
                    updated_at: DateTime<Utc>)
                    -> Result<Self, DomainError> {
    if mold_code.trim().is_empty() {
      return Err(DomainError::ValidationError("El código de molde no puede estar vacío".to_string()));
    }
    if current_shots < 0 {
      return Err(DomainError::ValidationError(format!("Número de disparos inválido: {}", current_shots)));
    }
    Ok(Self { id,
              mold_code: mold_code.trim().to_string(),
              status,
              current_location_company_id,
              current_shots,
              updated_at })
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn mold_code(&self) -> &str {
    &self.mold_code
  }

  pub fn status(&self) -> MoldStatus {
    self.status
  }

  pub fn current_location_company_id(&self) -> Uuid {
    self.current_location_company_id
  }

  pub fn current_shots(&self) -> i64 {
    self.current_shots
  }

  pub fn updated_at(&self) -> DateTime<Utc> {
    self.updated_at
  }

  pub fn is_scrapped(&self) -> bool {
    self.status == MoldStatus::Scrapped
  }

  /// Reasigna la ubicación/empresa propietaria del molde.
  pub fn relocate(&mut self, to_company_id: Uuid) -> Result<(), DomainError> {
    if self.is_scrapped() {
      return Err(DomainError::StateConflict(format!("El molde {} está desechado y no puede reubicarse", self.mold_code)));
    }
    self.current_location_company_id = to_company_id;
    self.updated_at = Utc::now();
    Ok(())
  }

  /// Marca el molde como desechado. Un molde sólo se desecha una vez.
  pub fn scrap(&mut self) -> Result<(), DomainError> {
    if self.is_scrapped() {
      return Err(DomainError::StateConflict(format!("El molde {} ya fue desechado", self.mold_code)));
    }
    self.status = MoldStatus::Scrapped;
    self.updated_at = Utc::now();
    Ok(())
  }
}

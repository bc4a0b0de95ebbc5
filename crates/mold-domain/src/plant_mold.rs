use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Copia desnormalizada del molde que mantiene cada planta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantMold {
  pub mold_id: Uuid,
  pub company_id: Uuid,
  pub updated_at: DateTime<Utc>,
}

impl PlantMold {
  pub fn new(mold_id: Uuid, company_id: Uuid) -> Self {
    Self { mold_id, company_id, updated_at: Utc::now() }
  }
}

use crate::{DomainError, Mold, PlantMold};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Contrato del colaborador CRUD que guarda el registro maestro de moldes.
///
/// Los métodos reciben `&mut self` porque se invocan sobre un manejador
/// acotado a una transacción: toda lectura/escritura hecha por el motor de
/// workflows ocurre dentro de la misma unidad de trabajo que el cambio de
/// estado que la provoca.
pub trait MoldRepository {
  /// Inserta un molde nuevo. Falla con `ValidationError` si el id ya existe.
  fn insert_mold(&mut self, mold: &Mold) -> Result<(), DomainError>;

  /// Lectura simple del molde (sin bloqueo).
  fn get_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError>;

  /// Lectura con bloqueo de fila (`SELECT ... FOR UPDATE` o equivalente).
  /// Serializa efectos laterales concurrentes sobre el mismo molde.
  fn lock_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError>;

  /// Sobrescribe estado, ubicación y disparos del molde.
  fn update_mold(&mut self, mold: &Mold) -> Result<(), DomainError>;

  /// Registra la copia local de una planta.
  fn insert_plant_mirror(&mut self, mirror: &PlantMold) -> Result<(), DomainError>;

  /// Copias locales del molde en todas las plantas.
  fn plant_mirrors(&mut self, mold_id: &Uuid) -> Result<Vec<PlantMold>, DomainError>;

  /// Reasigna todas las copias locales del molde a `company_id`. Devuelve
  /// el número de filas modificadas.
  fn relocate_plant_mirrors(&mut self, mold_id: &Uuid, company_id: &Uuid) -> Result<usize, DomainError>;
}

/// Implementación en memoria para tests y desarrollo.
///
/// Es un valor `Clone` a propósito: el store en memoria del motor copia el
/// registro al abrir una transacción y lo reemplaza sólo al confirmar.
#[derive(Debug, Clone, Default)]
pub struct MoldRegistry {
  molds: HashMap<Uuid, Mold>,
  mirrors: HashMap<Uuid, Vec<PlantMold>>,
}

impl MoldRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.molds.len()
  }

  pub fn is_empty(&self) -> bool {
    self.molds.is_empty()
  }
}

impl MoldRepository for MoldRegistry {
  fn insert_mold(&mut self, mold: &Mold) -> Result<(), DomainError> {
    if self.molds.contains_key(&mold.id()) {
      return Err(DomainError::ValidationError(format!("El molde {} ya existe", mold.id())));
    }
    self.molds.insert(mold.id(), mold.clone());
    Ok(())
  }

  fn get_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError> {
    Ok(self.molds.get(id).cloned())
  }

  fn lock_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError> {
    // el préstamo exclusivo de `self` ya serializa el acceso
    self.get_mold(id)
  }

  fn update_mold(&mut self, mold: &Mold) -> Result<(), DomainError> {
    match self.molds.get_mut(&mold.id()) {
      Some(slot) => {
        *slot = mold.clone();
        Ok(())
      }
      None => Err(DomainError::NotFound(format!("molde {}", mold.id()))),
    }
  }

  fn insert_plant_mirror(&mut self, mirror: &PlantMold) -> Result<(), DomainError> {
    if !self.molds.contains_key(&mirror.mold_id) {
      return Err(DomainError::NotFound(format!("molde {}", mirror.mold_id)));
    }
    self.mirrors.entry(mirror.mold_id).or_default().push(mirror.clone());
    Ok(())
  }

  fn plant_mirrors(&mut self, mold_id: &Uuid) -> Result<Vec<PlantMold>, DomainError> {
    Ok(self.mirrors.get(mold_id).cloned().unwrap_or_default())
  }

  fn relocate_plant_mirrors(&mut self, mold_id: &Uuid, company_id: &Uuid) -> Result<usize, DomainError> {
    let now = Utc::now();
    let rows = self.mirrors.get_mut(mold_id).map(|list| {
                                              for m in list.iter_mut() {
                                                m.company_id = *company_id;
                                                m.updated_at = now;
                                              }
                                              list.len()
                                            });
    Ok(rows.unwrap_or(0))
  }
}

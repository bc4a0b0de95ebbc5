// Archivo: side_effects.rs
// Propósito: mutar el registro maestro del molde (y sus copias de planta)
// cuando un workflow alcanza su estado terminal de éxito.
use crate::domain::{WorkflowDetails, WorkflowRequest};
use crate::errors::{FlowError, Result};
use crate::repository::WorkflowTx;
use crate::status::WorkflowStatus;
use log::info;
use serde::Serialize;
use uuid::Uuid;

/// Efecto aplicado sobre el molde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    MoldRelocated {
        mold_id: Uuid,
        from_company_id: Uuid,
        to_company_id: Uuid,
        mirrors_updated: usize,
    },
    MoldScrapped {
        mold_id: Uuid,
    },
}

pub struct SideEffectApplier;

impl SideEffectApplier {
    /// Aplica el efecto de `request` si esta misma llamada acaba de mover el
    /// workflow de `previous_status` (no terminal) a su estado de éxito.
    /// En cualquier otro caso no toca el molde y devuelve `None`.
    pub fn apply(tx: &mut dyn WorkflowTx,
                 request: &WorkflowRequest,
                 previous_status: WorkflowStatus)
                 -> Result<Option<SideEffect>> {
        if previous_status.is_terminal() || !request.status.is_terminal_success() {
            return Ok(None);
        }
        match &request.details {
            WorkflowDetails::Transfer(t) => {
                let mut mold = Self::locked_mold(tx, &request.mold_id)?;
                let from = mold.current_location_company_id();
                if from != t.from_company_id {
                    return Err(FlowError::StateConflict(format!("el molde {} ya no está en la empresa de origen {} (actual: {})",
                                                                request.mold_id,
                                                                t.from_company_id,
                                                                from)));
                }
                mold.relocate(t.to_company_id)?;
                tx.update_mold(&mold)?;
                let mirrors = tx.relocate_plant_mirrors(&request.mold_id, &t.to_company_id)?;
                info!("molde {} reubicado {} -> {} ({} copias de planta)",
                      request.mold_id, from, t.to_company_id, mirrors);
                Ok(Some(SideEffect::MoldRelocated { mold_id: request.mold_id,
                                                    from_company_id: from,
                                                    to_company_id: t.to_company_id,
                                                    mirrors_updated: mirrors }))
            }
            WorkflowDetails::Scrapping(_) => {
                let mut mold = Self::locked_mold(tx, &request.mold_id)?;
                mold.scrap()?;
                tx.update_mold(&mold)?;
                info!("molde {} marcado como desechado", request.mold_id);
                Ok(Some(SideEffect::MoldScrapped { mold_id: request.mold_id }))
            }
            WorkflowDetails::Repair(_) => Ok(None),
        }
    }

    fn locked_mold(tx: &mut dyn WorkflowTx, mold_id: &Uuid) -> Result<mold_domain::Mold> {
        tx.lock_mold(mold_id)?
          .ok_or_else(|| FlowError::NotFound(format!("molde {}", mold_id)))
    }
}

mod errors;
mod mold;
mod mold_repository;
mod plant_mold;

pub use errors::DomainError;
pub use mold::{Mold, MoldStatus};
pub use mold_repository::{MoldRegistry, MoldRepository};
pub use plant_mold::PlantMold;

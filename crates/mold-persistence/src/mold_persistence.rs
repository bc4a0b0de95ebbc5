// Archivo: mold_persistence.rs
// Propósito: `MoldRepository` sobre Diesel para el manejador transaccional
// (`DieselTx`). El registro maestro y las copias de planta se escriben con la
// misma conexión que el workflow que provoca el cambio.
use crate::flow_persistence::DieselTx;
use crate::schema;
use crate::schema::molds::dsl as molds_dsl;
use crate::schema::plant_molds::dsl as pm_dsl;
use crate::{from_millis, parse_uuid};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use mold_domain::{DomainError, Mold, MoldRepository, MoldStatus, PlantMold};
use uuid::Uuid;

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::molds)]
pub(crate) struct MoldRow {
    pub id: String,
    pub mold_code: String,
    pub status: String,
    pub current_location_company_id: String,
    pub current_shots: i64,
    pub updated_at_ts: i64,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::plant_molds)]
pub(crate) struct PlantMoldRow {
    pub id: String,
    pub mold_id: String,
    pub company_id: String,
    pub updated_at_ts: i64,
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, DomainError> {
    res.map_err(|e| DomainError::ExternalError(format!("db: {}", e)))
}

impl MoldRow {
    fn from_mold(m: &Mold) -> Self {
        MoldRow { id: m.id().to_string(),
                  mold_code: m.mold_code().to_string(),
                  status: m.status().as_str().to_string(),
                  current_location_company_id: m.current_location_company_id().to_string(),
                  current_shots: m.current_shots(),
                  updated_at_ts: m.updated_at().timestamp_millis() }
    }

    fn into_mold(self) -> Result<Mold, DomainError> {
        let status: MoldStatus = self.status.parse()?;
        Mold::from_parts(parse_uuid(&self.id).map_err(DomainError::ExternalError)?,
                         &self.mold_code,
                         status,
                         parse_uuid(&self.current_location_company_id).map_err(DomainError::ExternalError)?,
                         self.current_shots,
                         from_millis(self.updated_at_ts).map_err(DomainError::ExternalError)?)
    }
}

impl DieselTx<'_> {
    fn load_mold(&mut self, id: &Uuid, for_update: bool) -> Result<Option<Mold>, DomainError> {
        let query = molds_dsl::molds.filter(molds_dsl::id.eq(id.to_string()));
        #[cfg(feature = "pg")]
        let row = if for_update {
            map_db_err(query.for_update().first::<MoldRow>(self.conn).optional())?
        } else {
            map_db_err(query.first::<MoldRow>(self.conn).optional())?
        };
        // SQLite: la transacción ya se abrió con BEGIN IMMEDIATE.
        #[cfg(not(feature = "pg"))]
        let row = {
            let _ = for_update;
            map_db_err(query.first::<MoldRow>(self.conn).optional())?
        };
        row.map(MoldRow::into_mold).transpose()
    }
}

impl MoldRepository for DieselTx<'_> {
    fn insert_mold(&mut self, mold: &Mold) -> Result<(), DomainError> {
        if self.load_mold(&mold.id(), false)?.is_some() {
            return Err(DomainError::ValidationError(format!("El molde {} ya existe", mold.id())));
        }
        map_db_err(diesel::insert_into(molds_dsl::molds).values(&MoldRow::from_mold(mold)).execute(self.conn))?;
        Ok(())
    }

    fn get_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError> {
        self.load_mold(id, false)
    }

    fn lock_mold(&mut self, id: &Uuid) -> Result<Option<Mold>, DomainError> {
        self.load_mold(id, true)
    }

    fn update_mold(&mut self, mold: &Mold) -> Result<(), DomainError> {
        let row = MoldRow::from_mold(mold);
        let n = map_db_err(diesel::update(molds_dsl::molds.filter(molds_dsl::id.eq(&row.id)))
                .set((molds_dsl::status.eq(&row.status),
                      molds_dsl::current_location_company_id.eq(&row.current_location_company_id),
                      molds_dsl::current_shots.eq(row.current_shots),
                      molds_dsl::updated_at_ts.eq(row.updated_at_ts)))
                .execute(self.conn))?;
        if n == 0 {
            return Err(DomainError::NotFound(format!("molde {}", mold.id())));
        }
        Ok(())
    }

    fn insert_plant_mirror(&mut self, mirror: &PlantMold) -> Result<(), DomainError> {
        if self.load_mold(&mirror.mold_id, false)?.is_none() {
            return Err(DomainError::NotFound(format!("molde {}", mirror.mold_id)));
        }
        let row = PlantMoldRow { id: Uuid::new_v4().to_string(),
                                 mold_id: mirror.mold_id.to_string(),
                                 company_id: mirror.company_id.to_string(),
                                 updated_at_ts: mirror.updated_at.timestamp_millis() };
        map_db_err(diesel::insert_into(pm_dsl::plant_molds).values(&row).execute(self.conn))?;
        Ok(())
    }

    fn plant_mirrors(&mut self, mold_id: &Uuid) -> Result<Vec<PlantMold>, DomainError> {
        let rows = map_db_err(pm_dsl::plant_molds.filter(pm_dsl::mold_id.eq(mold_id.to_string()))
                                                 .order(pm_dsl::updated_at_ts.asc())
                                                 .load::<PlantMoldRow>(self.conn))?;
        rows.into_iter()
            .map(|r| {
                Ok(PlantMold { mold_id: parse_uuid(&r.mold_id).map_err(DomainError::ExternalError)?,
                               company_id: parse_uuid(&r.company_id).map_err(DomainError::ExternalError)?,
                               updated_at: from_millis(r.updated_at_ts).map_err(DomainError::ExternalError)? })
            })
            .collect()
    }

    fn relocate_plant_mirrors(&mut self, mold_id: &Uuid, company_id: &Uuid) -> Result<usize, DomainError> {
        map_db_err(diesel::update(pm_dsl::plant_molds.filter(pm_dsl::mold_id.eq(mold_id.to_string())))
                   .set((pm_dsl::company_id.eq(company_id.to_string()),
                         pm_dsl::updated_at_ts.eq(Utc::now().timestamp_millis())))
                   .execute(self.conn))
    }
}

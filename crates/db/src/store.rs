//! [`VisitStore`] over PostgreSQL.
//!
//! Multi-row writes open one transaction, run every statement on `&mut *tx`
//! and commit. An early return drops the transaction, which rolls it back.

use async_trait::async_trait;
use axs_core::domain::{Evidence, NewEvidence, NewUsuario, NewVisit, Usuario, Visit};
use axs_core::error::CoreError;
use axs_core::store::{StoreError, VisitStore};
use axs_core::types::Timestamp;

use crate::repositories::{EvidenciaRepo, UsuarioRepo, VisitaRepo};
use crate::{classify, DbPool};

#[derive(Clone)]
pub struct PgVisitStore {
    pool: DbPool,
}

impl PgVisitStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn decode<R, T>(row: R) -> Result<T, StoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    T::try_from(row).map_err(|e| StoreError::Backend(e.to_string()))
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(decode).collect()
}

fn decode_opt<R, T>(row: Option<R>) -> Result<Option<T>, StoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    row.map(decode).transpose()
}

#[async_trait]
impl VisitStore for PgVisitStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(classify)
    }

    async fn find_usuario(&self, usuario_id: &str) -> Result<Option<Usuario>, StoreError> {
        let row = UsuarioRepo::find_by_usuario_id(&self.pool, usuario_id)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn find_usuario_by_correo(&self, correo: &str) -> Result<Option<Usuario>, StoreError> {
        let row = UsuarioRepo::find_by_correo(&self.pool, correo)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn create_usuario(&self, input: &NewUsuario) -> Result<Usuario, StoreError> {
        let row = UsuarioRepo::create(&self.pool, input)
            .await
            .map_err(classify)?;
        decode(row)
    }

    async fn list_usuarios(
        &self,
        condominio_id: Option<&str>,
    ) -> Result<Vec<Usuario>, StoreError> {
        let rows = UsuarioRepo::list(&self.pool, condominio_id)
            .await
            .map_err(classify)?;
        decode_all(rows)
    }

    async fn create_visit(
        &self,
        visit: &NewVisit,
        metadata: Option<&NewEvidence>,
    ) -> Result<Visit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let row = VisitaRepo::create(&mut *tx, visit).await.map_err(classify)?;
        if let Some(evidence) = metadata {
            EvidenciaRepo::create(&mut *tx, evidence)
                .await
                .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;
        decode(row)
    }

    async fn find_visit(&self, visita_id: &str) -> Result<Option<Visit>, StoreError> {
        let row = VisitaRepo::find_by_visita_id(&self.pool, visita_id)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn replace_credential(
        &self,
        visita_id: &str,
        token: &str,
        expiry: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let row = VisitaRepo::replace_credential(&self.pool, visita_id, token, expiry)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn consume_credential(
        &self,
        visita_id: &str,
        token: &str,
        now: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let row = VisitaRepo::consume_credential(&self.pool, visita_id, token, now)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn record_exit(
        &self,
        visita_id: &str,
        now: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let row = VisitaRepo::record_exit(&self.pool, visita_id, now)
            .await
            .map_err(classify)?;
        decode_opt(row)
    }

    async fn list_visits(
        &self,
        condominio_id: &str,
        casa_unidad: Option<&str>,
    ) -> Result<Vec<Visit>, StoreError> {
        let rows = VisitaRepo::list(&self.pool, condominio_id, casa_unidad)
            .await
            .map_err(classify)?;
        decode_all(rows)
    }

    async fn append_evidence(&self, rows: &[NewEvidence]) -> Result<Vec<Evidence>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let created = EvidenciaRepo::create(&mut *tx, row)
                .await
                .map_err(classify)?;
            inserted.push(created);
        }

        tx.commit().await.map_err(classify)?;
        decode_all(inserted)
    }

    async fn list_evidence(&self, visita_id: &str) -> Result<Vec<Evidence>, StoreError> {
        let rows = EvidenciaRepo::list_for_visita(&self.pool, visita_id)
            .await
            .map_err(classify)?;
        decode_all(rows)
    }
}

//! Repository for the `visitas` table.
//!
//! State transitions are conditional updates: the `WHERE` clause carries the
//! expected current state (and token), so a row that moved on in between
//! yields `None` instead of being overwritten.

use axs_core::domain::{NewVisit, VisitState};
use axs_core::types::Timestamp;
use sqlx::PgExecutor;

use crate::models::VisitaRow;

const COLUMNS: &str = "id, visita_id, condominio_id, casa_unidad, nombre_visitante, tipo_visita, \
                       vigencia, qr_token, qr_vigencia, estado, entrada_registrada_en, \
                       salida_registrada_en, created_at, updated_at";

pub struct VisitaRepo;

impl VisitaRepo {
    /// Insert a new visit in the `pending` state.
    pub async fn create<'e, E>(executor: E, input: &NewVisit) -> Result<VisitaRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO visitas (visita_id, condominio_id, casa_unidad, nombre_visitante,
                                  tipo_visita, vigencia, qr_token, qr_vigencia, estado)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(&input.visita_id)
            .bind(&input.condominio_id)
            .bind(&input.casa_unidad)
            .bind(&input.nombre_visitante)
            .bind(&input.tipo_visita)
            .bind(input.vigencia)
            .bind(&input.qr_token)
            .bind(input.qr_vigencia)
            .bind(VisitState::Pending.as_str())
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_visita_id<'e, E>(
        executor: E,
        visita_id: &str,
    ) -> Result<Option<VisitaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM visitas WHERE visita_id = $1");
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(visita_id)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite the credential of a `pending` visit.
    pub async fn replace_credential<'e, E>(
        executor: E,
        visita_id: &str,
        token: &str,
        expiry: Timestamp,
    ) -> Result<Option<VisitaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE visitas SET qr_token = $2, qr_vigencia = $3, updated_at = NOW()
             WHERE visita_id = $1 AND estado = $4
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(visita_id)
            .bind(token)
            .bind(expiry)
            .bind(VisitState::Pending.as_str())
            .fetch_optional(executor)
            .await
    }

    /// `pending -> entrada_registrada`, only if the token still matches and
    /// has not expired at `now`.
    pub async fn consume_credential<'e, E>(
        executor: E,
        visita_id: &str,
        token: &str,
        now: Timestamp,
    ) -> Result<Option<VisitaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE visitas SET estado = $4, entrada_registrada_en = $3, updated_at = NOW()
             WHERE visita_id = $1 AND qr_token = $2 AND qr_vigencia > $3 AND estado = $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(visita_id)
            .bind(token)
            .bind(now)
            .bind(VisitState::EntradaRegistrada.as_str())
            .bind(VisitState::Pending.as_str())
            .fetch_optional(executor)
            .await
    }

    /// `entrada_registrada -> salida_registrada`.
    pub async fn record_exit<'e, E>(
        executor: E,
        visita_id: &str,
        now: Timestamp,
    ) -> Result<Option<VisitaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE visitas SET estado = $3, salida_registrada_en = $2, updated_at = NOW()
             WHERE visita_id = $1 AND estado = $4
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(visita_id)
            .bind(now)
            .bind(VisitState::SalidaRegistrada.as_str())
            .bind(VisitState::EntradaRegistrada.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Visits of a condominium (optionally one unit), latest `vigencia` first.
    pub async fn list<'e, E>(
        executor: E,
        condominio_id: &str,
        casa_unidad: Option<&str>,
    ) -> Result<Vec<VisitaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM visitas
             WHERE condominio_id = $1 AND ($2::TEXT IS NULL OR casa_unidad = $2)
             ORDER BY vigencia DESC, created_at DESC"
        );
        sqlx::query_as::<_, VisitaRow>(&query)
            .bind(condominio_id)
            .bind(casa_unidad)
            .fetch_all(executor)
            .await
    }
}

//! Repository for the append-only `evidencias` table. There is no update or
//! delete.

use axs_core::domain::NewEvidence;
use sqlx::PgExecutor;

use crate::models::EvidenciaRow;

const COLUMNS: &str = "id, evidencia_id, visita_id, categoria, sub_tipo, archivo_url, \
                       hash_sha256, guardia_id, metadata_json, created_at";

pub struct EvidenciaRepo;

impl EvidenciaRepo {
    pub async fn create<'e, E>(executor: E, input: &NewEvidence) -> Result<EvidenciaRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO evidencias (evidencia_id, visita_id, categoria, sub_tipo, archivo_url,
                                     hash_sha256, guardia_id, metadata_json)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EvidenciaRow>(&query)
            .bind(&input.evidencia_id)
            .bind(&input.visita_id)
            .bind(input.categoria.as_str())
            .bind(&input.sub_tipo)
            .bind(&input.archivo_url)
            .bind(&input.hash_sha256)
            .bind(&input.guardia_id)
            .bind(&input.metadata_json)
            .fetch_one(executor)
            .await
    }

    /// Evidence for a visit in insertion order.
    pub async fn list_for_visita<'e, E>(
        executor: E,
        visita_id: &str,
    ) -> Result<Vec<EvidenciaRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM evidencias WHERE visita_id = $1 ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, EvidenciaRow>(&query)
            .bind(visita_id)
            .fetch_all(executor)
            .await
    }
}

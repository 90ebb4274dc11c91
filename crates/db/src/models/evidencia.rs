use axs_core::domain::Evidence;
use axs_core::error::CoreError;
use axs_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// Full row from the `evidencias` table.
#[derive(Debug, Clone, FromRow)]
pub struct EvidenciaRow {
    pub id: DbId,
    pub evidencia_id: String,
    pub visita_id: String,
    pub categoria: String,
    pub sub_tipo: String,
    pub archivo_url: String,
    pub hash_sha256: String,
    pub guardia_id: Option<String>,
    pub metadata_json: serde_json::Value,
    pub created_at: Timestamp,
}

impl TryFrom<EvidenciaRow> for Evidence {
    type Error = CoreError;

    fn try_from(row: EvidenciaRow) -> Result<Self, Self::Error> {
        Ok(Evidence {
            categoria: row.categoria.parse()?,
            evidencia_id: row.evidencia_id,
            visita_id: row.visita_id,
            sub_tipo: row.sub_tipo,
            archivo_url: row.archivo_url,
            hash_sha256: row.hash_sha256,
            guardia_id: row.guardia_id,
            metadata_json: row.metadata_json,
            created_at: row.created_at,
        })
    }
}

use axs_core::domain::Visit;
use axs_core::error::CoreError;
use axs_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// Full row from the `visitas` table.
#[derive(Debug, Clone, FromRow)]
pub struct VisitaRow {
    pub id: DbId,
    pub visita_id: String,
    pub condominio_id: String,
    pub casa_unidad: Option<String>,
    pub nombre_visitante: String,
    pub tipo_visita: String,
    pub vigencia: Timestamp,
    pub qr_token: Option<String>,
    pub qr_vigencia: Option<Timestamp>,
    pub estado: String,
    pub entrada_registrada_en: Option<Timestamp>,
    pub salida_registrada_en: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<VisitaRow> for Visit {
    type Error = CoreError;

    fn try_from(row: VisitaRow) -> Result<Self, Self::Error> {
        Ok(Visit {
            estado: row.estado.parse()?,
            visita_id: row.visita_id,
            condominio_id: row.condominio_id,
            casa_unidad: row.casa_unidad,
            nombre_visitante: row.nombre_visitante,
            tipo_visita: row.tipo_visita,
            vigencia: row.vigencia,
            qr_token: row.qr_token,
            qr_vigencia: row.qr_vigencia,
            entrada_registrada_en: row.entrada_registrada_en,
            salida_registrada_en: row.salida_registrada_en,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use axs_core::domain::VisitState;

    use super::*;

    #[test]
    fn maps_state_wire_values() {
        let now = chrono::Utc::now();
        let row = VisitaRow {
            id: 7,
            visita_id: "VIS-1".into(),
            condominio_id: "C1".into(),
            casa_unidad: Some("U1".into()),
            nombre_visitante: "Juan Perez".into(),
            tipo_visita: "visita_personal".into(),
            vigencia: now,
            qr_token: Some("tok".into()),
            qr_vigencia: Some(now),
            estado: "entrada_registrada".into(),
            entrada_registrada_en: Some(now),
            salida_registrada_en: None,
            created_at: now,
            updated_at: now,
        };
        let visit = Visit::try_from(row.clone()).unwrap();
        assert_eq!(visit.estado, VisitState::EntradaRegistrada);
        assert_eq!(visit.visita_id, "VIS-1");

        let bad = VisitaRow {
            estado: "archived".into(),
            ..row
        };
        assert!(Visit::try_from(bad).is_err());
    }
}

use axs_core::domain::Usuario;
use axs_core::error::CoreError;
use axs_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// Full row from the `usuarios` table.
///
/// Contains the password hash. Converts into [`Usuario`], which skips the
/// hash on serialization.
#[derive(Debug, Clone, FromRow)]
pub struct UsuarioRow {
    pub id: DbId,
    pub usuario_id: String,
    pub condominio_id: Option<String>,
    pub casa_unidad: Option<String>,
    pub rol: String,
    pub nombre: String,
    pub correo: String,
    pub password_hash: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<UsuarioRow> for Usuario {
    type Error = CoreError;

    fn try_from(row: UsuarioRow) -> Result<Self, Self::Error> {
        Ok(Usuario {
            rol: row.rol.parse()?,
            usuario_id: row.usuario_id,
            condominio_id: row.condominio_id,
            casa_unidad: row.casa_unidad,
            nombre: row.nombre,
            correo: row.correo,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

//! Repository for the `usuarios` table.

use axs_core::domain::NewUsuario;
use sqlx::PgExecutor;

use crate::models::UsuarioRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, usuario_id, condominio_id, casa_unidad, rol, nombre, correo, \
                       password_hash, created_at, updated_at";

pub struct UsuarioRepo;

impl UsuarioRepo {
    /// Insert a new usuario, returning the created row.
    pub async fn create<'e, E>(executor: E, input: &NewUsuario) -> Result<UsuarioRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO usuarios (usuario_id, condominio_id, casa_unidad, rol, nombre, correo, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UsuarioRow>(&query)
            .bind(&input.usuario_id)
            .bind(&input.condominio_id)
            .bind(&input.casa_unidad)
            .bind(input.rol.as_str())
            .bind(&input.nombre)
            .bind(&input.correo)
            .bind(&input.password_hash)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_usuario_id<'e, E>(
        executor: E,
        usuario_id: &str,
    ) -> Result<Option<UsuarioRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM usuarios WHERE usuario_id = $1");
        sqlx::query_as::<_, UsuarioRow>(&query)
            .bind(usuario_id)
            .fetch_optional(executor)
            .await
    }

    /// Find by email. Emails are stored lower-cased.
    pub async fn find_by_correo<'e, E>(
        executor: E,
        correo: &str,
    ) -> Result<Option<UsuarioRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM usuarios WHERE correo = $1");
        sqlx::query_as::<_, UsuarioRow>(&query)
            .bind(correo)
            .fetch_optional(executor)
            .await
    }

    /// List usuarios, newest first, optionally restricted to one condominium.
    pub async fn list<'e, E>(
        executor: E,
        condominio_id: Option<&str>,
    ) -> Result<Vec<UsuarioRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM usuarios
             WHERE ($1::TEXT IS NULL OR condominio_id = $1)
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, UsuarioRow>(&query)
            .bind(condominio_id)
            .fetch_all(executor)
            .await
    }
}

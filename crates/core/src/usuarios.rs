//! User directory: principal resolution and account provisioning.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{new_usuario_id, NewUsuario, Usuario};
use crate::error::CoreError;
use crate::roles::{authorize, Role};
use crate::store::{bounded, VisitStore};

/// Account creation request. The password is hashed by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionUsuario {
    pub nombre: String,
    pub correo: String,
    pub rol: Role,
    #[serde(default)]
    pub condominio_id: Option<String>,
    #[serde(default)]
    pub casa_unidad: Option<String>,
}

pub struct UserDirectory {
    store: Arc<dyn VisitStore>,
    timeout: Duration,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn VisitStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Resolve an authenticated subject to its current record.
    ///
    /// An unknown id is `Unauthorized`: the token outlived the account.
    pub async fn resolve(&self, usuario_id: &str) -> Result<Usuario, CoreError> {
        bounded(self.timeout, self.store.find_usuario(usuario_id))
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Unknown principal".into()))
    }

    pub async fn find_by_correo(&self, correo: &str) -> Result<Option<Usuario>, CoreError> {
        bounded(
            self.timeout,
            self.store.find_usuario_by_correo(&normalize_correo(correo)),
        )
        .await
    }

    /// Create an account.
    ///
    /// `MSP_ADMIN` may create any role anywhere. `ADMIN_CONDOMINIO` may only
    /// create guards and residents inside its own condominium.
    pub async fn provision(
        &self,
        principal: &Usuario,
        input: ProvisionUsuario,
        password_hash: String,
    ) -> Result<Usuario, CoreError> {
        authorize(principal, &[Role::MspAdmin, Role::AdminCondominio])?;

        let condominio_id = clean(input.condominio_id);
        let condominio_id = if principal.rol == Role::AdminCondominio {
            if !input.rol.is_one_of(&[Role::Guardia, Role::Residente]) {
                return Err(CoreError::Forbidden(format!(
                    "ADMIN_CONDOMINIO cannot create {} accounts",
                    input.rol
                )));
            }
            let own = principal
                .condominio_id
                .clone()
                .ok_or_else(|| CoreError::Forbidden("Usuario sin condominio asignado".into()))?;
            if condominio_id.as_deref().is_some_and(|c| c != own) {
                return Err(CoreError::Forbidden(
                    "Cannot create accounts for another condominium".into(),
                ));
            }
            Some(own)
        } else {
            condominio_id
        };

        let new_usuario = NewUsuario {
            usuario_id: new_usuario_id(),
            condominio_id,
            casa_unidad: clean(input.casa_unidad),
            rol: input.rol,
            nombre: input.nombre.trim().to_string(),
            correo: normalize_correo(&input.correo),
            password_hash,
        };
        validate_assignment(&new_usuario)?;

        let created = self.insert(&new_usuario).await?;
        tracing::info!(
            usuario_id = %created.usuario_id,
            rol = %created.rol,
            created_by = %principal.usuario_id,
            "Usuario created"
        );
        Ok(created)
    }

    /// `MSP_ADMIN` sees every account; `ADMIN_CONDOMINIO` its own complex.
    pub async fn list(&self, principal: &Usuario) -> Result<Vec<Usuario>, CoreError> {
        authorize(principal, &[Role::MspAdmin, Role::AdminCondominio])?;
        let scope = match principal.rol {
            Role::MspAdmin => None,
            _ => Some(
                principal
                    .condominio_id
                    .as_deref()
                    .ok_or_else(|| CoreError::Forbidden("Usuario sin condominio asignado".into()))?,
            ),
        };
        bounded(self.timeout, self.store.list_usuarios(scope)).await
    }

    /// Create the first platform administrator if no account uses `correo`.
    ///
    /// Returns `None` when the account already exists.
    pub async fn bootstrap_msp_admin(
        &self,
        nombre: &str,
        correo: &str,
        password_hash: String,
    ) -> Result<Option<Usuario>, CoreError> {
        if self.find_by_correo(correo).await?.is_some() {
            return Ok(None);
        }
        let admin = NewUsuario {
            usuario_id: new_usuario_id(),
            condominio_id: None,
            casa_unidad: None,
            rol: Role::MspAdmin,
            nombre: nombre.trim().to_string(),
            correo: normalize_correo(correo),
            password_hash,
        };
        validate_assignment(&admin)?;
        let created = self.insert(&admin).await?;
        tracing::info!(usuario_id = %created.usuario_id, "Bootstrap MSP_ADMIN created");
        Ok(Some(created))
    }

    async fn insert(&self, input: &NewUsuario) -> Result<Usuario, CoreError> {
        if self.find_by_correo(&input.correo).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "correo {} is already registered",
                input.correo
            )));
        }
        bounded(self.timeout, self.store.create_usuario(input)).await
    }
}

fn normalize_correo(correo: &str) -> String {
    correo.trim().to_lowercase()
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_assignment(u: &NewUsuario) -> Result<(), CoreError> {
    if u.nombre.is_empty() {
        return Err(CoreError::Validation("nombre must not be empty".into()));
    }
    if !u.correo.contains('@') || u.correo.starts_with('@') || u.correo.ends_with('@') {
        return Err(CoreError::Validation("correo is not a valid address".into()));
    }
    if u.password_hash.is_empty() {
        return Err(CoreError::Validation("password must not be empty".into()));
    }
    match u.rol {
        Role::MspAdmin => {}
        Role::AdminCondominio | Role::Guardia => {
            if u.condominio_id.is_none() {
                return Err(CoreError::Validation(format!(
                    "{} requires condominio_id",
                    u.rol
                )));
            }
        }
        Role::Residente => {
            if u.condominio_id.is_none() || u.casa_unidad.is_none() {
                return Err(CoreError::Validation(
                    "RESIDENTE requires condominio_id and casa_unidad".into(),
                ));
            }
        }
    }
    if u.rol != Role::Residente && u.casa_unidad.is_some() {
        return Err(CoreError::Validation(
            "casa_unidad is only valid for RESIDENTE".into(),
        ));
    }
    Ok(())
}

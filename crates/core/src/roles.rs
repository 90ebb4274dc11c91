//! Closed role set and the role gate.
//!
//! Role names must match the `CHECK` constraint on `usuarios.rol`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Usuario;
use crate::error::CoreError;

pub const ROLE_MSP_ADMIN: &str = "MSP_ADMIN";
pub const ROLE_ADMIN_CONDOMINIO: &str = "ADMIN_CONDOMINIO";
pub const ROLE_GUARDIA: &str = "GUARDIA";
pub const ROLE_RESIDENTE: &str = "RESIDENTE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    MspAdmin,
    AdminCondominio,
    Guardia,
    Residente,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::MspAdmin,
        Role::AdminCondominio,
        Role::Guardia,
        Role::Residente,
    ];

    /// Database / wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MspAdmin => ROLE_MSP_ADMIN,
            Self::AdminCondominio => ROLE_ADMIN_CONDOMINIO,
            Self::Guardia => ROLE_GUARDIA,
            Self::Residente => ROLE_RESIDENTE,
        }
    }

    pub fn is_one_of(self, allowed: &[Role]) -> bool {
        allowed.contains(&self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_MSP_ADMIN => Ok(Self::MspAdmin),
            ROLE_ADMIN_CONDOMINIO => Ok(Self::AdminCondominio),
            ROLE_GUARDIA => Ok(Self::Guardia),
            ROLE_RESIDENTE => Ok(Self::Residente),
            other => Err(CoreError::Validation(format!(
                "Unknown role '{other}'. Must be one of: {ROLE_MSP_ADMIN}, \
                 {ROLE_ADMIN_CONDOMINIO}, {ROLE_GUARDIA}, {ROLE_RESIDENTE}"
            ))),
        }
    }
}

/// Reject `principal` unless its role is in `allowed`.
///
/// Pure predicate: it does not look at condominium or unit scoping, which
/// each operation checks separately once the target entity is loaded.
pub fn authorize(principal: &Usuario, allowed: &[Role]) -> Result<(), CoreError> {
    if principal.rol.is_one_of(allowed) {
        Ok(())
    } else {
        tracing::debug!(
            usuario_id = %principal.usuario_id,
            rol = %principal.rol,
            "Role gate rejected principal"
        );
        Err(CoreError::Forbidden("Acceso denegado".into()))
    }
}

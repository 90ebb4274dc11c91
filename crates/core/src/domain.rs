//! Entities shared by the engine, the stores and the HTTP boundary.
//!
//! External identifiers are opaque strings; the Postgres row keys never
//! leave the db crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::Role;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Prefix of every visit identifier.
pub const VISITA_ID_PREFIX: &str = "VIS-";

/// Prefix of every user identifier.
pub const USUARIO_ID_PREFIX: &str = "USR-";

/// Mint a fresh visit identifier (`VIS-` + 128 random bits in hex).
pub fn new_visita_id() -> String {
    format!("{VISITA_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

pub fn new_usuario_id() -> String {
    format!("{USUARIO_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

pub fn new_evidencia_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Visit
// ---------------------------------------------------------------------------

/// Lifecycle state of a visit. Transitions are strictly
/// `Pending -> EntradaRegistrada -> SalidaRegistrada`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitState {
    Pending,
    EntradaRegistrada,
    SalidaRegistrada,
}

impl VisitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::EntradaRegistrada => "entrada_registrada",
            Self::SalidaRegistrada => "salida_registrada",
        }
    }

    /// The only state this one may advance to, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::EntradaRegistrada),
            Self::EntradaRegistrada => Some(Self::SalidaRegistrada),
            Self::SalidaRegistrada => None,
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "entrada_registrada" => Ok(Self::EntradaRegistrada),
            "salida_registrada" => Ok(Self::SalidaRegistrada),
            other => Err(CoreError::Validation(format!("Unknown visit state '{other}'"))),
        }
    }
}

/// One authorized admission window for a named visitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    pub visita_id: String,
    pub condominio_id: String,
    /// `None` for walk-ins created by an administrator without a unit.
    pub casa_unidad: Option<String>,
    pub nombre_visitante: String,
    pub tipo_visita: String,
    /// End of the validity window requested at creation.
    pub vigencia: Timestamp,
    /// Single-use entry secret. Only a credential response carries it.
    #[serde(skip_serializing)]
    pub qr_token: Option<String>,
    pub qr_vigencia: Option<Timestamp>,
    pub estado: VisitState,
    pub entrada_registrada_en: Option<Timestamp>,
    pub salida_registrada_en: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Insert payload for a visit. The store stamps `created_at`.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub visita_id: String,
    pub condominio_id: String,
    pub casa_unidad: Option<String>,
    pub nombre_visitante: String,
    pub tipo_visita: String,
    pub vigencia: Timestamp,
    pub qr_token: Option<String>,
    pub qr_vigencia: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Entrada,
    Salida,
    Preregistro,
}

impl EvidenceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entrada => "entrada",
            Self::Salida => "salida",
            Self::Preregistro => "preregistro",
        }
    }
}

impl fmt::Display for EvidenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entrada" => Ok(Self::Entrada),
            "salida" => Ok(Self::Salida),
            "preregistro" => Ok(Self::Preregistro),
            other => Err(CoreError::Validation(format!(
                "Unknown evidence category '{other}'"
            ))),
        }
    }
}

/// Immutable proof artifact attached to a visit transition.
///
/// `archivo_url` and `hash_sha256` are empty strings (never null) for
/// metadata-only records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub evidencia_id: String,
    pub visita_id: String,
    pub categoria: EvidenceCategory,
    pub sub_tipo: String,
    pub archivo_url: String,
    pub hash_sha256: String,
    pub guardia_id: Option<String>,
    pub metadata_json: serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub evidencia_id: String,
    pub visita_id: String,
    pub categoria: EvidenceCategory,
    pub sub_tipo: String,
    pub archivo_url: String,
    pub hash_sha256: String,
    pub guardia_id: Option<String>,
    pub metadata_json: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Usuario
// ---------------------------------------------------------------------------

/// A human principal.
///
/// Contains the password hash, which is skipped on serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Usuario {
    pub usuario_id: String,
    /// `None` only for `MSP_ADMIN`, which is not tied to a complex.
    pub condominio_id: Option<String>,
    /// Set for residents only.
    pub casa_unidad: Option<String>,
    pub rol: Role,
    pub nombre: String,
    pub correo: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: Timestamp,
}

impl Usuario {
    /// Whether this principal is assigned to `condominio_id`.
    pub fn belongs_to(&self, condominio_id: &str) -> bool {
        self.condominio_id.as_deref() == Some(condominio_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewUsuario {
    pub usuario_id: String,
    pub condominio_id: Option<String>,
    pub casa_unidad: Option<String>,
    pub rol: Role,
    pub nombre: String,
    pub correo: String,
    pub password_hash: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward_one_step() {
        use VisitState::*;
        assert!(Pending.can_transition_to(EntradaRegistrada));
        assert!(EntradaRegistrada.can_transition_to(SalidaRegistrada));
        assert!(!Pending.can_transition_to(SalidaRegistrada));
        assert!(!EntradaRegistrada.can_transition_to(Pending));
        assert!(!SalidaRegistrada.can_transition_to(Pending));
        assert_eq!(SalidaRegistrada.next(), None);
    }

    #[test]
    fn state_names_match_storage_values() {
        for state in [
            VisitState::Pending,
            VisitState::EntradaRegistrada,
            VisitState::SalidaRegistrada,
        ] {
            assert_eq!(state.as_str().parse::<VisitState>().unwrap(), state);
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                serde_json::Value::String(state.as_str().into())
            );
        }
        assert!("pendiente".parse::<VisitState>().is_err());
    }

    #[test]
    fn visit_ids_are_prefixed_and_unique() {
        let a = new_visita_id();
        let b = new_visita_id();
        assert!(a.starts_with(VISITA_ID_PREFIX));
        assert_eq!(a.len(), VISITA_ID_PREFIX.len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let mut user = test_support::usuario("R1", Role::Residente, Some("C1"), Some("U1"));
        user.password_hash = "$argon2id$secret".into();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["rol"], "RESIDENTE");
    }
}

//! Visit lifecycle engine.
//!
//! Owns the `pending -> entrada_registrada -> salida_registrada` state
//! machine. Every operation runs the role gate before touching storage, and
//! every write is a single [`VisitStore`] call so the store owns the
//! transaction boundary.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::AccessConfig;
use crate::credential::{self, IssuedCredential};
use crate::domain::{
    new_evidencia_id, new_visita_id, EvidenceCategory, NewEvidence, NewVisit, Usuario, Visit,
    VisitState,
};
use crate::error::CoreError;
use crate::roles::{authorize, Role};
use crate::store::{bounded, VisitStore};
use crate::types::{Clock, Timestamp};

/// Sub-type of the companion evidence row written by a pre-registration.
pub const PREREGISTRO_SUB_TIPO: &str = "preregistro_metadata";

const MAX_NAME_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Direct creation by a condominium administrator.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVisit {
    pub nombre_visitante: String,
    pub tipo_visita: String,
    pub vigencia: Timestamp,
    /// Defaults to the administrator's own condominium.
    #[serde(default)]
    pub condominio_id: Option<String>,
    /// Absent for walk-ins.
    #[serde(default)]
    pub casa_unidad: Option<String>,
}

/// Resident pre-registration. Unit and condominium come from the resident.
#[derive(Debug, Clone, Deserialize)]
pub struct PreregistroInput {
    pub nombre_visitante: String,
    /// Becomes the visit's `vigencia`.
    pub fecha_visita: Timestamp,
    pub tipo_visita: String,
    #[serde(default)]
    pub notas: Option<String>,
    #[serde(default)]
    pub placa: Option<String>,
    #[serde(default)]
    pub documento: Option<String>,
    /// Credential validity; clamped, defaults to the configured window.
    #[serde(default)]
    pub minutos_vigencia: Option<i64>,
}

/// A visit together with a freshly rendered credential image.
#[derive(Debug, Clone)]
pub struct CredentialGrant {
    pub visit: Visit,
    pub image_png: Vec<u8>,
    /// Minutes of validity the image carries (remaining, for a resend).
    pub minutes: i64,
    /// `true` when a new token was minted by this call.
    pub reissued: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct VisitLifecycle {
    store: Arc<dyn VisitStore>,
    clock: Arc<dyn Clock>,
    config: AccessConfig,
}

impl VisitLifecycle {
    pub fn new(store: Arc<dyn VisitStore>, clock: Arc<dyn Clock>, config: AccessConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        self.config.store_timeout
    }

    /// Requested validity, capped by the operator ceiling. Final clamping to
    /// `[1, 10080]` happens in the generator.
    fn credential_minutes(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.config.default_credential_minutes)
            .min(self.config.credential_ceiling())
    }

    async fn load(&self, visita_id: &str) -> Result<Visit, CoreError> {
        bounded(self.timeout(), self.store.find_visit(visita_id))
            .await?
            .ok_or_else(|| CoreError::not_found("Visita", visita_id))
    }

    // -- creation -----------------------------------------------------------

    /// Create a `pending` visit with no credential.
    pub async fn create_direct(
        &self,
        principal: &Usuario,
        input: CreateVisit,
    ) -> Result<Visit, CoreError> {
        authorize(principal, &[Role::AdminCondominio])?;
        let condominio_id = admin_condominio(principal, input.condominio_id.as_deref())?;
        let nombre_visitante = required_text("nombre_visitante", &input.nombre_visitante)?;
        let tipo_visita = required_text("tipo_visita", &input.tipo_visita)?;

        let new_visit = NewVisit {
            visita_id: new_visita_id(),
            condominio_id,
            casa_unidad: optional_text(input.casa_unidad),
            nombre_visitante,
            tipo_visita,
            vigencia: input.vigencia,
            qr_token: None,
            qr_vigencia: None,
        };

        let visit = bounded(self.timeout(), self.store.create_visit(&new_visit, None)).await?;
        tracing::info!(
            visita_id = %visit.visita_id,
            condominio_id = %visit.condominio_id,
            created_by = %principal.usuario_id,
            "Visit created by administrator"
        );
        Ok(visit)
    }

    /// Resident pre-registration.
    ///
    /// The visit row, its credential and (when any optional field is given)
    /// one `preregistro` evidence row are written in one atomic store call.
    pub async fn create_from_preregistro(
        &self,
        principal: &Usuario,
        input: PreregistroInput,
    ) -> Result<CredentialGrant, CoreError> {
        authorize(principal, &[Role::Residente])?;
        let (condominio_id, casa_unidad) = resident_scope(principal)?;
        let nombre_visitante = required_text("nombre_visitante", &input.nombre_visitante)?;
        let tipo_visita = required_text("tipo_visita", &input.tipo_visita)?;

        let visita_id = new_visita_id();
        let minutes = self.credential_minutes(input.minutos_vigencia);
        let issued = credential::issue(&visita_id, minutes, self.clock.now())?;
        let metadata = preregistro_metadata(&visita_id, principal, &input);

        let new_visit = NewVisit {
            visita_id,
            condominio_id,
            casa_unidad: Some(casa_unidad),
            nombre_visitante,
            tipo_visita,
            vigencia: input.fecha_visita,
            qr_token: Some(issued.token.clone()),
            qr_vigencia: Some(issued.expiry),
        };

        let visit = bounded(
            self.timeout(),
            self.store.create_visit(&new_visit, metadata.as_ref()),
        )
        .await?;

        tracing::info!(
            visita_id = %visit.visita_id,
            condominio_id = %visit.condominio_id,
            created_by = %principal.usuario_id,
            with_metadata = metadata.is_some(),
            "Visit pre-registered"
        );
        Ok(grant(visit, issued))
    }

    // -- credentials --------------------------------------------------------

    /// Mint a new token and expiry, replacing any previous ones.
    ///
    /// Only a `pending` visit can be (re)issued; the old token is dead from
    /// this point on, expired or not.
    pub async fn issue_credential(
        &self,
        principal: &Usuario,
        visita_id: &str,
        minutes: Option<i64>,
    ) -> Result<CredentialGrant, CoreError> {
        authorize(principal, &[Role::AdminCondominio, Role::Residente])?;
        let visit = self.load(visita_id.trim()).await?;
        ensure_manages(principal, &visit)?;
        self.mint(visit, self.credential_minutes(minutes)).await
    }

    /// Hand the resident their current credential.
    ///
    /// Mints only when the token is absent or expired; otherwise re-renders
    /// the stored token with its remaining window and leaves the stored
    /// expiry untouched.
    pub async fn resend_credential(
        &self,
        principal: &Usuario,
        visita_id: &str,
    ) -> Result<CredentialGrant, CoreError> {
        authorize(principal, &[Role::Residente])?;
        let visit = self.load(visita_id.trim()).await?;
        ensure_manages(principal, &visit)?;

        let now = self.clock.now();
        match (visit.qr_token.as_deref(), visit.qr_vigencia) {
            (Some(token), Some(expiry)) if expiry > now => {
                let image_png = credential::render_png(&visit.visita_id, token)?;
                Ok(CredentialGrant {
                    minutes: credential::remaining_minutes(expiry, now),
                    image_png,
                    reissued: false,
                    visit,
                })
            }
            _ => {
                let minutes = self.credential_minutes(None);
                self.mint(visit, minutes).await
            }
        }
    }

    async fn mint(&self, visit: Visit, minutes: i64) -> Result<CredentialGrant, CoreError> {
        if visit.estado != VisitState::Pending {
            return Err(CoreError::AlreadyConsumed);
        }
        let issued = credential::issue(&visit.visita_id, minutes, self.clock.now())?;

        // `None` means a scan consumed the visit since we loaded it.
        let updated = bounded(
            self.timeout(),
            self.store
                .replace_credential(&visit.visita_id, &issued.token, issued.expiry),
        )
        .await?
        .ok_or(CoreError::AlreadyConsumed)?;

        tracing::info!(
            visita_id = %updated.visita_id,
            minutes = issued.minutes,
            "Credential issued"
        );
        Ok(grant(updated, issued))
    }

    // -- gate transitions ---------------------------------------------------

    /// Validate a presented credential and admit the visitor.
    ///
    /// Checks run in a fixed order and the first failure wins: not found,
    /// token mismatch, expiry, already consumed. The transition itself is a
    /// compare-and-swap so two concurrent scans cannot both succeed.
    ///
    /// When the swap times out the row is read back: if it shows this scan's
    /// entry the visitor is admitted, otherwise the timeout is returned.
    pub async fn validate_credential(
        &self,
        principal: &Usuario,
        visita_id: &str,
        token: &str,
    ) -> Result<Visit, CoreError> {
        authorize(principal, &[Role::Guardia])?;
        let visita_id = visita_id.trim();
        let token = token.trim();

        let visit = self.load(visita_id).await?;
        ensure_same_condominio(principal, &visit)?;

        let now = self.clock.now();
        if let Err(denial) = check_presented_credential(&visit, token, now) {
            tracing::info!(
                visita_id,
                guardia_id = %principal.usuario_id,
                reason = %denial,
                "Credential rejected"
            );
            return Err(denial);
        }

        match bounded(
            self.timeout(),
            self.store.consume_credential(visita_id, token, now),
        )
        .await
        {
            Ok(Some(admitted)) => {
                tracing::info!(
                    visita_id,
                    guardia_id = %principal.usuario_id,
                    "Entry registered"
                );
                Ok(admitted)
            }
            Ok(None) => {
                // Lost the swap; classify against the row as it is now.
                let current = self.load(visita_id).await?;
                check_presented_credential(&current, token, now)?;
                Err(CoreError::Conflict(
                    "Visit changed during validation; retry".into(),
                ))
            }
            Err(CoreError::Transient(reason)) => {
                // The update may have committed before the reply was lost.
                let current = self.load(visita_id).await?;
                if admitted_by(&current, token, now) {
                    tracing::warn!(
                        visita_id,
                        guardia_id = %principal.usuario_id,
                        reason = %reason,
                        "Entry registered; storage reply arrived late"
                    );
                    return Ok(current);
                }
                Err(CoreError::Transient(reason))
            }
            Err(other) => Err(other),
        }
    }

    /// Record the visitor leaving. Requires a prior entry.
    pub async fn register_exit(
        &self,
        principal: &Usuario,
        visita_id: &str,
    ) -> Result<Visit, CoreError> {
        authorize(principal, &[Role::Guardia])?;
        let visita_id = visita_id.trim();
        let visit = self.load(visita_id).await?;
        ensure_same_condominio(principal, &visit)?;
        exit_allowed(visit.estado)?;

        let now = self.clock.now();
        match bounded(self.timeout(), self.store.record_exit(visita_id, now)).await? {
            Some(exited) => {
                tracing::info!(
                    visita_id,
                    guardia_id = %principal.usuario_id,
                    "Exit registered"
                );
                Ok(exited)
            }
            None => {
                let current = self.load(visita_id).await?;
                exit_allowed(current.estado)?;
                Err(CoreError::Conflict(
                    "Visit changed during exit registration; retry".into(),
                ))
            }
        }
    }

    // -- reads --------------------------------------------------------------

    /// Visits of the resident's own unit, most recent window first.
    pub async fn list_for_resident(&self, principal: &Usuario) -> Result<Vec<Visit>, CoreError> {
        authorize(principal, &[Role::Residente])?;
        let (condominio_id, casa_unidad) = resident_scope(principal)?;
        bounded(
            self.timeout(),
            self.store.list_visits(&condominio_id, Some(&casa_unidad)),
        )
        .await
    }

    /// Every visit of the caller's condominium, most recent window first.
    pub async fn list_for_condominium(
        &self,
        principal: &Usuario,
    ) -> Result<Vec<Visit>, CoreError> {
        authorize(principal, &[Role::AdminCondominio, Role::Guardia])?;
        let condominio_id = principal
            .condominio_id
            .as_deref()
            .ok_or_else(|| CoreError::Forbidden("Usuario sin condominio asignado".into()))?;
        bounded(self.timeout(), self.store.list_visits(condominio_id, None)).await
    }

    /// Single visit lookup.
    ///
    /// A resident outside the visit's condominium/unit gets `Forbidden`,
    /// not `NotFound`, even though that confirms the id exists.
    pub async fn get_visit(&self, principal: &Usuario, visita_id: &str) -> Result<Visit, CoreError> {
        authorize(principal, &Role::ALL)?;
        let visit = self.load(visita_id.trim()).await?;
        ensure_can_view(principal, &visit)?;
        Ok(visit)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Check a presented token against the stored visit, in denial order.
pub fn check_presented_credential(
    visit: &Visit,
    presented: &str,
    now: Timestamp,
) -> Result<(), CoreError> {
    match visit.qr_token.as_deref() {
        Some(stored) if credential::tokens_match(stored, presented) => {}
        _ => return Err(CoreError::InvalidCredential),
    }
    match visit.qr_vigencia {
        Some(expiry) if expiry > now => {}
        _ => return Err(CoreError::ExpiredCredential),
    }
    if visit.estado != VisitState::Pending {
        return Err(CoreError::AlreadyConsumed);
    }
    Ok(())
}

/// Whether `visit` shows the entry this very scan would have written.
fn admitted_by(visit: &Visit, presented: &str, now: Timestamp) -> bool {
    visit.estado == VisitState::EntradaRegistrada
        && visit.entrada_registrada_en == Some(now)
        && visit
            .qr_token
            .as_deref()
            .is_some_and(|stored| credential::tokens_match(stored, presented))
}

fn exit_allowed(state: VisitState) -> Result<(), CoreError> {
    match state {
        VisitState::EntradaRegistrada => Ok(()),
        VisitState::Pending => Err(CoreError::Conflict(
            "Cannot register exit before entry".into(),
        )),
        VisitState::SalidaRegistrada => Err(CoreError::AlreadyConsumed),
    }
}

/// Whether `principal` may read `visit`.
pub(crate) fn ensure_can_view(principal: &Usuario, visit: &Visit) -> Result<(), CoreError> {
    match principal.rol {
        Role::MspAdmin => Ok(()),
        Role::Residente => ensure_manages(principal, visit),
        Role::AdminCondominio | Role::Guardia => ensure_same_condominio(principal, visit),
    }
}

/// Residents manage their own unit's visits; administrators their
/// condominium's.
fn ensure_manages(principal: &Usuario, visit: &Visit) -> Result<(), CoreError> {
    let allowed = match principal.rol {
        Role::Residente => {
            principal.belongs_to(&visit.condominio_id)
                && principal.casa_unidad.is_some()
                && principal.casa_unidad == visit.casa_unidad
        }
        Role::AdminCondominio => principal.belongs_to(&visit.condominio_id),
        Role::MspAdmin | Role::Guardia => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden("No autorizado".into()))
    }
}

pub(crate) fn ensure_same_condominio(principal: &Usuario, visit: &Visit) -> Result<(), CoreError> {
    if principal.belongs_to(&visit.condominio_id) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "Visit belongs to another condominium".into(),
        ))
    }
}

fn resident_scope(principal: &Usuario) -> Result<(String, String), CoreError> {
    match (&principal.condominio_id, &principal.casa_unidad) {
        (Some(condo), Some(unit)) => Ok((condo.clone(), unit.clone())),
        _ => Err(CoreError::Forbidden(
            "Resident has no condominium/unit assignment".into(),
        )),
    }
}

fn admin_condominio(principal: &Usuario, requested: Option<&str>) -> Result<String, CoreError> {
    let own = principal
        .condominio_id
        .as_deref()
        .ok_or_else(|| CoreError::Forbidden("Usuario sin condominio asignado".into()))?;
    match requested.map(str::trim).filter(|c| !c.is_empty()) {
        Some(other) if other != own => Err(CoreError::Forbidden(
            "Cannot create visits for another condominium".into(),
        )),
        _ => Ok(own.to_string()),
    }
}

fn required_text(field: &str, value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Blank optional strings count as absent.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn preregistro_metadata(
    visita_id: &str,
    principal: &Usuario,
    input: &PreregistroInput,
) -> Option<NewEvidence> {
    let mut metadata = serde_json::Map::new();
    for (key, value) in [
        ("notas", &input.notas),
        ("placa", &input.placa),
        ("documento", &input.documento),
    ] {
        if let Some(v) = optional_text(value.clone()) {
            metadata.insert(key.into(), serde_json::Value::String(v));
        }
    }
    if metadata.is_empty() {
        return None;
    }
    metadata.insert(
        "created_by".into(),
        serde_json::Value::String(principal.usuario_id.clone()),
    );

    Some(NewEvidence {
        evidencia_id: new_evidencia_id(),
        visita_id: visita_id.to_string(),
        categoria: EvidenceCategory::Preregistro,
        sub_tipo: PREREGISTRO_SUB_TIPO.into(),
        archivo_url: String::new(),
        hash_sha256: String::new(),
        guardia_id: Some(principal.usuario_id.clone()),
        metadata_json: serde_json::Value::Object(metadata),
    })
}

fn grant(visit: Visit, issued: IssuedCredential) -> CredentialGrant {
    CredentialGrant {
        visit,
        image_png: issued.image_png,
        minutes: issued.minutes,
        reissued: true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    use super::*;
    use crate::domain::test_support::usuario;
    use crate::store::memory::MemoryStore;
    use crate::types::ManualClock;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        engine: VisitLifecycle,
        admin: Usuario,
        guard: Usuario,
        resident: Usuario,
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 12, 1, 10, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let engine = VisitLifecycle::new(store.clone(), clock.clone(), AccessConfig::default());
        Fixture {
            store,
            clock,
            engine,
            admin: usuario("A1", Role::AdminCondominio, Some("C1"), None),
            guard: usuario("G1", Role::Guardia, Some("C1"), None),
            resident: usuario("R1", Role::Residente, Some("C1"), Some("U1")),
        }
    }

    fn juan() -> PreregistroInput {
        PreregistroInput {
            nombre_visitante: "Juan Perez".into(),
            fecha_visita: t0() + ChronoDuration::hours(2),
            tipo_visita: "visita_personal".into(),
            notas: None,
            placa: None,
            documento: None,
            minutos_vigencia: None,
        }
    }

    async fn preregister(fx: &Fixture) -> Visit {
        fx.engine
            .create_from_preregistro(&fx.resident, juan())
            .await
            .unwrap()
            .visit
    }

    fn token_of(visit: &Visit) -> String {
        visit.qr_token.clone().unwrap()
    }

    #[tokio::test]
    async fn preregistration_creates_pending_visit_with_credential_and_no_evidence() {
        let fx = fixture();
        let grant = fx
            .engine
            .create_from_preregistro(&fx.resident, juan())
            .await
            .unwrap();

        let visit = &grant.visit;
        assert_eq!(visit.estado, VisitState::Pending);
        assert_eq!(visit.condominio_id, "C1");
        assert_eq!(visit.casa_unidad.as_deref(), Some("U1"));
        assert_eq!(visit.nombre_visitante, "Juan Perez");
        assert!(visit.qr_token.is_some());
        assert_eq!(visit.qr_vigencia, Some(t0() + ChronoDuration::minutes(60)));
        assert!(grant.reissued);
        assert!(!grant.image_png.is_empty());
        assert_eq!(fx.store.evidence_count(), 0);
    }

    #[tokio::test]
    async fn preregistration_with_notes_writes_one_metadata_evidence() {
        let fx = fixture();
        let input = PreregistroInput {
            notas: Some("Llega con retraso".into()),
            placa: Some("ABC123".into()),
            documento: Some("   ".into()),
            ..juan()
        };
        let visit = fx
            .engine
            .create_from_preregistro(&fx.resident, input)
            .await
            .unwrap()
            .visit;

        let evidence = fx.store.list_evidence(&visit.visita_id).await.unwrap();
        assert_eq!(evidence.len(), 1);
        let row = &evidence[0];
        assert_eq!(row.categoria, EvidenceCategory::Preregistro);
        assert_eq!(row.sub_tipo, PREREGISTRO_SUB_TIPO);
        assert_eq!(row.archivo_url, "");
        assert_eq!(row.hash_sha256, "");
        assert_eq!(row.metadata_json["notas"], "Llega con retraso");
        assert_eq!(row.metadata_json["placa"], "ABC123");
        assert_eq!(row.metadata_json["created_by"], "R1");
        assert!(row.metadata_json.get("documento").is_none());
    }

    #[tokio::test]
    async fn preregistration_is_atomic_when_metadata_insert_fails() {
        let fx = fixture();
        fx.store.fail_evidence_writes(true);
        let input = PreregistroInput {
            notas: Some("nota".into()),
            ..juan()
        };
        let result = fx.engine.create_from_preregistro(&fx.resident, input).await;
        assert!(result.is_err());
        assert!(fx
            .engine
            .list_for_resident(&fx.resident)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(fx.store.evidence_count(), 0);
    }

    #[tokio::test]
    async fn only_residents_preregister_and_only_admins_create_directly() {
        let fx = fixture();
        assert_matches!(
            fx.engine.create_from_preregistro(&fx.guard, juan()).await,
            Err(CoreError::Forbidden(_))
        );
        let direct = CreateVisit {
            nombre_visitante: "Proveedor".into(),
            tipo_visita: "servicio".into(),
            vigencia: t0(),
            condominio_id: None,
            casa_unidad: None,
        };
        assert_matches!(
            fx.engine.create_direct(&fx.resident, direct.clone()).await,
            Err(CoreError::Forbidden(_))
        );

        let visit = fx.engine.create_direct(&fx.admin, direct).await.unwrap();
        assert_eq!(visit.condominio_id, "C1");
        assert_eq!(visit.casa_unidad, None);
        assert_eq!(visit.qr_token, None);
        assert_eq!(visit.estado, VisitState::Pending);
    }

    #[tokio::test]
    async fn admin_cannot_create_for_another_condominium() {
        let fx = fixture();
        let input = CreateVisit {
            nombre_visitante: "Proveedor".into(),
            tipo_visita: "servicio".into(),
            vigencia: t0(),
            condominio_id: Some("C2".into()),
            casa_unidad: Some("U9".into()),
        };
        assert_matches!(
            fx.engine.create_direct(&fx.admin, input).await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn blank_visitor_name_is_rejected() {
        let fx = fixture();
        let input = PreregistroInput {
            nombre_visitante: "  ".into(),
            ..juan()
        };
        assert_matches!(
            fx.engine.create_from_preregistro(&fx.resident, input).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn valid_scan_admits_once_and_replay_is_already_consumed() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        let token = token_of(&visit);

        fx.clock.advance_minutes(5);
        let admitted = fx
            .engine
            .validate_credential(&fx.guard, &visit.visita_id, &token)
            .await
            .unwrap();
        assert_eq!(admitted.estado, VisitState::EntradaRegistrada);
        assert_eq!(
            admitted.entrada_registrada_en,
            Some(t0() + ChronoDuration::minutes(5))
        );

        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, &token)
                .await,
            Err(CoreError::AlreadyConsumed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_for_an_applied_entry_still_admits() {
        let fx = fixture();
        let engine = VisitLifecycle::new(
            fx.store.clone(),
            fx.clock.clone(),
            AccessConfig {
                store_timeout: Duration::from_millis(50),
                ..AccessConfig::default()
            },
        );
        let visit = preregister(&fx).await;
        let token = token_of(&visit);

        fx.store.stall_after_consume(Some(Duration::from_secs(5)));
        let admitted = engine
            .validate_credential(&fx.guard, &visit.visita_id, &token)
            .await
            .unwrap();
        assert_eq!(admitted.estado, VisitState::EntradaRegistrada);
        assert_eq!(admitted.entrada_registrada_en, Some(t0()));

        // A later retry is a replay.
        fx.store.stall_after_consume(None);
        fx.clock.advance_minutes(1);
        assert_matches!(
            engine
                .validate_credential(&fx.guard, &visit.visita_id, &token)
                .await,
            Err(CoreError::AlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn scan_after_expiry_is_rejected_and_state_stays_pending() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        fx.clock.advance_minutes(61);
        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, &token_of(&visit))
                .await,
            Err(CoreError::ExpiredCredential)
        );
        let stored = fx.engine.get_visit(&fx.guard, &visit.visita_id).await.unwrap();
        assert_eq!(stored.estado, VisitState::Pending);
        assert_eq!(stored.entrada_registrada_en, None);
    }

    #[tokio::test]
    async fn denial_order_is_not_found_then_token_then_expiry_then_consumed() {
        let fx = fixture();
        assert_matches!(
            fx.engine.validate_credential(&fx.guard, "VIS-missing", "x").await,
            Err(CoreError::NotFound { .. })
        );

        let visit = preregister(&fx).await;
        fx.clock.advance_minutes(120);
        // Wrong and expired: the token check wins.
        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, "wrong")
                .await,
            Err(CoreError::InvalidCredential)
        );

        // Consumed and expired: expiry wins.
        let fresh = preregister(&fx).await;
        fx.engine
            .validate_credential(&fx.guard, &fresh.visita_id, &token_of(&fresh))
            .await
            .unwrap();
        fx.clock.advance_minutes(120);
        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &fresh.visita_id, &token_of(&fresh))
                .await,
            Err(CoreError::ExpiredCredential)
        );
    }

    #[tokio::test]
    async fn visit_without_credential_reports_invalid() {
        let fx = fixture();
        let visit = fx
            .engine
            .create_direct(
                &fx.admin,
                CreateVisit {
                    nombre_visitante: "Walk-in".into(),
                    tipo_visita: "servicio".into(),
                    vigencia: t0(),
                    condominio_id: None,
                    casa_unidad: None,
                },
            )
            .await
            .unwrap();
        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, "")
                .await,
            Err(CoreError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_token() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        let old = token_of(&visit);

        let grant = fx
            .engine
            .issue_credential(&fx.resident, &visit.visita_id, Some(30))
            .await
            .unwrap();
        let new = token_of(&grant.visit);
        assert_ne!(old, new);
        assert_eq!(grant.minutes, 30);

        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, &old)
                .await,
            Err(CoreError::InvalidCredential)
        );
        assert!(fx
            .engine
            .validate_credential(&fx.guard, &visit.visita_id, &new)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn issue_clamps_requested_duration() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        let short = fx
            .engine
            .issue_credential(&fx.admin, &visit.visita_id, Some(-10))
            .await
            .unwrap();
        assert_eq!(short.visit.qr_vigencia, Some(t0() + ChronoDuration::minutes(1)));

        let long = fx
            .engine
            .issue_credential(&fx.admin, &visit.visita_id, Some(999_999))
            .await
            .unwrap();
        assert_eq!(long.visit.qr_vigencia, Some(t0() + ChronoDuration::days(7)));
    }

    #[tokio::test]
    async fn consumed_visit_cannot_be_reissued() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        fx.engine
            .validate_credential(&fx.guard, &visit.visita_id, &token_of(&visit))
            .await
            .unwrap();
        assert_matches!(
            fx.engine
                .issue_credential(&fx.resident, &visit.visita_id, None)
                .await,
            Err(CoreError::AlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn resend_rerenders_live_token_without_touching_expiry() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        fx.clock.advance_minutes(20);
        let resent = fx
            .engine
            .resend_credential(&fx.resident, &visit.visita_id)
            .await
            .unwrap();
        assert!(!resent.reissued);
        assert_eq!(resent.minutes, 40);
        assert_eq!(resent.visit.qr_token, visit.qr_token);
        assert_eq!(resent.visit.qr_vigencia, visit.qr_vigencia);
        assert_eq!(
            resent.image_png,
            credential::render_png(&visit.visita_id, &token_of(&visit)).unwrap()
        );
    }

    #[tokio::test]
    async fn resend_mints_fresh_credential_once_expired() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        fx.clock.advance_minutes(90);
        let resent = fx
            .engine
            .resend_credential(&fx.resident, &visit.visita_id)
            .await
            .unwrap();
        assert!(resent.reissued);
        assert_ne!(resent.visit.qr_token, visit.qr_token);
        assert_eq!(
            resent.visit.qr_vigencia,
            Some(t0() + ChronoDuration::minutes(150))
        );
    }

    #[tokio::test]
    async fn resend_is_scoped_to_the_residents_unit() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        let neighbour = usuario("R2", Role::Residente, Some("C1"), Some("U2"));
        assert_matches!(
            fx.engine.resend_credential(&neighbour, &visit.visita_id).await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.engine.resend_credential(&fx.admin, &visit.visita_id).await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn exit_requires_entry_and_happens_once() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        assert_matches!(
            fx.engine.register_exit(&fx.guard, &visit.visita_id).await,
            Err(CoreError::Conflict(_))
        );

        fx.engine
            .validate_credential(&fx.guard, &visit.visita_id, &token_of(&visit))
            .await
            .unwrap();
        fx.clock.advance_minutes(45);
        let exited = fx
            .engine
            .register_exit(&fx.guard, &visit.visita_id)
            .await
            .unwrap();
        assert_eq!(exited.estado, VisitState::SalidaRegistrada);
        assert_eq!(
            exited.salida_registrada_en,
            Some(t0() + ChronoDuration::minutes(45))
        );

        assert_matches!(
            fx.engine.register_exit(&fx.guard, &visit.visita_id).await,
            Err(CoreError::AlreadyConsumed)
        );
        assert_matches!(
            fx.engine
                .validate_credential(&fx.guard, &visit.visita_id, &token_of(&visit))
                .await,
            Err(CoreError::AlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn guards_from_other_condominiums_are_forbidden() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        let outsider = usuario("G2", Role::Guardia, Some("C2"), None);
        assert_matches!(
            fx.engine
                .validate_credential(&outsider, &visit.visita_id, &token_of(&visit))
                .await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.engine
                .validate_credential(&fx.resident, &visit.visita_id, &token_of(&visit))
                .await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn get_visit_forbids_residents_of_other_condominiums() {
        let fx = fixture();
        let visit = preregister(&fx).await;

        let stranger = usuario("R9", Role::Residente, Some("C2"), Some("U1"));
        assert_matches!(
            fx.engine.get_visit(&stranger, &visit.visita_id).await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.engine.get_visit(&stranger, "VIS-does-not-exist").await,
            Err(CoreError::NotFound { .. })
        );

        let msp = usuario("M1", Role::MspAdmin, None, None);
        assert!(fx.engine.get_visit(&msp, &visit.visita_id).await.is_ok());
        assert!(fx.engine.get_visit(&fx.resident, &visit.visita_id).await.is_ok());
        assert!(fx.engine.get_visit(&fx.admin, &visit.visita_id).await.is_ok());
    }

    #[tokio::test]
    async fn listings_are_role_gated_and_ordered() {
        let fx = fixture();
        let early = preregister(&fx).await;
        let late = fx
            .engine
            .create_from_preregistro(
                &fx.resident,
                PreregistroInput {
                    fecha_visita: t0() + ChronoDuration::days(3),
                    ..juan()
                },
            )
            .await
            .unwrap()
            .visit;

        let mine = fx.engine.list_for_resident(&fx.resident).await.unwrap();
        assert_eq!(
            mine.iter().map(|v| v.visita_id.as_str()).collect::<Vec<_>>(),
            vec![late.visita_id.as_str(), early.visita_id.as_str()]
        );

        assert_eq!(
            fx.engine.list_for_condominium(&fx.guard).await.unwrap().len(),
            2
        );
        assert_matches!(
            fx.engine.list_for_condominium(&fx.resident).await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.engine.list_for_resident(&fx.guard).await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_admit_exactly_once() {
        let fx = fixture();
        let visit = preregister(&fx).await;
        let engine = Arc::new(fx.engine);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let guard = fx.guard.clone();
                let visita_id = visit.visita_id.clone();
                let token = token_of(&visit);
                tokio::spawn(async move {
                    engine.validate_credential(&guard, &visita_id, &token).await
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert_matches!(e, CoreError::AlreadyConsumed),
            }
        }
        assert_eq!(admitted, 1);
    }
}

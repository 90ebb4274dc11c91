//! In-process [`VisitStore`] used by tests and by local runs without a
//! database.
//!
//! Every method holds the table lock for its whole body and never awaits
//! while holding it, so each call is atomic with respect to the others.
//! `created_at` comes from the store's [`Clock`], the same one the engine
//! stamps transitions with.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{StoreError, VisitStore};
use crate::domain::{Evidence, NewEvidence, NewUsuario, NewVisit, Usuario, Visit, VisitState};
use crate::types::{Clock, SystemClock, Timestamp};

#[derive(Debug, Default)]
struct Tables {
    usuarios: Vec<Usuario>,
    visitas: Vec<Visit>,
    evidencias: Vec<Evidence>,
}

/// Mutex-backed store with transaction-like all-or-nothing writes.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
    fail_evidence_writes: AtomicBool,
    consume_stall: Mutex<Option<Duration>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::default(),
            clock,
            fail_evidence_writes: AtomicBool::new(false),
            consume_stall: Mutex::new(None),
        }
    }

    /// Make every subsequent evidence insert fail, to exercise rollback.
    pub fn fail_evidence_writes(&self, fail: bool) {
        self.fail_evidence_writes.store(fail, Ordering::SeqCst);
    }

    /// Sleep for `stall` after a consume has been applied, before replying.
    /// Models a write that committed but whose reply arrived too late.
    pub fn stall_after_consume(&self, stall: Option<Duration>) {
        if let Ok(mut slot) = self.consume_stall.lock() {
            *slot = stall;
        }
    }

    /// Number of evidence rows currently visible.
    pub fn evidence_count(&self) -> usize {
        self.tables().map(|t| t.evidencias.len()).unwrap_or(0)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn insert_evidence(
        &self,
        tables: &mut Tables,
        row: &NewEvidence,
        now: Timestamp,
    ) -> Result<Evidence, StoreError> {
        if self.fail_evidence_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("evidence insert failed".into()));
        }
        if tables
            .evidencias
            .iter()
            .any(|e| e.evidencia_id == row.evidencia_id)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate evidencia_id {}",
                row.evidencia_id
            )));
        }
        let evidence = Evidence {
            evidencia_id: row.evidencia_id.clone(),
            visita_id: row.visita_id.clone(),
            categoria: row.categoria,
            sub_tipo: row.sub_tipo.clone(),
            archivo_url: row.archivo_url.clone(),
            hash_sha256: row.hash_sha256.clone(),
            guardia_id: row.guardia_id.clone(),
            metadata_json: row.metadata_json.clone(),
            created_at: now,
        };
        tables.evidencias.push(evidence.clone());
        Ok(evidence)
    }
}

fn find_visit_mut<'a>(tables: &'a mut Tables, visita_id: &str) -> Option<&'a mut Visit> {
    tables.visitas.iter_mut().find(|v| v.visita_id == visita_id)
}

fn sorted_by_vigencia_desc(mut visits: Vec<Visit>) -> Vec<Visit> {
    visits.sort_by(|a, b| {
        b.vigencia
            .cmp(&a.vigencia)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    visits
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.tables().map(|_| ())
    }

    async fn find_usuario(&self, usuario_id: &str) -> Result<Option<Usuario>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .usuarios
            .iter()
            .find(|u| u.usuario_id == usuario_id)
            .cloned())
    }

    async fn find_usuario_by_correo(&self, correo: &str) -> Result<Option<Usuario>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.usuarios.iter().find(|u| u.correo == correo).cloned())
    }

    async fn create_usuario(&self, input: &NewUsuario) -> Result<Usuario, StoreError> {
        let mut tables = self.tables()?;
        if tables
            .usuarios
            .iter()
            .any(|u| u.usuario_id == input.usuario_id || u.correo == input.correo)
        {
            return Err(StoreError::Conflict(format!(
                "usuario {} or correo {} already exists",
                input.usuario_id, input.correo
            )));
        }
        let usuario = Usuario {
            usuario_id: input.usuario_id.clone(),
            condominio_id: input.condominio_id.clone(),
            casa_unidad: input.casa_unidad.clone(),
            rol: input.rol,
            nombre: input.nombre.clone(),
            correo: input.correo.clone(),
            password_hash: input.password_hash.clone(),
            created_at: self.clock.now(),
        };
        tables.usuarios.push(usuario.clone());
        Ok(usuario)
    }

    async fn list_usuarios(
        &self,
        condominio_id: Option<&str>,
    ) -> Result<Vec<Usuario>, StoreError> {
        let tables = self.tables()?;
        let mut usuarios: Vec<Usuario> = tables
            .usuarios
            .iter()
            .filter(|u| condominio_id.is_none() || u.condominio_id.as_deref() == condominio_id)
            .cloned()
            .collect();
        usuarios.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(usuarios)
    }

    async fn create_visit(
        &self,
        visit: &NewVisit,
        metadata: Option<&NewEvidence>,
    ) -> Result<Visit, StoreError> {
        let mut tables = self.tables()?;
        if tables.visitas.iter().any(|v| v.visita_id == visit.visita_id) {
            return Err(StoreError::Conflict(format!(
                "duplicate visita_id {}",
                visit.visita_id
            )));
        }

        let now = self.clock.now();
        let row = Visit {
            visita_id: visit.visita_id.clone(),
            condominio_id: visit.condominio_id.clone(),
            casa_unidad: visit.casa_unidad.clone(),
            nombre_visitante: visit.nombre_visitante.clone(),
            tipo_visita: visit.tipo_visita.clone(),
            vigencia: visit.vigencia,
            qr_token: visit.qr_token.clone(),
            qr_vigencia: visit.qr_vigencia,
            estado: VisitState::Pending,
            entrada_registrada_en: None,
            salida_registrada_en: None,
            created_at: now,
        };

        // Stage the visit, then the evidence; undo the visit if the second
        // insert fails so neither becomes visible.
        let mark = tables.visitas.len();
        tables.visitas.push(row.clone());
        if let Some(evidence) = metadata {
            if let Err(e) = self.insert_evidence(&mut tables, evidence, now) {
                tables.visitas.truncate(mark);
                return Err(e);
            }
        }
        Ok(row)
    }

    async fn find_visit(&self, visita_id: &str) -> Result<Option<Visit>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .visitas
            .iter()
            .find(|v| v.visita_id == visita_id)
            .cloned())
    }

    async fn replace_credential(
        &self,
        visita_id: &str,
        token: &str,
        expiry: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let mut tables = self.tables()?;
        Ok(match find_visit_mut(&mut tables, visita_id) {
            Some(visit) if visit.estado == VisitState::Pending => {
                visit.qr_token = Some(token.to_string());
                visit.qr_vigencia = Some(expiry);
                Some(visit.clone())
            }
            _ => None,
        })
    }

    async fn consume_credential(
        &self,
        visita_id: &str,
        token: &str,
        now: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let consumed = {
            let mut tables = self.tables()?;
            match find_visit_mut(&mut tables, visita_id) {
                Some(visit)
                    if visit.estado == VisitState::Pending
                        && visit.qr_token.as_deref() == Some(token)
                        && visit.qr_vigencia.is_some_and(|exp| exp > now) =>
                {
                    visit.estado = VisitState::EntradaRegistrada;
                    visit.entrada_registrada_en = Some(now);
                    Some(visit.clone())
                }
                _ => None,
            }
        };

        let stall = self.consume_stall.lock().ok().and_then(|slot| *slot);
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        Ok(consumed)
    }

    async fn record_exit(
        &self,
        visita_id: &str,
        now: Timestamp,
    ) -> Result<Option<Visit>, StoreError> {
        let mut tables = self.tables()?;
        Ok(match find_visit_mut(&mut tables, visita_id) {
            Some(visit) if visit.estado == VisitState::EntradaRegistrada => {
                visit.estado = VisitState::SalidaRegistrada;
                visit.salida_registrada_en = Some(now);
                Some(visit.clone())
            }
            _ => None,
        })
    }

    async fn list_visits(
        &self,
        condominio_id: &str,
        casa_unidad: Option<&str>,
    ) -> Result<Vec<Visit>, StoreError> {
        let tables = self.tables()?;
        let visits = tables
            .visitas
            .iter()
            .filter(|v| v.condominio_id == condominio_id)
            .filter(|v| casa_unidad.is_none() || v.casa_unidad.as_deref() == casa_unidad)
            .cloned()
            .collect();
        Ok(sorted_by_vigencia_desc(visits))
    }

    async fn append_evidence(&self, rows: &[NewEvidence]) -> Result<Vec<Evidence>, StoreError> {
        let mut tables = self.tables()?;
        let now = self.clock.now();
        let mark = tables.evidencias.len();
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            match self.insert_evidence(&mut tables, row, now) {
                Ok(evidence) => inserted.push(evidence),
                Err(e) => {
                    tables.evidencias.truncate(mark);
                    return Err(e);
                }
            }
        }
        Ok(inserted)
    }

    async fn list_evidence(&self, visita_id: &str) -> Result<Vec<Evidence>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .evidencias
            .iter()
            .filter(|e| e.visita_id == visita_id)
            .cloned()
            .collect())
    }
}

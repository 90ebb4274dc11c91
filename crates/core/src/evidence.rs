//! Evidence ledger: append-only photo/document records attached to a visit.
//!
//! Blobs are written first, then every row for the request goes in with a
//! single store call. If the rows fail, the blobs written by this request are
//! removed on a best-effort basis.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AccessConfig;
use crate::domain::{new_evidencia_id, Evidence, EvidenceCategory, NewEvidence, Usuario, Visit};
use crate::error::CoreError;
use crate::hashing::sha256_hex;
use crate::roles::{authorize, Role};
use crate::storage::{sanitize_filename, BlobStore};
use crate::store::{bounded, VisitStore};
use crate::visits::{ensure_can_view, ensure_same_condominio};

/// Named upload slots accepted at the gate, in form order.
pub const EVIDENCE_SLOTS: [&str; 6] = [
    "visitante",
    "ine_frente",
    "ine_reverso",
    "placas",
    "vehiculo",
    "documento",
];

/// Map a multipart field name to its slot. `foto_visitante` is an alias of
/// `visitante`.
pub fn slot_for_field(field: &str) -> Option<&'static str> {
    if field == "foto_visitante" {
        return Some("visitante");
    }
    EVIDENCE_SLOTS.iter().copied().find(|slot| *slot == field)
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub sub_tipo: String,
    /// Client-supplied name; sanitized before it reaches the blob store.
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct EvidenceLedger {
    store: Arc<dyn VisitStore>,
    blobs: Arc<dyn BlobStore>,
    max_item_bytes: usize,
    timeout: Duration,
}

impl EvidenceLedger {
    pub fn new(store: Arc<dyn VisitStore>, blobs: Arc<dyn BlobStore>, config: &AccessConfig) -> Self {
        Self {
            store,
            blobs,
            max_item_bytes: config.max_evidence_bytes,
            timeout: config.store_timeout,
        }
    }

    pub fn max_item_bytes(&self) -> usize {
        self.max_item_bytes
    }

    async fn load(&self, visita_id: &str) -> Result<Visit, CoreError> {
        bounded(self.timeout, self.store.find_visit(visita_id))
            .await?
            .ok_or_else(|| CoreError::not_found("Visita", visita_id))
    }

    /// Attach a batch of files to a visit under `categoria`.
    ///
    /// All-or-nothing: an oversized item rejects the whole batch before any
    /// blob is written, and a failed row insert leaves no rows behind.
    pub async fn attach(
        &self,
        principal: &Usuario,
        visita_id: &str,
        categoria: EvidenceCategory,
        items: Vec<EvidenceItem>,
    ) -> Result<Vec<Evidence>, CoreError> {
        authorize(principal, &[Role::Guardia])?;
        if categoria == EvidenceCategory::Preregistro {
            return Err(CoreError::Validation(
                "preregistro evidence is only written at pre-registration".into(),
            ));
        }

        let visit = self.load(visita_id.trim()).await?;
        ensure_same_condominio(principal, &visit)?;
        self.check_batch(&items)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut written: Vec<String> = Vec::with_capacity(items.len());
        let mut rows: Vec<NewEvidence> = Vec::with_capacity(items.len());

        for item in &items {
            let evidencia_id = new_evidencia_id();
            let path = format!(
                "{}/{}/{}_{}",
                visit.visita_id,
                categoria,
                evidencia_id,
                sanitize_filename(&item.filename)
            );

            let locator = match bounded(self.timeout, self.blobs.store(&path, &item.bytes)).await {
                Ok(locator) => locator,
                Err(e) => {
                    self.discard(&written).await;
                    return Err(e);
                }
            };
            written.push(locator.clone());

            rows.push(NewEvidence {
                evidencia_id,
                visita_id: visit.visita_id.clone(),
                categoria,
                sub_tipo: item.sub_tipo.clone(),
                archivo_url: locator,
                hash_sha256: sha256_hex(&item.bytes),
                guardia_id: Some(principal.usuario_id.clone()),
                metadata_json: serde_json::json!({
                    "filename": item.filename,
                    "content_type": item.content_type,
                    "size_bytes": item.bytes.len(),
                }),
            });
        }

        match bounded(self.timeout, self.store.append_evidence(&rows)).await {
            Ok(records) => {
                tracing::info!(
                    visita_id = %visit.visita_id,
                    categoria = %categoria,
                    count = records.len(),
                    guardia_id = %principal.usuario_id,
                    "Evidence recorded"
                );
                Ok(records)
            }
            Err(e) => {
                self.discard(&written).await;
                Err(e)
            }
        }
    }

    /// Evidence for a visit in insertion order.
    pub async fn list(&self, principal: &Usuario, visita_id: &str) -> Result<Vec<Evidence>, CoreError> {
        authorize(principal, &[Role::MspAdmin, Role::AdminCondominio, Role::Guardia])?;
        let visit = self.load(visita_id.trim()).await?;
        ensure_can_view(principal, &visit)?;
        bounded(self.timeout, self.store.list_evidence(&visit.visita_id)).await
    }

    fn check_batch(&self, items: &[EvidenceItem]) -> Result<(), CoreError> {
        for (i, item) in items.iter().enumerate() {
            if item.sub_tipo.trim().is_empty() {
                return Err(CoreError::Validation("sub_tipo must not be empty".into()));
            }
            if items[..i].iter().any(|prev| prev.sub_tipo == item.sub_tipo) {
                return Err(CoreError::Validation(format!(
                    "sub_tipo '{}' appears more than once",
                    item.sub_tipo
                )));
            }
            if item.bytes.len() > self.max_item_bytes {
                return Err(CoreError::PayloadTooLarge(format!(
                    "'{}' is {} bytes; the limit is {} bytes",
                    item.sub_tipo,
                    item.bytes.len(),
                    self.max_item_bytes
                )));
            }
        }
        Ok(())
    }

    async fn discard(&self, locators: &[String]) {
        for locator in locators {
            if let Err(e) = self.blobs.remove(locator).await {
                tracing::warn!(locator = %locator, error = %e, "Failed to remove orphaned evidence blob");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::domain::test_support::usuario;
    use crate::domain::NewVisit;
    use crate::storage::LocalBlobStore;
    use crate::store::memory::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: EvidenceLedger,
        guard: Usuario,
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&root));
        let config = AccessConfig {
            max_evidence_bytes: 1024,
            ..AccessConfig::default()
        };
        store
            .create_visit(
                &NewVisit {
                    visita_id: "VIS-1".into(),
                    condominio_id: "C1".into(),
                    casa_unidad: Some("U1".into()),
                    nombre_visitante: "Juan Perez".into(),
                    tipo_visita: "visita_personal".into(),
                    vigencia: Utc::now(),
                    qr_token: None,
                    qr_vigencia: None,
                },
                None,
            )
            .await
            .unwrap();
        Fixture {
            ledger: EvidenceLedger::new(store.clone(), blobs, &config),
            store,
            guard: usuario("G1", Role::Guardia, Some("C1"), None),
            _dir: dir,
            root,
        }
    }

    fn item(sub_tipo: &str, size: usize) -> EvidenceItem {
        EvidenceItem {
            sub_tipo: sub_tipo.into(),
            filename: format!("{sub_tipo}.jpg"),
            content_type: Some("image/jpeg".into()),
            bytes: vec![7u8; size],
        }
    }

    fn files_under(root: &std::path::Path) -> usize {
        fn walk(path: &std::path::Path) -> usize {
            match std::fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(Result::ok)
                    .map(|e| {
                        let p = e.path();
                        if p.is_dir() {
                            walk(&p)
                        } else {
                            1
                        }
                    })
                    .sum(),
                Err(_) => 0,
            }
        }
        walk(root)
    }

    #[test]
    fn field_aliases_resolve_to_slots() {
        assert_eq!(slot_for_field("foto_visitante"), Some("visitante"));
        assert_eq!(slot_for_field("ine_frente"), Some("ine_frente"));
        assert_eq!(slot_for_field("selfie"), None);
    }

    #[tokio::test]
    async fn attach_records_hash_locator_and_guard() {
        let fx = fixture().await;
        let records = fx
            .ledger
            .attach(
                &fx.guard,
                "VIS-1",
                EvidenceCategory::Entrada,
                vec![item("visitante", 10), item("ine_frente", 20)],
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sub_tipo, "visitante");
        assert_eq!(records[0].hash_sha256, sha256_hex(&[7u8; 10]));
        assert_eq!(records[0].guardia_id.as_deref(), Some("G1"));
        assert_eq!(records[0].metadata_json["size_bytes"], 10);
        assert!(std::path::Path::new(&records[0].archivo_url).exists());
        assert_eq!(files_under(&fx.root), 2);
    }

    #[tokio::test]
    async fn one_oversized_item_rejects_the_whole_batch() {
        let fx = fixture().await;
        let result = fx
            .ledger
            .attach(
                &fx.guard,
                "VIS-1",
                EvidenceCategory::Entrada,
                vec![
                    item("visitante", 10),
                    item("ine_frente", 10),
                    item("ine_reverso", 10),
                    item("placas", 2048),
                ],
            )
            .await;

        assert_matches!(result, Err(CoreError::PayloadTooLarge(_)));
        assert_eq!(fx.store.evidence_count(), 0);
        assert_eq!(files_under(&fx.root), 0);
    }

    #[tokio::test]
    async fn failed_insert_removes_written_blobs() {
        let fx = fixture().await;
        fx.store.fail_evidence_writes(true);
        let result = fx
            .ledger
            .attach(
                &fx.guard,
                "VIS-1",
                EvidenceCategory::Salida,
                vec![item("vehiculo", 10), item("placas", 10)],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(fx.store.evidence_count(), 0);
        assert_eq!(files_under(&fx.root), 0);
    }

    #[tokio::test]
    async fn duplicate_slots_in_one_batch_are_rejected() {
        let fx = fixture().await;
        assert_matches!(
            fx.ledger
                .attach(
                    &fx.guard,
                    "VIS-1",
                    EvidenceCategory::Entrada,
                    vec![item("placas", 1), item("placas", 1)],
                )
                .await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn only_guards_of_the_condominium_attach() {
        let fx = fixture().await;
        let resident = usuario("R1", Role::Residente, Some("C1"), Some("U1"));
        let outsider = usuario("G2", Role::Guardia, Some("C2"), None);
        assert_matches!(
            fx.ledger
                .attach(&resident, "VIS-1", EvidenceCategory::Entrada, vec![item("visitante", 1)])
                .await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.ledger
                .attach(&outsider, "VIS-1", EvidenceCategory::Entrada, vec![item("visitante", 1)])
                .await,
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            fx.ledger
                .attach(&fx.guard, "VIS-404", EvidenceCategory::Entrada, vec![])
                .await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn list_returns_insertion_order_for_staff() {
        let fx = fixture().await;
        fx.ledger
            .attach(&fx.guard, "VIS-1", EvidenceCategory::Entrada, vec![item("visitante", 1)])
            .await
            .unwrap();
        fx.ledger
            .attach(&fx.guard, "VIS-1", EvidenceCategory::Salida, vec![item("vehiculo", 1)])
            .await
            .unwrap();

        let admin = usuario("A1", Role::AdminCondominio, Some("C1"), None);
        let listed = fx.ledger.list(&admin, "VIS-1").await.unwrap();
        assert_eq!(
            listed.iter().map(|e| e.sub_tipo.as_str()).collect::<Vec<_>>(),
            vec!["visitante", "vehiculo"]
        );

        let resident = usuario("R1", Role::Residente, Some("C1"), Some("U1"));
        assert_matches!(
            fx.ledger.list(&resident, "VIS-1").await,
            Err(CoreError::Forbidden(_))
        );
    }
}

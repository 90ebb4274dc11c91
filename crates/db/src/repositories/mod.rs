//! Repository layer.
//!
//! Each repository is a zero-sized struct whose async methods take any
//! `PgExecutor` as the first argument, so the same query runs against the
//! pool or inside a caller-owned transaction (`&mut *tx`).

pub mod evidencia_repo;
pub mod usuario_repo;
pub mod visita_repo;

pub use evidencia_repo::EvidenciaRepo;
pub use usuario_repo::UsuarioRepo;
pub use visita_repo::VisitaRepo;

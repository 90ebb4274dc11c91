//! Row structs for the three tables.
//!
//! Each row is a `FromRow` mirror of its table, internal `id` included, with
//! a `TryFrom` into the matching domain type. Enum-like text columns are
//! parsed on the way out so a bad value surfaces as an error, not a panic.

pub mod evidencia;
pub mod usuario;
pub mod visita;

pub use evidencia::EvidenciaRow;
pub use usuario::UsuarioRow;
pub use visita::VisitaRow;

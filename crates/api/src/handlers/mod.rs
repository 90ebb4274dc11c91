pub mod auth;
pub mod evidencias;
pub mod preregistro;
pub mod qr;
pub mod usuarios;
pub mod visitas;

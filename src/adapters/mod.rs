pub mod auth_service;
pub mod cookies;
pub mod upstream;

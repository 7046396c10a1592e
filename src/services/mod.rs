pub mod price_service;
pub mod refresh_service;

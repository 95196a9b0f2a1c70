pub mod auth_routes;
pub mod export;
pub mod health;
pub mod job_routes;
pub mod scrape_routes;
pub mod settings_routes;
pub mod sheets_routes;

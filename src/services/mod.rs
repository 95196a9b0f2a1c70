pub mod export_service;
pub mod fetch_service;
pub mod job_service;
pub mod match_service;
pub mod quota_service;
pub mod scrape_service;
pub mod settings_service;
pub mod sheets_service;
pub mod user_service;

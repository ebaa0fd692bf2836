// Presentation layer - HTTP routes over the analytics facade
pub mod app_state;
pub mod handlers;

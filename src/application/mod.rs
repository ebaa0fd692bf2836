// Application layer - Services and the ports they depend on
pub mod analytics_facade;
pub mod clock;
pub mod disease_classifier;
pub mod growth_forecaster;
pub mod ingestor;
pub mod irrigation_evaluator;
pub mod reading_source;
pub mod repositories;
pub mod window_store;

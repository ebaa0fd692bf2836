// Domain layer - Plain data types shared by every component
pub mod disease;
pub mod farm;
pub mod growth;
pub mod irrigation;
pub mod reading;
pub mod snapshot;

pub mod registry;
pub mod traits;

// Upstream API implementations
pub mod trading212;

pub mod account;
pub mod cash;
pub mod endpoint;
pub mod order;
pub mod position;
pub mod profile;
pub mod settings;
pub mod summary;
pub mod trail_stop;

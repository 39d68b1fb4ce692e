pub mod artifacts;
pub mod health;

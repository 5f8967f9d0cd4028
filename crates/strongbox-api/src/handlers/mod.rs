pub mod dunning;
pub mod health;

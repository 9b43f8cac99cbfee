pub mod audit;
pub mod expiration;
pub mod supplies;

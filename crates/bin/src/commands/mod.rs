pub mod clients;
pub mod fetch;
pub mod health;
pub mod serve;
pub mod sign;

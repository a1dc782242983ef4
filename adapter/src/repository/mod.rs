pub mod health;
pub mod reservation;
pub mod settings;
pub mod user;

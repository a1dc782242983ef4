pub mod health;
pub mod reservation;
pub mod review;
pub mod settings;
pub mod user;

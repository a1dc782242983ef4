pub mod change;
pub mod id;
pub mod notification;
pub mod reservation;
pub mod role;
pub mod settings;
pub mod user;

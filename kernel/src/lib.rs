pub mod clock;
pub mod model;
pub mod notification;
pub mod repository;

pub mod api;
pub mod events;
pub mod forms;
pub mod models;

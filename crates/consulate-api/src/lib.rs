pub mod admin;
pub mod applications;
pub mod auth;
pub mod chat;
pub mod contact;
pub mod documents;
pub mod error;
pub mod middleware;
pub mod notify;
pub mod router;
pub mod state;
pub mod validation;
pub mod visitors;
pub mod workflow;

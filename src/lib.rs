//! Session-backed authentication and role-based authorization for the
//! school administration backend.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;

//! Pi Mart marketplace backend
//!
//! Points ledger, escrowed orders, seller deposits, moderation queues and
//! order chat, served over axum.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod market;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod wallet;

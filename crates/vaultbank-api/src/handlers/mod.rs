//! Request handlers

pub mod account;
pub mod auth;
pub mod transfer;

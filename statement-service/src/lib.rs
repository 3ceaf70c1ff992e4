//! Statement Service - Bank statement aggregation across tokenized organizations.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

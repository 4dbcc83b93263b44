//! invoicing-service: CFDI 4.0 invoice generation for Velion subscriptions.

pub mod cfdi;
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

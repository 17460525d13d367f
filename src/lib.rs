//! KYC Onboard API Library
//!
//! Know-your-customer onboarding: document extraction, personal-info
//! validation, identity and sanctions screening, credit bureau lookup, a
//! weighted risk decision and regulatory compliance checks, served over HTTP.
//!
//! # Modules
//!
//! - `api`: HTTP-layer namespace.
//! - `core`: Domain logic namespace.
//! - `integrations`: External service namespace.
//! - `ai_client`: Chat-completions client with simulated fallback.
//! - `circuit_breaker`: Circuit breaker for AI calls.
//! - `compliance`: Regulatory compliance scoring.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and routes.
//! - `models`: Request, record and response types.
//! - `orchestrator`: The KYC workflow.
//! - `scoring`: Risk score and decision.
//! - `services`: KYC provider trait and implementations.
//! - `store`: In-memory record store.
//! - `validation`: Field, name, age and document checks.

pub mod api;
pub mod core;
pub mod integrations;

pub mod ai_client;
pub mod circuit_breaker;
pub mod compliance;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod scoring;
pub mod services;
pub mod store;
pub mod validation;

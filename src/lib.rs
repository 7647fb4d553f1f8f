//! # Outreach Engine
//!
//! Scheduling and shared-resource allocation for multi-client sales outreach.
//!
//! For every lead and channel (email, SMS, voice, social messaging) the engine
//! decides whether a touch is currently permitted, which finite shared
//! resource (sending domain, phone number, social seat) carries it, and the
//! earliest valid instant to send, while many clients compete for the same
//! slowly ramping, health-degradable pool.
//!
//! ## Components
//!
//! - **Scorer**: deterministic policy mapping lead attributes to a score and tier
//! - **Resource pool**: resource lifecycle state machine, client assignment,
//!   warmup ramps and effective capacity
//! - **Rate limiter**: atomic check-and-increment over daily and weekly windows,
//!   the single hard backstop against overuse
//! - **Health monitor**: periodic sweep over rolling delivery metrics
//! - **Allocator**: eligibility gates plus least-used, healthiest-first ranking
//! - **Timing scheduler**: recipient-local business hours, weekend rules,
//!   skewed jitter and an hourly ceiling per resource
//! - **Preflight**: just-in-time re-validation immediately before dispatch
//!
//! ## Two-phase pipeline
//!
//! ```rust,ignore
//! use outreach_engine::builders::EngineBuilder;
//! use outreach_engine::config::EngineConfig;
//! use outreach_engine::core::{Channel, TouchRequest};
//!
//! let engine = EngineBuilder::new(EngineConfig::load()?)
//!     .content(content)
//!     .crm(crm)
//!     .compliance(registry)
//!     .sender(Channel::Email, email_sender)
//!     .build()?;
//!
//! // phase one: allocate a resource and persist an attempt
//! let outcome = engine.schedule_touch(&TouchRequest { /* ... */ })?;
//!
//! // phase two, at or after the scheduled instant
//! let report = engine.dispatch_due().await?;
//! ```
//!
//! Domain decisions (no capacity, ineligible, preflight abort) come back as
//! typed outcomes carrying a [`core::ReasonCode`]; only infrastructure
//! failures surface as [`core::EngineError`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Engine components and shared records.
pub mod core;
/// Configuration models for channels, warmup, health and dispatch.
pub mod config;
/// Builders to construct the engine from configuration.
pub mod builders;
/// Infrastructure adapters for counter stores and the attempt log.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

//! # beacon-sync: Device Registration Sync Engine
//!
//! Keeps one server-side device record (owner, locale, push token,
//! platform, liveness) in step with the device, offline-first.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     LifecycleDispatcher                          │  │
//! │  │  sign_in(user) ──► authenticated hooks (by priority)            │  │
//! │  │  sign_out(..)  ──► about-to-log-out hooks, then finalize        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ bind()                                  │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                        SyncEngine                                │  │
//! │  │                                                                  │  │
//! │  │  register_device / unregister_device                             │  │
//! │  │  persist_fcm_token / update_timezone_or_offset_if_changed        │  │
//! │  │  touch_device / flush_pending_payload (single-flight)            │  │
//! │  └───────┬───────────────────────┬──────────────────────┬───────────┘  │
//! │          ▼                       ▼                      ▼               │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐    │
//! │  │ RemoteRegistry │  │ beacon-store       │  │ FlushWorker        │    │
//! │  │                │  │                    │  │                    │    │
//! │  │ upsert / patch │  │ device_id          │  │ poll + trigger     │    │
//! │  │ delete / list  │  │ pending payload    │  │ exponential retry  │    │
//! │  │                │  │ sync state         │  │                    │    │
//! │  └────────────────┘  └────────────────────┘  └────────────────────┘    │
//! │                                                                         │
//! │  STATUS EVENTS (via SyncEventEmitter):                                 │
//! │  • emit_status - registration / pending state changes                  │
//! │  • emit_error  - registry failures, with retryable flag                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `SyncEngine`, its builder, status and outcomes
//! - [`registry`] - `RemoteRegistry` contract and `InMemoryRegistry`
//! - [`lifecycle`] - `AuthLifecycle` contract and `LifecycleDispatcher`
//! - [`worker`] - Background `FlushWorker`
//! - [`config`] - TOML configuration with env overrides
//! - [`environment`] - Locale, platform and app version sources
//! - [`clock`] - Time source
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use beacon_sync::{FlushWorker, LifecycleDispatcher, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let engine = Arc::new(SyncEngine::open(&config, registry).await?);
//!
//! let lifecycle = LifecycleDispatcher::from_settings(&config.lifecycle);
//! engine.bind(&lifecycle, 0).await;
//!
//! let (worker, _join) = FlushWorker::spawn(engine.clone(), config.flush.clone());
//!
//! lifecycle.sign_in("user-42").await;
//! engine.persist_fcm_token(Some(token)).await?;
//! worker.trigger()?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use engine::{
    EngineSettings, FlushOutcome, NoOpEmitter, SyncEngine, SyncEngineBuilder, SyncEventEmitter,
    SyncStatus, TokenOutcome,
};
pub use environment::{DeviceEnvironment, StaticEnvironment, SystemEnvironment};
pub use error::{RemoteError, RemoteErrorKind, RemoteResult, SyncError, SyncResult};
pub use lifecycle::{
    AuthLifecycle, AuthenticatedHook, DispatchReport, LifecycleDispatcher, LogoutHook, Session,
    DEFAULT_PRIORITY,
};
pub use registry::{InMemoryRegistry, RemoteRegistry};
pub use worker::{FlushWorker, FlushWorkerHandle};

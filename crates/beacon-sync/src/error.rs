//! # Sync Error Types
//!
//! Error types for the sync engine and its remote collaborator.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Store                  │ │
//! │  │  ConfigLoad...  │  │  Auth           │  │  Validation             │ │
//! │  │  ConfigSave...  │  │  Server         │  │  NotAuthenticated       │ │
//! │  │                 │  │  Unknown        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures never lose data: by the time a `SyncError::Remote`
//! reaches the caller, the intent has already been merged into the pending
//! write.

use beacon_core::ValidationError;
use beacon_store::StoreError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for registry calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

// =============================================================================
// Remote Errors
// =============================================================================

/// Failure category reported by the registry client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Unreachable, timed out, connection reset.
    Network,
    /// Credentials rejected.
    Auth,
    /// 5xx or equivalent.
    Server,
    Unknown,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErrorKind::Network => write!(f, "network"),
            RemoteErrorKind::Auth => write!(f, "auth"),
            RemoteErrorKind::Server => write!(f, "server"),
            RemoteErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Typed failure from a registry call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Registry {kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Auth, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }

    /// Auth failures need a new session; everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, RemoteErrorKind::Auth)
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Sync error type covering all possible engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// An operation needs an owner but no user is signed in.
    #[error("No authenticated user; sign in before registering the device")]
    NotAuthenticated,

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// Registry call failed (intent has been kept locally).
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local persistence failed.
    #[error("Local storage error: {0}")]
    Store(#[from] StoreError),

    /// A value handed over by the platform was rejected.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if retrying later may succeed without user action.
    ///
    /// ## Retryable Errors
    /// - Network, server and unknown registry failures
    /// - Storage contention (pool exhausted, backend unavailable)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Store(StoreError::PoolExhausted | StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns the registry failure kind, if this is a remote error.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            SyncError::Remote(err) => Some(err.kind),
            _ => None,
        }
    }
}

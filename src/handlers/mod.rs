//! Handler builders and associated traits.
//!
//! Provides a small builder API for constructing handlers in a type-safe
//! manner. Each builder implements [`HandlerBuilderTrait`] which returns a
//! shared [`FemtoHandlerTrait`] ready for registration with a logger.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::handler::FemtoHandlerTrait;

pub mod common;
pub mod deferred_builder;
pub mod network_builder;
pub mod stream_builder;

pub use common::HandlerCore;
pub use deferred_builder::DeferredHandlerBuilder;
pub use network_builder::{NetworkHandlerBuilder, WireFormatKind};
pub use stream_builder::StreamHandlerBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// The requested transport is not available on this platform.
    #[error("unsupported transport: {0}")]
    Unsupported(String),
    /// Underlying I/O error whilst creating the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trait implemented by all handler builders.
///
/// Builders return shared [`FemtoHandlerTrait`] objects so the caller can
/// register them without knowing the concrete handler type.
pub trait HandlerBuilderTrait: Send + Sync {
    /// Build the handler instance.
    fn build(&self) -> Result<Arc<dyn FemtoHandlerTrait>, HandlerBuildError>;
}

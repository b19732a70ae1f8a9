//! Async engine compiling local sources on a remote compilation service.
//!
//! The flow: a source-settings event enters the [`pipeline`], which ensures a
//! connected remote compiler list, matches the local toolchain against it
//! (via the `correlation` crate), optionally preprocesses the source with the
//! local compiler, submits the compile request, and rebuilds the
//! source↔assembly indices from the result. Consumers subscribe to the
//! [`events::EventBus`] and query the indices through the
//! [`pipeline::PipelineHandle`].

pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod preprocessor;
pub mod remote;

pub use config::{ExplorerConfig, Filters};
pub use error::ExplorerError;
pub use events::{EventBus, ExplorerEvent};
pub use pipeline::{Pipeline, PipelineHandle, RefreshSignal};
pub use remote::{HttpRemoteClient, RemoteClient};

//! Phase builder — authoring engine for multi-phase campaign workflows:
//! ordered phases and activities, their lock/unlock rules, drag-and-drop
//! ordering and synchronization with the campaign REST API.

pub mod block;
pub mod builder;
pub mod commands;
pub mod conditions;
pub mod dragdrop;
pub mod http;
pub mod lifecycle;
pub mod memory;
pub mod persistence;
pub mod prompt;
pub mod render;
pub mod renumber;
pub mod routes;
pub mod store;
pub mod types;

pub use builder::PhaseBuilder;
pub use commands::{Command, CommandOutcome, Trigger};
pub use dragdrop::DropOutcome;
pub use http::HttpPersistenceClient;
pub use memory::MemoryBackend;
pub use persistence::PersistenceClient;
pub use prompt::{AutoConfirm, UserPrompt};
pub use renumber::RenumberReport;
pub use store::{BlockId, RowId};

//! Message dispatch: send, edit, delete, and recall.

pub mod handler;

pub use handler::MessageDispatcher;

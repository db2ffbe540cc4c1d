//! Type definitions for the persona pipeline
//!
//! Personas and namespaces, scoring feedback, and the conversation log
//! records written alongside every generation run.

mod conversation;
mod feedback;
mod persona;

pub use conversation::*;
pub use feedback::*;
pub use persona::*;

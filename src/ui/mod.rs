//! Terminal UI layer for interactive chat sessions.
//!
//! The UI module owns rendering, layout, keyboard handling, and loop control
//! for the text user interface. [`chat_loop`] runs the main interaction loop
//! that dispatches user input into [`crate::core::orchestrator`] and pumps
//! streaming events from [`crate::core::chat_stream`].
//!
//! Ownership boundary: this layer presents and captures interaction state,
//! while [`crate::core`] owns domain logic and backend coordination.

pub mod chat_loop;

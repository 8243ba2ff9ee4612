//! "Login via X" providers built on the core client.

pub mod fortytwo;
pub mod provider;

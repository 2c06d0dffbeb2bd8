//! Inbox scheduler: books meetings for meeting requests and escalates
//! follow-ups for everything else.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod store;

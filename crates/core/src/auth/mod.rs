//! Authorization sessions: ports and the session service

pub mod ports;
pub mod service;

pub use service::{SessionManager, SessionManagerConfig, SessionStats};

#![deny(unsafe_code)]

pub mod app;
pub mod chat;
pub mod session;
pub mod settings;

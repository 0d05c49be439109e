//! Session orchestration for the multi-account WhatsApp bot.
//!
//! A [`SessionManager`] starts one [`SessionBot`] per enabled session
//! config. Each bot owns one WhatsApp client, tracks readiness from the
//! client's events and routes inbound messages to chat commands or keyword
//! auto-replies.

pub mod access;
pub mod commands;
pub mod directory;
pub mod error;
pub mod followup;
pub mod health;
pub mod manager;
pub mod session;
pub mod state;
pub mod status;

#[cfg(test)]
mod testing;

pub use {
    commands::{CommandDescriptor, CommandRegistry, MessageContext},
    directory::{SessionDirectory, SessionMap},
    error::{Error, Result},
    followup::FollowUps,
    manager::SessionManager,
    session::SessionBot,
    state::SessionPhase,
    status::{SessionStatus, StartupSummary, render_status_panel},
};

//! A Telegram chat-bot that fits a repeating sequence of bead diameters to a target
//! bracelet length. Walks the user through a five-step questionnaire and replies with
//! a bead-count recommendation, honouring a fixed length tolerance.

pub mod config;
pub mod dialogue;
pub mod fit;
pub mod gateway;
pub mod lang;
pub mod server;
pub mod state;
pub mod telegram;

#[doc = include_str!("../README.md")]
#[cfg(doc)]
fn readme() {}

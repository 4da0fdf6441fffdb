//! Voice Coach: a voice-first interview coaching assistant.
//!
//! The user talks to a locally hosted language model persona through
//! onboarding, command navigation, mock interviews and feedback discussion.
//! This crate is the conversation flow controller that sits between the
//! audio, model and storage collaborators:
//!
//! Microphone → STT → controller (session, turn loop, terminator) → LLM → TTS
//!
//! # Architecture
//!
//! - **Controller** ([`controller`]): an actor that owns the [`session::Session`]
//!   and serialises every mode transition.
//! - **Listener manager** ([`controller::listener`]): guarantees a single
//!   microphone-using task at any time.
//! - **Turn engine** ([`dialogue::engine`]): speak → listen → transcribe →
//!   model → end? loop shared by every spoken sub-dialogue.
//! - **Terminator** ([`dialogue::terminator`]): decides when a sub-dialogue
//!   is over.
//! - **Commands** ([`command`]) and **ordinals** ([`ordinal`]): one-shot
//!   classification of navigation commands and list references.
//! - **Collaborators**: [`voice`], [`llm`], [`store`], [`runtime`] and
//!   [`analysis`] define the seams; [`scripted`] provides test doubles.

pub mod analysis;
pub mod command;
pub mod config;
pub mod controller;
pub mod dialogue;
pub mod error;
pub mod llm;
pub mod ordinal;
pub mod persona;
pub mod runtime;
pub mod scripted;
pub mod session;
pub mod store;
pub mod voice;

pub use config::CoachConfig;
pub use controller::{Collaborators, ControllerClient, Successor, controller};
pub use error::{CoachError, Result};
pub use runtime::CoachEvent;
pub use session::{Mode, Session};

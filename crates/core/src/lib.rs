//! Core domain logic for the Madrigal audio engine
//!
//! Everything in this crate is platform-agnostic: DSP effects, the stream
//! session and its state machines, and configuration. Collaborator
//! implementations (voice-activity detection, stream driving) live in the
//! `infra` crate.

pub mod domain;

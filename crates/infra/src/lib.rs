//! Infrastructure implementations for the Madrigal engine
//!
//! Concrete collaborators behind the seams `madrigal-core` defines: a
//! voice-activity detector and the runner that drives a session between an
//! audio source and sink.

pub mod audio;

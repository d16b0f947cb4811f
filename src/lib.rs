//! NexGuard core: the real-time media pipeline and coordination layer of
//! a multi-camera surveillance service — capture, inference, detection
//! events, WebRTC live view, and stored-clip serving. External
//! collaborators (the relational store, authentication, the
//! push-notification backend, the concrete detection model) are supplied
//! by the binary that embeds this library, via the traits in [`traits`].

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod inference;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod ring;
pub mod testing;
pub mod traits;
pub mod webrtc;

pub use config::NexGuardConfig;
pub use error::{NexGuardError, Result};
pub use pipeline::Pipeline;

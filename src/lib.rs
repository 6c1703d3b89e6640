//! Host-side driver for the implant's serial neural-signal link: framing,
//! session/reconnect supervision, a closed-loop FFT seizure classifier, and
//! the public control surface a front end or CLI drives.

pub mod classifier;
pub mod config;
pub mod constants;
pub mod csvlog;
pub mod error;
pub mod events;
pub mod framing;
pub mod packet;
pub mod port;
pub mod queues;
pub mod session;
pub mod supervisor;
mod tasks;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use events::ClientEvent;
pub use session::Status;
pub use supervisor::Supervisor;

#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod config;
pub mod error;
pub mod event;
pub mod external;
pub mod internal;
pub mod message;
mod shared;
pub mod state;
pub mod thread;
pub mod topology;
pub mod transport;

pub use crate::config::{Config, Timing};
pub use crate::error::Error;
pub use crate::event::{Event, Observer};
pub use crate::message::{Ack, Token};
pub use crate::state::{Intent, Status};
pub use crate::thread::intent::Schedule;
pub use crate::topology::Ring;
pub use crate::transport::Transport;

//! Session events and listeners

pub mod event;
pub mod listener;

pub use event::{EventDispatcher, SessionEvent};
pub use listener::{ListenerHandle, ListenerRegistry, SessionListener};

//! Session registry and lifecycle.

mod frame;
mod manager;
pub(crate) mod registry;
mod settings;
mod streams;

pub use self::frame::{CloseCode, ConnectionStatus, Frame, Message};
pub use self::manager::SessionManager;
pub use self::registry::Registry;
pub use self::settings::{ConnectionId, Settings, SettingsBuilder};
pub use self::streams::{FrameStream, StatusStream};

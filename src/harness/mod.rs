//! External HTTP plugin harness
//!
//! Bridges plugins that ship no native code to the host's HTTP server
//! through a helper process and a framed byte-stream channel.
//!
//! - [`buffer`]: bounded rings backing each direction of the channel
//! - [`ipc`]: frame codec and message payloads
//! - [`paths`]: helper binary search path resolution
//! - [`external`]: the harness itself

pub mod buffer;
pub mod external;
pub mod ipc;
pub mod paths;

pub use buffer::{BufferPair, ByteRing, IPC_BUFFER_CAPACITY};
pub use external::{ExternalHttpHarness, HelperClient};
pub use ipc::{Frame, MessageType};
pub use paths::resolve_helper_binary;

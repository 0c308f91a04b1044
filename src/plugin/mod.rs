pub mod protocol;
pub mod server;

pub use protocol::PluginResponse;
pub use server::PluginServer;

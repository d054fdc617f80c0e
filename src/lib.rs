pub mod config;
pub mod console;
pub mod hash;
pub mod network;
pub mod protocol;
pub mod ring;
pub mod store;
pub mod sync;
pub mod types;

// Re-export only what's needed by external users
pub use config::DynamoConfig;
pub use protocol::DynamoNode;
pub use ring::{NodeSpec, Ring, RingNode};
pub use types::{DynamoError, Message, Record};

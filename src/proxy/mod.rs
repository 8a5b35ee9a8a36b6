//! Proxy module
//!
//! Handles request forwarding to the upstream chat APIs.

pub mod client;
pub mod dns;
pub mod flavor;
pub mod handler;
pub mod headers;
pub mod logging;
pub mod stream;

pub use client::{ClientSettings, ConnectionManager, ConnectionPermit};
pub use flavor::{Endpoints, Flavor};
pub use handler::{ForwardResult, ProxyHandler};
pub use headers::HeaderPolicy;
pub use logging::RequestContext;
pub use stream::{RelayStream, StreamEvent, RELAY_BLOCK_SIZE};

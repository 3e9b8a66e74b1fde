pub mod loopback;
pub mod tcp;
pub mod traits;

pub use loopback::{loopback_factory, LoopbackConnection, LoopbackHandle};
pub use tcp::{resolve_ipv4, tcp_connection_factory, TcpConfig, TcpConnection};
pub use traits::{ConnectionFactory, NetworkConnection};

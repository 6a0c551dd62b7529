// Transport module - THE WIRE
// Point-to-point RPC for the gossip exchange: framed TCP for real nodes,
// an in-memory router for tests and simulations

mod memory;
mod tcp;
mod traits;

pub use traits::{GossipTransport, RequestHandler, TransportConfig, TransportError};

pub use memory::MemoryTransport;

pub use tcp::{read_frame, write_frame, TcpServer, TcpTransport, TcpTransportConfig};

// Sync module - HOW NODES TALK
// Wire protocol, the SYN/ACK exchange, self-refresh, and the round scheduler

mod exchange;
mod protocol;
mod refresh;
mod scheduler;

pub use exchange::{
    missing_from, ExchangeReport, ExchangeState, GossipError, GossipTarget, SyncEngine,
};
pub use protocol::{
    decode_peers, encode_peers, AckRequest, AppStateRecord, GeoRecord, HeartbeatRecord,
    PeerRecord, ProtocolError, Request, Response, SynAck, SynRequest,
};
pub use refresh::SelfRefresher;
pub use scheduler::{FailurePolicy, GossipConfig, GossipScheduler, GossipStats, RoundReport};

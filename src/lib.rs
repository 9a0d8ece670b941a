//! mixnode: library entry point. Exposes every module so the binary and
//! integration tests can drive them directly.

pub mod clock;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod eventloop;
pub mod http_client;
pub mod inbound;
pub mod keydir;
pub mod outbound;
pub mod pool;
pub mod seckey_cache;
pub mod smtp;
pub mod storage;

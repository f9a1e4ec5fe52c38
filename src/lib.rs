pub mod codec;
pub mod constants;
pub mod encounter;
pub mod engine;
pub mod gates;
pub mod group;
pub mod realm_list;
pub mod rng;
pub mod save_store;
pub mod scheduler;
pub mod server_utils;
pub mod session;
pub mod types;
pub mod world;
pub mod zones;

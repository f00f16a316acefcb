//! Common utilities and types shared across cargomgr

pub mod config;
pub mod error;
pub mod geohash;
pub mod utils;

pub use self::config::{ManagerConfig, RankOrder, ReplacePolicy};
pub use error::{Error, Result};
pub use utils::{parse_duration, timestamp_now_millis};

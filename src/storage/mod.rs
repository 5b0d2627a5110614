mod store;
mod types;

pub use store::{ConfigStore, StoreError};
pub use types::{Account, AccountUpdate, Config, DEFAULT_ZONE, KNOWN_ZONES};

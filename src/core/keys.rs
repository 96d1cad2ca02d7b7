//! Setting keys and report constants
//!
//! Centralized names shared by the settings resolver, the registry and backends.

/// Flattened setting keys, as handed to a handler after resolution
pub mod setting {
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";

    pub const CONFIRMS_NEEDED: &str = "confirms_needed";
    pub const USE_TRUSTED: &str = "use_trusted";
    pub const STRING_AMT: &str = "string_amt";
}

/// Top-level settings domains (one per RPC family)
pub mod domain {
    pub const COIND_RPC: &str = "COIND_RPC";
}

/// Labels returned by `Manager::get_deposit`
pub mod deposit {
    pub const ADDRESS: &str = "address";
    pub const ACCOUNT: &str = "account";
}

/// Health report cells
pub mod health {
    pub const PLACEHOLDER: &str = "-";

    pub const ONLINE: &str = "Online";
    pub const DEGRADED: &str = "Degraded";
    pub const OFFLINE: &str = "Offline";

    pub const SYMBOL: &str = "Symbol";
    pub const STATUS: &str = "Status";
    pub const BLOCK: &str = "Current Block";
    pub const VERSION: &str = "Version";
    pub const BALANCE: &str = "Wallet Balance";
    pub const PEERS: &str = "P2P Connections";

    pub const COLUMNS: &[&str] = &[SYMBOL, STATUS, BLOCK, VERSION, BALANCE, PEERS];
}

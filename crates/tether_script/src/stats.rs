//! Counter names reported through `Context::counter`

pub const PROXIES_CREATED: &str = "proxies_created";
pub const PROXY_CACHE_HITS: &str = "proxy_cache_hits";
pub const PROXIES_FINALIZED: &str = "proxies_finalized";
pub const DESCRIPTORS_DESTROYED: &str = "descriptors_destroyed";
pub const HANDLES_CREATED: &str = "handles_created";
pub const HANDLES_RECREATED: &str = "handles_recreated";
pub const HANDLES_RELEASED: &str = "handles_released";

pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_SESSION_LOGIN_MS: u64 = 30_000;
    pub const TIMEOUT_LLM_REQUEST_MS: u64 = 30_000;
    pub const USER_AGENT: &str = "APIIntelligencePlatform/1.0";
    pub const FORCED_SCHEME: &str = "https";
    pub const DEFAULT_FAILURE_STATUS: u16 = 500;
    pub const AUTH_FAILURE_STATUS: u16 = 401;
}

pub mod batch {
    pub const BATCH_SIZE: usize = 5;
}

pub mod session {
    pub const TOKEN_TTL_MS: i64 = 30 * 60_000;
    pub const USERNAME_KEY: &str = "username";
    pub const PASSWORD_KEY: &str = "password";
    pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";
}

pub mod history {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;
}

pub mod models {
    pub const DEFAULT_MODEL_KEY: &str = "gemini-3-flash-preview";
}

pub mod buffers {
    pub const CRYPTO_KEY_SIZE: usize = 32;
    pub const CRYPTO_IV_SIZE: usize = 12;
    pub const CRYPTO_TAG_SIZE: usize = 16;
    pub const LOG_VALUE_MAX_CHARS: usize = 2_000;
}

//! JWT claim shape: `sub`, `email`, `name`, `provider`,
//! `iat`, `exp`, `type` (always `"access"` — the gateway never issues
//! refresh tokens).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl AccessClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }
}

//! haveibeenpwned password range lookups.
//!
//! Uses the k-anonymity range API: only the first five characters of the
//! SHA-1 digest leave the server. Lookups can be disabled by config so
//! the suite runs offline.

use sha1::{Digest, Sha1};

use crate::error::{ApiError, ApiResult};

const RANGE_URL: &str = "https://api.pwnedpasswords.com/range/";

pub struct PwnedPasswords {
    enabled: bool,
    base_url: String,
    client: reqwest::Client,
}

impl PwnedPasswords {
    pub fn new(enabled: bool) -> PwnedPasswords {
        PwnedPasswords {
            enabled,
            base_url: RANGE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Whether the password appears in a known breach.
    pub async fn is_breached(&self, password: &str) -> ApiResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let digest = Sha1::digest(password.as_bytes());
        let hex: String = digest.iter().map(|byte| format!("{byte:02X}")).collect();
        let (prefix, suffix) = hex.split_at(5);

        let response = self
            .client
            .get(format!("{}{prefix}", self.base_url))
            .header("Add-Padding", "true")
            .send()
            .await
            .map_err(|err| ApiError::Internal(format!("hibp request failed: {err}")))?;
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Internal(format!("hibp response failed: {err}")))?;

        for line in body.lines() {
            if let Some((candidate, count)) = line.trim().split_once(':') {
                if candidate == suffix && count.trim().parse::<u64>().unwrap_or(0) > 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

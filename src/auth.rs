use rocket::request::{FromRequest, Outcome, Request};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time token comparison for the heartbeat ping endpoint — unlike
/// the admin surface's plain `==` manage-key checks, a timing leak here
/// would let an attacker enumerate heartbeat tokens check-by-check.
pub fn tokens_match(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    a.len() == b.len() && a.ct_eq(b).into()
}

pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_key() -> String {
    format!("wp_{}", hex::encode(rand::random::<[u8; 16]>()))
}

pub fn generate_heartbeat_token() -> String {
    format!("hb_{}", hex::encode(rand::random::<[u8; 16]>()))
}

/// Extract client IP, same precedence the teacher's `ClientIp` guard uses:
/// X-Forwarded-For, then X-Real-Ip, then the socket address.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(xff) = request.headers().get_one("X-Forwarded-For") {
            if let Some(first) = xff.split(',').next() {
                return Outcome::Success(ClientIp(first.trim().to_string()));
            }
        }
        if let Some(real) = request.headers().get_one("X-Real-Ip") {
            return Outcome::Success(ClientIp(real.to_string()));
        }
        let ip = request.client_ip().map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_rejects_mismatched_length() {
        assert!(!tokens_match("abc", "abcd"));
    }

    #[test]
    fn constant_time_compare_accepts_equal_tokens() {
        assert!(tokens_match("hb_deadbeef", "hb_deadbeef"));
    }
}

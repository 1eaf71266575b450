//! Slack request signing (`v0` scheme).
//!
//! Slack signs each delivery with `HMAC-SHA256(signing_secret, "v0:{timestamp}:{body}")`
//! and sends the hex digest as `X-Slack-Signature: v0=<hex>` next to
//! `X-Slack-Request-Timestamp`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Maximum clock skew accepted between the request timestamp and local time.
pub const SLACK_SIGNATURE_MAX_AGE_SECONDS: i64 = 300;

const SIGNATURE_VERSION: &str = "v0";

type HmacSha256 = Hmac<Sha256>;

pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: &str,
    raw_body: &[u8],
    signature: &str,
) -> bool {
    verify_slack_signature_at(
        signing_secret,
        timestamp,
        raw_body,
        signature,
        chrono::Utc::now().timestamp(),
    )
}

pub fn verify_slack_signature_at(
    signing_secret: &str,
    timestamp: &str,
    raw_body: &[u8],
    signature: &str,
    now_unix_seconds: i64,
) -> bool {
    let Ok(request_ts) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    if now_unix_seconds.abs_diff(request_ts) > SLACK_SIGNATURE_MAX_AGE_SECONDS.unsigned_abs() {
        tracing::debug!(request_ts, now_unix_seconds, "slack signature timestamp outside window");
        return false;
    }

    let Some(expected) = slack_signature(signing_secret, timestamp, raw_body) else {
        return false;
    };

    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// Computes the `v0=<hex>` signature Slack would send for this request.
pub fn slack_signature(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).ok()?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    Some(format!(
        "{SIGNATURE_VERSION}={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mut diff = left.len() ^ right.len();
    let max_len = left.len().max(right.len());
    for index in 0..max_len {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        diff |= (l ^ r) as usize;
    }
    diff == 0
}

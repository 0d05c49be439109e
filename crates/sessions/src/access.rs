//! Inbound message gating against the security policy.

use voltron_config::SecurityConfig;

/// Why a message was let through or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Blocked,
    NotAllowed,
    TooLong,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// Decide whether a message from `phone` with `body` may be processed.
///
/// Blocked users always lose. `allowedUsers` containing `all` (or empty)
/// admits everyone else.
pub fn check(phone: &str, body: &str, security: &SecurityConfig) -> AccessDecision {
    if matches_any(phone, &security.blocked_users) {
        return AccessDecision::Blocked;
    }
    let open = security.allowed_users.is_empty()
        || security
            .allowed_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case("all"));
    if !open && !matches_any(phone, &security.allowed_users) {
        return AccessDecision::NotAllowed;
    }
    if body.chars().count() > security.max_message_length {
        return AccessDecision::TooLong;
    }
    AccessDecision::Allowed
}

/// Exact or `*`-glob match of `phone` against any pattern.
pub fn matches_any(phone: &str, patterns: &[String]) -> bool {
    let phone = phone.trim_start_matches('+');
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_start_matches('+');
        if pattern.contains('*') {
            glob_match(pattern, phone)
        } else {
            pattern == phone
        }
    })
}

/// `*` matches any run of characters; the first and last segments are
/// anchored to the ends of `text`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };
    let Some(rest) = text.strip_prefix(*first) else {
        return false;
    };
    let Some(mut rest) = rest.strip_suffix(*last) else {
        return false;
    };
    for part in middle.iter().copied().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

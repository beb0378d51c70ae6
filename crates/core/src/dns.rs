/// Longest name accepted by [`is_dns_label`].
pub const DNS_LABEL_MAX_LEN: usize = 63;

/// RFC 1123 label: `[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?`.
pub fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > DNS_LABEL_MAX_LEN {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_labels() {
        assert!(is_dns_label("nginx-base"));
        assert!(is_dns_label("sglang-v0-5-1"));
        assert!(is_dns_label("123-abc"));
        assert!(is_dns_label("a"));
        assert!(is_dns_label(&"a".repeat(63)));
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!(!is_dns_label("-invalid"));
        assert!(!is_dns_label("invalid-"));
        assert!(!is_dns_label("Has-Upper"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));
        assert!(!is_dns_label("dots.not.allowed"));
        assert!(!is_dns_label("under_score"));
        assert!(!is_dns_label("-"));
    }
}

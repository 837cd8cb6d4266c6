//! Event kinds produced and consumed by the publisher

/// Application metadata (parameterized replaceable)
pub const APP_METADATA: u16 = 32267;

/// Release (parameterized replaceable)
pub const RELEASE: u16 = 30063;

/// Software asset (file metadata)
pub const ASSET: u16 = 3063;

/// Certificate-to-identity proof (parameterized replaceable, one per cert hash)
pub const IDENTITY_PROOF: u16 = 30509;

/// Remote signing request/response envelope
pub const REMOTE_SIGNING: u16 = 24133;

/// Whether the kind is parameterized replaceable (addressed by its `d` tag)
pub fn is_parameterized_replaceable(kind: u16) -> bool {
    (30000..40000).contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaceable_kinds() {
        assert!(is_parameterized_replaceable(APP_METADATA));
        assert!(is_parameterized_replaceable(RELEASE));
        assert!(is_parameterized_replaceable(IDENTITY_PROOF));
        assert!(!is_parameterized_replaceable(ASSET));
        assert!(!is_parameterized_replaceable(REMOTE_SIGNING));
    }
}

// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod history;
pub mod metrics;
pub mod rank;
pub mod rewrite;
pub mod scan;
pub mod search;
pub mod session;

pub use crate::api::{router, AppState};
pub use crate::scan::{ScanReport, Scanner};

/// Short sha256 fingerprint for logs. Raw post text is never logged.
pub(crate) fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = super::fingerprint("Bo Nix is overrated");
        assert_eq!(a.len(), 12);
        assert_eq!(a, super::fingerprint("Bo Nix is overrated"));
        assert_ne!(a, super::fingerprint("Bo Nix is underrated"));
    }
}

use crate::application_port::TokenGenerator;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Mints opaque bearer tokens as 60 lowercase hex characters:
/// node identity (4) + nanosecond timestamp (16) + per-process sequence (8)
/// + 128 random bits (32).
///
/// The node prefix keeps peers from colliding without coordination, the
/// sequence covers tokens minted within one clock tick, and the random
/// suffix makes the value unguessable.
pub struct OpaqueTokenGenerator {
    node_identity: u16,
    sequence: AtomicU32,
}

impl OpaqueTokenGenerator {
    pub fn new(node_identity: u16) -> Self {
        Self {
            node_identity,
            sequence: AtomicU32::new(0),
        }
    }
}

impl TokenGenerator for OpaqueTokenGenerator {
    fn new_token(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut random = [0u8; 16];
        OsRng.fill_bytes(&mut random);
        format!(
            "{:04x}{:016x}{:08x}{}",
            self.node_identity,
            nanos,
            sequence,
            hex::encode(random)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn token_shape() {
        let token = OpaqueTokenGenerator::new(0x2a).new_token();
        assert_eq!(token.len(), 60);
        assert!(token.starts_with("002a"));
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn tokens_are_unique_across_threads_and_nodes() {
        let nodes: Vec<Arc<OpaqueTokenGenerator>> = (0..4)
            .map(|n| Arc::new(OpaqueTokenGenerator::new(n)))
            .collect();
        let handles: Vec<_> = nodes
            .iter()
            .flat_map(|generator| {
                (0..2).map(move |_| {
                    let generator = generator.clone();
                    std::thread::spawn(move || {
                        (0..1_000).map(|_| generator.new_token()).collect::<Vec<_>>()
                    })
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token));
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn same_node_tokens_differ_in_random_part() {
        let generator = OpaqueTokenGenerator::new(1);
        let a = generator.new_token();
        let b = generator.new_token();
        assert_ne!(a[28..], b[28..]);
    }
}

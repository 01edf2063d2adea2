//! Deliberate pacing between navigational actions
//!
//! Pacing is policy, not correctness: the randomized pauses keep the crawl
//! polite toward the source. Zero-width bounds degrade to a no-op so tests
//! run without sleeping.

use rand::Rng;
use std::time::Duration;

/// Randomized bounded pauses between actions and between entities
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    action_ms: [u64; 2],
    entity_ms: [u64; 2],
}

impl Pacer {
    pub fn new(action_ms: [u64; 2], entity_ms: [u64; 2]) -> Self {
        Self {
            action_ms,
            entity_ms,
        }
    }

    /// Pause after a navigational action (filter selection, leaf fetch)
    pub async fn action_pause(&self) {
        pause_between(self.action_ms).await;
    }

    /// Longer pause between entities
    pub async fn entity_pause(&self) {
        pause_between(self.entity_ms).await;
    }
}

async fn pause_between(bounds: [u64; 2]) {
    if bounds[1] == 0 {
        return;
    }
    let millis = if bounds[0] == bounds[1] {
        bounds[0]
    } else {
        rand::thread_rng().gen_range(bounds[0]..=bounds[1])
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Derive a short, stable scope id from a template identifier using CRC32
pub fn get_scope_id(scope: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"template://");
    hasher.update(scope.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential ID generator scoped to one template.
///
/// The counter is persisted with the template so ids never repeat across
/// restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdGenerator {
    seed: String,
    count: u64,
}

impl IdGenerator {
    pub fn new(scope: &str) -> Self {
        Self {
            seed: get_scope_id(scope),
            count: 0,
        }
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential ID with a readable prefix (`snap`, `hero`, ...)
    pub fn new_id(&mut self, prefix: &str) -> String {
        self.count += 1;
        format!("{}-{}-{}", prefix, self.seed, self.count)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

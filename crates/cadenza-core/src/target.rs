// Copyright 2026 the Cadenza Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identity keys for the owners of scheduled work.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of an object that owns scheduled callbacks.
///
/// The scheduler never inspects a target; the id is purely a mapping key
/// with identity equality. Hosts either mint fresh ids with
/// [`TargetId::fresh`] or adopt an id they already have (an entity index, a
/// node handle) via [`TargetId::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Mints an id distinct from every id previously minted in the process.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        TargetId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a host-provided id.
    ///
    /// The caller is responsible for keeping raw ids distinct from each
    /// other; ids minted by [`fresh`](Self::fresh) live in the same space.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        TargetId(raw)
    }

    /// Returns the underlying raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = TargetId::fresh();
        let b = TargetId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn raw_round_trips() {
        let id = TargetId::from_raw(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id, TargetId::from_raw(42));
    }
}

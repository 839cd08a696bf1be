// Copyright 2024 Saptak Santra
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

//! Namespaced logger facade over `tracing`, for external collaborators that
//! don't want to depend on `tracing` directly.

/// A logger scoped to one namespace. Each level maps onto the matching
/// `tracing` macro with `target` set to the namespace.
#[derive(Debug, Clone, Copy)]
pub struct NamespacedLogger {
    namespace: &'static str,
}

impl NamespacedLogger {
    // `tracing`'s `target` must be a compile-time constant, so the
    // namespace travels as a structured field instead; `target` stays
    // fixed at the crate name.
    pub fn trace(&self, msg: &str) {
        tracing::trace!(target: "archetype_ecs", namespace = self.namespace, "{}", msg);
    }

    pub fn info(&self, msg: &str) {
        tracing::info!(target: "archetype_ecs", namespace = self.namespace, "{}", msg);
    }

    pub fn warn(&self, msg: &str) {
        tracing::warn!(target: "archetype_ecs", namespace = self.namespace, "{}", msg);
    }

    pub fn error(&self, msg: &str) {
        tracing::error!(target: "archetype_ecs", namespace = self.namespace, "{}", msg);
    }

    /// `tracing` has no critical level; this logs at `error` with a marker
    /// field so collectors can still distinguish it.
    pub fn critical(&self, msg: &str) {
        tracing::error!(target: "archetype_ecs", namespace = self.namespace, critical = true, "{}", msg);
    }
}

/// The process-wide logger factory. `World` and plugins hand out namespaced
/// loggers from this rather than calling `tracing` macros with a literal
/// target, so callers outside this crate have the same facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLogger;

impl DefaultLogger {
    pub fn get_namespaced_logger(&self, namespace: &'static str) -> NamespacedLogger {
        NamespacedLogger { namespace }
    }
}

pub fn default_logger() -> DefaultLogger {
    DefaultLogger
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_logger_carries_its_namespace() {
        let logger = default_logger().get_namespaced_logger("ecs.world");
        assert_eq!(logger.namespace, "ecs.world");
        logger.info("hello");
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Names of the live channels every stored entry is published on.

use crate::severity::Severity;

/// Receives every stored entry.
pub const GLOBAL: &str = "/topic/logs";

/// Channel carrying the entries of one producer.
#[must_use]
pub fn for_service(service: &str) -> String {
    format!("{GLOBAL}/{service}")
}

/// Channel carrying the entries of one severity.
#[must_use]
pub fn for_level(severity: Severity) -> String {
    format!("{GLOBAL}/level/{severity}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(for_service("auth"), "/topic/logs/auth");
        assert_eq!(for_level(Severity::Error), "/topic/logs/level/ERROR");
    }
}

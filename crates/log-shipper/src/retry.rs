// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// What to do with a batch whose send just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Push the batch back at the front of the queue.
    Requeue,
    /// Discard the batch.
    Drop,
}

/// Counts consecutive failed flushes for one shipper.
///
/// The counter is not tied to a particular batch: every failure increments
/// it, and the failure that brings it to `max_retries` drops whatever batch
/// was in flight and starts over from zero. A successful flush also resets
/// it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    failures: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            failures: 0,
        }
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures < self.max_retries {
            RetryDecision::Requeue
        } else {
            self.failures = 0;
            RetryDecision::Drop
        }
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

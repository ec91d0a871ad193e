//! # Instance-Propagation Policy
//!
//! When a repoint touches a file shared by several nodes, the index asks a
//! `PropagationPolicy` whether the change applies to the whole instance
//! group. The index never blocks on UI: the decision is injected.
//!
//! `CachedPolicy` wraps a `PropagationPrompt` and remembers its answer for
//! a configurable scope. `Cancel` is never remembered.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// =============================================================================
// DECISIONS
// =============================================================================

/// Answer to a propagation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Apply to every node sharing the file.
    All,
    /// Apply to the triggering node only.
    Single,
    /// Abort the operation. Only honoured when the request is cancellable.
    Cancel,
}

/// How long a prompted answer stays valid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PropagationScope {
    /// Prompt every time.
    #[default]
    Ask,
    /// Reuse the answer inside a time window.
    TimeBoxed,
    /// Reuse the answer for the lifetime of the policy.
    Session,
    /// Reuse the answer and expose it for the caller to persist.
    Permanent,
}

/// What the policy is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationRequest<'a> {
    /// Node that triggered the change, or the first node of a selection.
    pub node: &'a str,
    /// Path of the shared file.
    pub file: &'a str,
    /// Number of nodes sharing the file.
    pub instance_count: u64,
    /// False on the attribute-changed path, where the change already happened.
    pub cancellable: bool,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Source of fresh answers, typically a dialog.
pub trait PropagationPrompt {
    fn ask(&mut self, request: &PropagationRequest<'_>) -> Propagation;
}

impl<F> PropagationPrompt for F
where
    F: FnMut(&PropagationRequest<'_>) -> Propagation,
{
    fn ask(&mut self, request: &PropagationRequest<'_>) -> Propagation {
        self(request)
    }
}

/// Decision maker consulted by the index.
pub trait PropagationPolicy {
    fn decide(&mut self, request: &PropagationRequest<'_>) -> Propagation;
}

// =============================================================================
// FIXED POLICY
// =============================================================================

/// Always gives the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy(pub Propagation);

impl PropagationPolicy for FixedPolicy {
    fn decide(&mut self, request: &PropagationRequest<'_>) -> Propagation {
        sanitize(self.0, request)
    }
}

fn sanitize(answer: Propagation, request: &PropagationRequest<'_>) -> Propagation {
    if answer == Propagation::Cancel && !request.cancellable {
        Propagation::Single
    } else {
        answer
    }
}

// =============================================================================
// CACHED POLICY
// =============================================================================

/// Prompts through `P` and caches the answer for `scope`.
#[derive(Debug, Clone)]
pub struct CachedPolicy<P> {
    prompt: P,
    scope: PropagationScope,
    window: Duration,
    cached: Option<(Propagation, Instant)>,
}

impl<P: PropagationPrompt> CachedPolicy<P> {
    #[must_use]
    pub fn new(prompt: P, scope: PropagationScope, window: Duration) -> Self {
        Self {
            prompt,
            scope,
            window,
            cached: None,
        }
    }

    /// Seed a previously persisted answer.
    #[must_use]
    pub fn with_remembered(mut self, answer: Propagation) -> Self {
        if answer != Propagation::Cancel {
            self.cached = Some((answer, Instant::now()));
        }
        self
    }

    /// Answer worth persisting, if the scope is permanent.
    #[must_use]
    pub fn remembered(&self) -> Option<Propagation> {
        match (self.scope, self.cached) {
            (PropagationScope::Permanent, Some((answer, _))) => Some(answer),
            _ => None,
        }
    }

    #[must_use]
    pub const fn scope(&self) -> PropagationScope {
        self.scope
    }

    /// Change the scope. Any cached answer is dropped.
    pub fn set_scope(&mut self, scope: PropagationScope) {
        self.scope = scope;
        self.cached = None;
    }

    pub fn forget(&mut self) {
        self.cached = None;
    }

    /// Decide as of `now`.
    pub fn decide_at(&mut self, request: &PropagationRequest<'_>, now: Instant) -> Propagation {
        if let Some((answer, at)) = self.cached {
            let valid = match self.scope {
                PropagationScope::Ask => false,
                PropagationScope::TimeBoxed => now.saturating_duration_since(at) < self.window,
                PropagationScope::Session | PropagationScope::Permanent => true,
            };
            if valid {
                return sanitize(answer, request);
            }
        }

        let answer = sanitize(self.prompt.ask(request), request);
        self.cached = match (self.scope, answer) {
            (PropagationScope::Ask, _) | (_, Propagation::Cancel) => None,
            _ => Some((answer, now)),
        };
        answer
    }
}

impl<P: PropagationPrompt> PropagationPolicy for CachedPolicy<P> {
    fn decide(&mut self, request: &PropagationRequest<'_>) -> Propagation {
        self.decide_at(request, Instant::now())
    }
}

// =============================================================================
// TESTS
// =============================================================================

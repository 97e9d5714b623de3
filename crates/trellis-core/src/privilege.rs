//! Scope-typed privilege sets.
//!
//! A privilege set holds tokens from a fixed per-scope vocabulary. The scope
//! is a type parameter, so comparing an instance set with a workspace set is
//! a compile error; [`AnyPrivilegeSet`] covers the cases where the scope is
//! only known at runtime and reports a [`PrivilegeError::ScopeMismatch`].
//!
//! Sets persist in the relational store as array literals (`{a,b}`).

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use thiserror::Error;
use tracing::trace;

pub const CREATE_USER: &str = "create_user";
pub const CREATE_SPACE: &str = "create_space";
pub const SUPER: &str = "super";

pub const CONTRIBUTOR: &str = "contributor";
pub const EDITOR: &str = "editor";
pub const MODERATOR: &str = "moderator";
pub const ADMIN: &str = "admin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("cannot compare {left} privileges with {right} privileges")]
    ScopeMismatch {
        left: &'static str,
        right: &'static str,
    },
}

/// A privilege scope: its vocabulary, bypass token and grant rule.
pub trait PrivilegeScope: Copy + Eq + Hash + Default + fmt::Debug + 'static {
    const NAME: &'static str;

    /// Tokens in canonical order
    const VOCABULARY: &'static [&'static str];

    /// Token that grants every action in the scope
    const BYPASS: &'static str;

    /// What a holder without the bypass token may grant to others.
    fn ordinary_grants(held: PrivilegeSet<Self>) -> PrivilegeSet<Self>;
}

/// Instance-wide privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceScope;

impl PrivilegeScope for InstanceScope {
    const NAME: &'static str = "instance";
    const VOCABULARY: &'static [&'static str] = &[CREATE_USER, CREATE_SPACE, SUPER];
    const BYPASS: &'static str = SUPER;

    fn ordinary_grants(held: PrivilegeSet<Self>) -> PrivilegeSet<Self> {
        held
    }
}

/// Per-workspace privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorkspaceScope;

impl PrivilegeScope for WorkspaceScope {
    const NAME: &'static str = "workspace";
    const VOCABULARY: &'static [&'static str] = &[CONTRIBUTOR, EDITOR, MODERATOR, ADMIN];
    const BYPASS: &'static str = ADMIN;

    fn ordinary_grants(_held: PrivilegeSet<Self>) -> PrivilegeSet<Self> {
        PrivilegeSet::new()
    }
}

/// A set of privilege tokens in scope `S`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrivilegeSet<S: PrivilegeScope> {
    bits: u8,
    scope: PhantomData<S>,
}

pub type InstancePrivilegeSet = PrivilegeSet<InstanceScope>;
pub type WorkspacePrivilegeSet = PrivilegeSet<WorkspaceScope>;

impl<S: PrivilegeScope> PrivilegeSet<S> {
    pub fn new() -> Self {
        Self {
            bits: 0,
            scope: PhantomData,
        }
    }

    /// Every token in the vocabulary.
    pub fn full() -> Self {
        Self {
            bits: (1u8 << S::VOCABULARY.len()) - 1,
            scope: PhantomData,
        }
    }

    /// Build a set from tokens. Tokens outside the vocabulary are dropped.
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set = Self::new();
        for token in tokens {
            set.add(token.as_ref());
        }
        set
    }

    /// Parse the `{a,b}` literal form. Blank input yields the empty set.
    pub fn from_literal(literal: &str) -> Self {
        let inner: String = literal
            .trim_matches(|c| c == ' ' || c == '{' || c == '}')
            .chars()
            .filter(|c| *c != ' ')
            .collect();
        Self::from_tokens(inner.split(',').filter(|t| !t.is_empty()))
    }

    fn bit(token: &str) -> Option<u8> {
        S::VOCABULARY
            .iter()
            .position(|t| *t == token)
            .map(|i| 1u8 << i)
    }

    /// Add a token; returns whether it belongs to the vocabulary.
    pub fn add(&mut self, token: &str) -> bool {
        match Self::bit(token) {
            Some(bit) => {
                self.bits |= bit;
                true
            }
            None => {
                trace!("Dropping unknown {} privilege '{}'", S::NAME, token);
                false
            }
        }
    }

    pub fn remove(&mut self, token: &str) {
        if let Some(bit) = Self::bit(token) {
            self.bits &= !bit;
        }
    }

    pub fn has(&self, token: &str) -> bool {
        Self::bit(token).is_some_and(|bit| self.bits & bit != 0)
    }

    /// True if the sets share at least one token.
    pub fn has_any(&self, other: &Self) -> bool {
        self.bits & other.bits != 0
    }

    /// True if every token of `other` is held.
    pub fn has_all(&self, other: &Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn holds_bypass(&self) -> bool {
        self.has(S::BYPASS)
    }

    /// Privileges this holder may grant to others.
    pub fn grantable_subset(&self) -> Self {
        if self.holds_bypass() {
            Self::full()
        } else {
            S::ordinary_grants(*self)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Tokens in canonical vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        S::VOCABULARY
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bits & (1u8 << i) != 0)
            .map(|(_, t)| *t)
    }

    pub fn to_literal(&self) -> String {
        format!("{{{}}}", self.iter().collect::<Vec<_>>().join(","))
    }

    pub fn scope_name(&self) -> &'static str {
        S::NAME
    }
}

impl<S: PrivilegeScope> fmt::Display for PrivilegeSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl<S: PrivilegeScope> fmt::Debug for PrivilegeSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivilegeSet<{}>{}", S::NAME, self.to_literal())
    }
}

impl<S: PrivilegeScope, T: AsRef<str>> FromIterator<T> for PrivilegeSet<S> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}

/// A privilege set whose scope is only known at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyPrivilegeSet {
    Instance(InstancePrivilegeSet),
    Workspace(WorkspacePrivilegeSet),
}

impl AnyPrivilegeSet {
    pub fn scope_name(&self) -> &'static str {
        match self {
            AnyPrivilegeSet::Instance(_) => InstanceScope::NAME,
            AnyPrivilegeSet::Workspace(_) => WorkspaceScope::NAME,
        }
    }

    fn mismatch(&self, other: &Self) -> PrivilegeError {
        PrivilegeError::ScopeMismatch {
            left: self.scope_name(),
            right: other.scope_name(),
        }
    }

    pub fn try_eq(&self, other: &Self) -> Result<bool, PrivilegeError> {
        match (self, other) {
            (AnyPrivilegeSet::Instance(a), AnyPrivilegeSet::Instance(b)) => Ok(a == b),
            (AnyPrivilegeSet::Workspace(a), AnyPrivilegeSet::Workspace(b)) => Ok(a == b),
            _ => Err(self.mismatch(other)),
        }
    }

    pub fn try_has_all(&self, other: &Self) -> Result<bool, PrivilegeError> {
        match (self, other) {
            (AnyPrivilegeSet::Instance(a), AnyPrivilegeSet::Instance(b)) => Ok(a.has_all(b)),
            (AnyPrivilegeSet::Workspace(a), AnyPrivilegeSet::Workspace(b)) => Ok(a.has_all(b)),
            _ => Err(self.mismatch(other)),
        }
    }
}

impl From<InstancePrivilegeSet> for AnyPrivilegeSet {
    fn from(set: InstancePrivilegeSet) -> Self {
        AnyPrivilegeSet::Instance(set)
    }
}

impl From<WorkspacePrivilegeSet> for AnyPrivilegeSet {
    fn from(set: WorkspacePrivilegeSet) -> Self {
        AnyPrivilegeSet::Workspace(set)
    }
}

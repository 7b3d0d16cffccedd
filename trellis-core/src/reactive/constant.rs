//! A value that never changes.
//!
//! Useful where an API takes any [`ReadSignal`] but the caller has nothing
//! reactive to pass. A constant has no node, no links, and no versions.

use super::ReadSignal;
use crate::error::Result;

/// A read-only value with the same reading surface as a signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constant<T>(T);

impl<T> Constant<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Clone> ReadSignal<T> for Constant<T> {
    fn read(&self) -> Result<T> {
        Ok(self.get())
    }
}

impl<T> From<T> for Constant<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

/// Shorthand for [`Constant::new`].
pub fn constant<T>(value: T) -> Constant<T> {
    Constant::new(value)
}

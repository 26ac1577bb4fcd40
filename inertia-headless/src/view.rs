//! Capability seams: loading components by name and swapping them into the view.

use std::collections::HashSet;

use async_trait::async_trait;
use inertia_core::Page;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewError {
    #[error("component {0:?} not found")]
    NotFound(String),
    #[error("swap rejected: {0}")]
    Rejected(String),
}

/// Loads the component for a page.
#[async_trait]
pub trait ComponentResolver: Send + Sync {
    type Component: Send;

    async fn resolve(&self, name: &str) -> Result<Self::Component, ViewError>;
}

/// Renders a resolved component.
#[async_trait]
pub trait View<C: Send>: Send {
    async fn swap(&mut self, component: C, page: &Page, preserve_state: bool) -> Result<(), ViewError>;
}

/// Resolves every name to itself, or only names from a fixed set.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    known: Option<HashSet<String>>,
}

impl NameResolver {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(names.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl ComponentResolver for NameResolver {
    type Component = String;

    async fn resolve(&self, name: &str) -> Result<String, ViewError> {
        match &self.known {
            Some(known) if !known.contains(name) => Err(ViewError::NotFound(name.to_string())),
            _ => Ok(name.to_string()),
        }
    }
}

/// One swap performed by [`RecordingView`].
#[derive(Debug, Clone, PartialEq)]
pub struct Swapped {
    pub component: String,
    pub page: Page,
    pub preserve_state: bool,
}

/// Keeps every swap; the last one is what is on screen.
#[derive(Debug, Default)]
pub struct RecordingView {
    swaps: Vec<Swapped>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swaps(&self) -> &[Swapped] {
        &self.swaps
    }

    pub fn current(&self) -> Option<&Swapped> {
        self.swaps.last()
    }
}

#[async_trait]
impl View<String> for RecordingView {
    async fn swap(&mut self, component: String, page: &Page, preserve_state: bool) -> Result<(), ViewError> {
        self.swaps.push(Swapped {
            component,
            page: page.clone(),
            preserve_state,
        });
        Ok(())
    }
}

//! Browsing surface abstraction
//!
//! The automation engine talks to exactly one interactive page through the
//! `Surface` trait. A surface is either owned (launched by us, closed by us) or
//! attached (an existing page the user is looking at, never navigated on
//! setup and never closed).

use async_trait::async_trait;
use thiserror::Error;

use super::scripts::PageScript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOwnership {
    Owned,
    Attached,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Target surface not found: {0}")]
    TargetNotFound(String),

    #[error("Surface closed")]
    Closed,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

impl SurfaceError {
    /// Fatal errors mean the surface is gone; retrying on it is pointless
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::TargetNotFound(_) | Self::Closed)
    }
}

#[async_trait]
pub trait Surface: Send + Sync {
    fn id(&self) -> &str;

    fn ownership(&self) -> SurfaceOwnership;

    fn is_alive(&self) -> bool;

    async fn evaluate(&self, script: &PageScript) -> Result<serde_json::Value, SurfaceError>;

    /// Navigates and waits for the load to settle
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;

    async fn reload(&self) -> Result<(), SurfaceError>;

    async fn current_url(&self) -> Result<Option<String>, SurfaceError>;

    /// Tears down an owned surface
    async fn close(&self) -> Result<(), SurfaceError>;

    /// Lets go of an attached surface, leaving the page as the user sees it
    async fn detach(&self) -> Result<(), SurfaceError> {
        Ok(())
    }
}

#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Surface>, SurfaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SurfaceError::Launch("x".into()), true)]
    #[case(SurfaceError::TargetNotFound("x".into()), true)]
    #[case(SurfaceError::Closed, true)]
    #[case(SurfaceError::Navigation("x".into()), false)]
    #[case(SurfaceError::Script("x".into()), false)]
    fn test_fatal_classification(#[case] error: SurfaceError, #[case] fatal: bool) {
        assert_eq!(error.is_fatal(), fatal);
    }
}

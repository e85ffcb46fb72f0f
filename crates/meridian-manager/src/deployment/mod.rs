//! Deployment orchestration and lifecycle management.
//!
//! This module coordinates the application lifecycle from descriptor
//! registration through instance creation and the hand-off to the platform
//! scheduler, plus the connection operations between running instances.

mod checker;
pub mod expansion;
mod manager;

pub use checker::ConnectionChecker;
pub use manager::ApplicationManager;

//! Common type aliases used throughout the application.

use crate::core::NotificationHandler;
use std::sync::Arc;

pub type SharedHandler = Arc<dyn NotificationHandler>;

pub mod api_router;
pub mod auth;
pub mod config;
pub mod newsletter;
pub mod notifier;
pub mod shared;
pub mod support;
pub mod tenant;
pub mod validation;

//! Application assembly.
//!
//! - **`resources`**: store backends (in-memory or `PostgreSQL`) and their
//!   readiness probes
//! - **`components`**: the four core components wired bottom-up
//! - **`builder`**: the declarative [`ApplicationBuilder`]
//!
//! # Example
//!
//! ```rust,ignore
//! ApplicationBuilder::new()
//!     .with_config(Config::from_env()?)
//!     .with_resources().await?
//!     .with_collaborators()?
//!     .build().await?
//!     .run().await?;
//! ```

pub mod builder;
pub mod components;
pub mod resources;

pub use builder::ApplicationBuilder;
pub use components::Components;
pub use resources::Resources;

//! Standard APIs we use everywhere.

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::Duration;

pub use anyhow::{Context as _, Result, anyhow};
#[allow(unused_imports)]
pub use tracing::{debug, error, info, instrument, trace, warn};

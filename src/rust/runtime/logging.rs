// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::{
    Logger,
    LoggerHandle,
};
use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features. `RUST_LOG` takes precedence over `fallback_spec`.
pub fn initialize(fallback_spec: &str) {
    INIT_LOG.call_once(|| {
        match Logger::try_with_env_or_str(fallback_spec).and_then(|logger: Logger| logger.start()) {
            // The handle flushes and shuts the logger down when dropped.
            Ok(handle) => ::std::mem::forget::<LoggerHandle>(handle),
            Err(e) => eprintln!("initialize(): cannot start logger (error={:?})", e),
        }
    });
}

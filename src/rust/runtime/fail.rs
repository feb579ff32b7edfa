// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::libc::{
    c_int,
    EINVAL,
    EIO,
};
use ::std::{
    error,
    fmt,
    io,
};

//==============================================================================
// Structures
//==============================================================================

/// Failure
///
/// Carried up a thread's frame stack as the error half of an [crate::runtime::result::Outcome]. The traceback lists
/// the names of the coroutine frames the failure unwound through, innermost first. Scheduler internals never show up
/// in it.
#[derive(Clone, PartialEq, Eq)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
    /// Names of the application frames this failure propagated through.
    pub traceback: Vec<String>,
    /// Failure that caused this one, if any.
    pub source: Option<Box<Fail>>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
            traceback: Vec::new(),
            source: None,
        }
    }

    /// Chains `source` as the cause of this failure.
    pub fn with_source(mut self, source: Fail) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Records that this failure unwound through the frame named `frame`.
    pub fn push_frame(&mut self, frame: &str) {
        self.traceback.push(frame.to_string());
    }

    /// Iterates over this failure and every failure in its cause chain.
    pub fn chain(&self) -> impl Iterator<Item = &Fail> {
        ::std::iter::successors(Some(self), |fail: &&Fail| fail.source.as_deref())
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)?;
        if !self.traceback.is_empty() {
            write!(f, " (traceback={:?})", self.traceback)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {:?}", source)?;
        }
        Ok(())
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source.as_deref().map(|fail: &Fail| fail as &(dyn error::Error + 'static))
    }
}

/// Conversion Trait Implementation for Fail
impl From<io::Error> for Fail {
    fn from(e: io::Error) -> Self {
        Self::new(e.raw_os_error().unwrap_or(EIO), &e.to_string())
    }
}

impl From<::yaml_rust::ScanError> for Fail {
    fn from(e: ::yaml_rust::ScanError) -> Self {
        Self::new(EINVAL, &format!("malformed configuration: {}", e))
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

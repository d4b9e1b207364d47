//! # hashrec testkit
//!
//! Test utilities for hashrec:
//! - fixtures that wire a [`Database`](hashrec_core::Database) to an
//!   in-memory server the test can inspect and tamper with
//! - connectors that fail on purpose, for retry tests
//! - proptest strategies for field values and ids
//!
//! ```
//! use hashrec_testkit::prelude::*;
//!
//! let ctx = TestContext::new();
//! let model = ctx.test_model();
//! let mut record = test_record(&model, "a", 1, 0.5);
//! ctx.db.add(&mut record, false).unwrap();
//! assert_eq!(ctx.raw_keys(15).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

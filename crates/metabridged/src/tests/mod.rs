//! Test suites for the metabridge daemon.

pub(crate) mod support;

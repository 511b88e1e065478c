//! Consolidated integration tests for trustd-revocation.
//!
//! Single external test binary so the SQLite-backed scenarios share one
//! compilation unit and never contend on parallel test-file linking.

mod update_flow;

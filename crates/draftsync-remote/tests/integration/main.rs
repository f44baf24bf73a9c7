//! Integration tests for draftsync-remote
//!
//! Uses wiremock to simulate the remote HTTP API and verifies uploads,
//! pulls, the session check and fault mapping end to end.

mod common;

mod test_pulls;
mod test_session;
mod test_upload;

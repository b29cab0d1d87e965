//! Periodic cloud config fetching
//!
//! [`agent::ConfigPoller`] runs one fetch cycle at a time and returns a
//! [`agent::ConfigUpdate`] plus a jittered wait. The owner of the config
//! applies the update and sleeps before polling again.

pub mod agent;
pub mod live;

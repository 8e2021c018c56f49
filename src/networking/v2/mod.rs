//! Networking API v2.0.

pub mod subnets;

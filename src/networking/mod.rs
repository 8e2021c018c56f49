//! Networking service (neutron) resources.

pub mod v2;

//! Libvirt control plane.
//!
//! Requires the `libvirt` feature to be enabled and the system to have
//! libvirt installed.

mod connection;

pub use connection::LibvirtControlPlane;

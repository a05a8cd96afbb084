//! The five pipeline services: resource provisioning, instance launch,
//! payload staging, job monitoring, and the lifecycle controller that
//! sequences them.

pub mod launch;
pub mod monitor;
pub mod pipeline;
pub mod provision;
pub mod stage;

#[cfg(test)]
pub(crate) mod test_support;

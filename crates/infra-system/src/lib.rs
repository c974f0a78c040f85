// suterm Infrastructure - System Adapters
// Implements: ProcessRunner, ResourceProbe; PATH lookups for the dependency check and root method detection

pub mod dependency_check;
pub mod resource_probe_impl;
pub mod subprocess_runner;

pub use dependency_check::{
    check_dependencies, detect_privilege_wrapper, find_in_path, DependencyReport, REQUIRED_TOOLS,
    ROOT_METHODS,
};
pub use resource_probe_impl::SysinfoResourceProbe;
pub use subprocess_runner::{is_alive, SubprocessRunner};

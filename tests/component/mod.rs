/// Component tests for the harness
/// Tests individual components that need external resources (a Docker daemon)
pub mod containerized_backend;
pub mod docker;

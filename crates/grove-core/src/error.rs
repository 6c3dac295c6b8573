use thiserror::Error;

/// Top-level error type for the Grove physics integration.
#[derive(Debug, Error)]
pub enum GroveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),
}

/// Invalid simulation parameters.
///
/// Always raised before any native resource is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid update_rate_hz: {0} (must be > 0)")]
    InvalidUpdateRate(i32),

    #[error("Invalid solver_iterations: {0} (must be >= 1)")]
    InvalidSolverIterations(i32),

    #[error("Invalid thread_count: {0} (must be >= 0, 0 selects automatically)")]
    InvalidThreadCount(i32),

    #[error("max_substeps must be >= 1")]
    ZeroMaxSubsteps,
}

/// An operation referenced a native handle that is not live.
///
/// Body property accessors swallow these into neutral defaults; lifecycle
/// operations (body creation, joint creation) surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Simulation context has not been started")]
    ContextNotLive,

    #[error("Native body {0} is not live")]
    BodyNotLive(u64),

    #[error("Native shape {0} is not live")]
    ShapeNotLive(u64),

    #[error("Scene node {0} does not exist")]
    NodeNotFound(u32),

    #[error("Scene node {0} carries no rigid body descriptor")]
    NotABody(u32),

    #[error("Scene node {0} already has a registered body")]
    AlreadyRegistered(u32),

    #[error("Shape geometry is degenerate: {0}")]
    DegenerateShape(&'static str),
}

/// The native layer could not allocate a resource. Unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Failed to allocate simulation context")]
    Context,

    #[error("Failed to allocate rigid body")]
    Body,

    #[error("Failed to allocate collision shape")]
    Shape,

    #[error("Failed to allocate joint")]
    Joint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grove_error_from_config_error() {
        let err = ConfigError::InvalidUpdateRate(-5);
        let grove_err: GroveError = err.into();
        assert!(matches!(grove_err, GroveError::Config(_)));
        assert!(grove_err.to_string().contains("-5"));
    }

    #[test]
    fn grove_error_from_resource_error() {
        let grove_err: GroveError = ResourceError::ContextNotLive.into();
        assert!(matches!(grove_err, GroveError::Resource(_)));
        assert!(grove_err.to_string().contains("not been started"));
    }

    #[test]
    fn grove_error_from_allocation_error() {
        let grove_err: GroveError = AllocationError::Body.into();
        assert!(matches!(grove_err, GroveError::Allocation(_)));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidUpdateRate(0).to_string(),
            "Invalid update_rate_hz: 0 (must be > 0)"
        );
        assert_eq!(
            ConfigError::InvalidSolverIterations(0).to_string(),
            "Invalid solver_iterations: 0 (must be >= 1)"
        );
        assert_eq!(
            ConfigError::ZeroMaxSubsteps.to_string(),
            "max_substeps must be >= 1"
        );
    }

    #[test]
    fn resource_error_display_messages() {
        assert_eq!(
            ResourceError::BodyNotLive(7).to_string(),
            "Native body 7 is not live"
        );
        assert_eq!(
            ResourceError::NotABody(3).to_string(),
            "Scene node 3 carries no rigid body descriptor"
        );
        assert_eq!(
            ResourceError::DegenerateShape("empty hull").to_string(),
            "Shape geometry is degenerate: empty hull"
        );
    }

    #[test]
    fn resource_error_is_copy() {
        let err = ResourceError::ShapeNotLive(1);
        let err2 = err;
        assert_eq!(err, err2);
    }
}

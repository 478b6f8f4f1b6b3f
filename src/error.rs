//! Error types for graph construction, compilation, realization and execution.
//!
//! The taxonomy mirrors how failures are treated at runtime:
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`GraphError`] | setup / compile | fatal, the graph cannot run |
//! | [`RealizeError`] | lazy resource construction | frame aborted before any submission |
//! | [`PassError`] | execute callbacks | logged, the frame continues degraded |
//! | [`DeviceError`] | device collaborator | surfaced through the two above |

use thiserror::Error;

/// Errors detected while declaring or compiling a render graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("resource '{0}' is already declared")]
    DuplicateResource(String),
    #[error("pass '{0}' is already declared")]
    DuplicatePass(String),
    #[error("pass '{pass}' accesses undeclared resource '{resource}'")]
    UndeclaredResource { pass: String, resource: String },
    #[error("pass '{0}' declares no reads, writes or creates")]
    EmptyPass(String),
    #[error("invalid pass handle: {0}")]
    InvalidPassHandle(u32),
    #[error("resource '{0}' is not declared")]
    UnknownResource(String),
    #[error("resource '{0}' is not an external resource")]
    NotExternal(String),
    #[error("invalid resource handle: {0}")]
    InvalidResourceHandle(u32),
    #[error("resource '{resource}' is not of type {expected}")]
    ResourceTypeMismatch {
        resource: String,
        expected: &'static str,
    },
    #[error("pass '{0}' cannot depend on itself")]
    SelfDependency(String),
    #[error("render graph contains a cyclic dependency between passes: {}", .passes.join(", "))]
    CyclicDependency { passes: Vec<String> },
    #[error("pass '{pass}' reads resource '{resource}' which no live pass produces")]
    UnresolvedRead { resource: String, pass: String },
}

impl GraphError {
    /// Logging category of this error.
    pub fn category(&self) -> &'static str {
        match self {
            Self::CyclicDependency { .. } | Self::UnresolvedRead { .. } => "compile",
            _ => "construction",
        }
    }
}

/// Failures reported by the device collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("GPU device lost")]
    DeviceLost,
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    #[error("command submission failed: {0}")]
    SubmissionFailed(String),
}

/// Failures while turning a resource descriptor into a device object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealizeError {
    #[error("no factory registered for resource '{resource}' ({kind} from {descriptor})")]
    NoFactory {
        resource: String,
        descriptor: String,
        kind: String,
    },
    #[error("failed to realize resource '{resource}' ({descriptor}): {source}")]
    Device {
        resource: String,
        descriptor: String,
        #[source]
        source: DeviceError,
    },
    #[error("factory for resource '{resource}' produced an object of the wrong type")]
    TypeMismatch { resource: String },
    #[error("external resource '{0}' has no value")]
    MissingExternal(String),
}

impl RealizeError {
    /// Name of the resource that failed to realize.
    pub fn resource(&self) -> &str {
        match self {
            Self::NoFactory { resource, .. }
            | Self::Device { resource, .. }
            | Self::TypeMismatch { resource } => resource,
            Self::MissingExternal(resource) => resource,
        }
    }
}

/// Outcome of a failed execute callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// The pass is gated on state that is not ready yet and stays pending.
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("{0}")]
    Failed(String),
    #[error("recording thread panicked: {0}")]
    Panicked(String),
    #[error("resource '{0}' is not realized")]
    MissingResource(String),
    #[error("resource '{0}' was requested with the wrong type")]
    TypeMismatch(String),
    #[error("resource '{0}' was not declared by this pass")]
    UndeclaredAccess(String),
}

/// Errors that abort a whole frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("graph compilation failed: {0}")]
    Compile(#[from] GraphError),
    #[error("resource realization failed: {0}")]
    Realize(#[from] RealizeError),
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::UnresolvedRead {
            resource: "GBuffer".into(),
            pass: "Lighting".into(),
        };
        assert_eq!(
            err.to_string(),
            "pass 'Lighting' reads resource 'GBuffer' which no live pass produces"
        );
        assert_eq!(err.category(), "compile");

        let err = GraphError::CyclicDependency {
            passes: vec!["A".into(), "B".into()],
        };
        assert_eq!(
            err.to_string(),
            "render graph contains a cyclic dependency between passes: A, B"
        );
    }

    #[test]
    fn test_realize_error_wraps_device_error() {
        let err = RealizeError::Device {
            resource: "HDROutput".into(),
            descriptor: "texture 1920x1080 Rgba16Float".into(),
            source: DeviceError::OutOfMemory,
        };
        assert_eq!(err.resource(), "HDROutput");
        let frame: FrameError = err.into();
        assert!(frame.to_string().contains("out of GPU memory"));
    }
}

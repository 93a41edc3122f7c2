//! Per-session creation parameters.
//!
//! A [`DataLoaderParams`] bundle is built once from caller-supplied
//! configuration, takes ownership of any descriptors handed in, and is
//! immutable afterwards. The loader factory receives it by reference.

use std::os::fd::OwnedFd;

/// Kind of data loader a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LoaderKind {
    /// No loader; the session only tracks lifecycle
    None = 0,
    /// Streaming loader fed by pending-read notifications
    Streaming = 1,
    /// Incremental loader with full page-read telemetry
    Incremental = 2,
}

impl TryFrom<i32> for LoaderKind {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LoaderKind::None),
            1 => Ok(LoaderKind::Streaming),
            2 => Ok(LoaderKind::Incremental),
            other => Err(other),
        }
    }
}

/// A named descriptor passed to the loader at creation.
///
/// Ownership of the descriptor transfers into the bundle; it is closed when
/// the bundle (and therefore the session) is dropped.
#[derive(Debug)]
pub struct NamedFd {
    name: String,
    fd: OwnedFd,
}

impl NamedFd {
    /// Create a named descriptor, taking ownership of `fd`.
    pub fn new(name: impl Into<String>, fd: OwnedFd) -> Self {
        Self {
            name: name.into(),
            fd,
        }
    }

    /// The descriptor's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor itself
    pub fn fd(&self) -> &OwnedFd {
        &self.fd
    }
}

/// Immutable parameter bundle for one session.
#[derive(Debug)]
pub struct DataLoaderParams {
    kind: LoaderKind,
    package_name: String,
    class_name: String,
    arguments: String,
    named_fds: Vec<NamedFd>,
}

impl DataLoaderParams {
    /// Build a parameter bundle. Descriptor ownership transfers in.
    pub fn new(
        kind: LoaderKind,
        package_name: impl Into<String>,
        class_name: impl Into<String>,
        arguments: impl Into<String>,
        named_fds: Vec<NamedFd>,
    ) -> Self {
        Self {
            kind,
            package_name: package_name.into(),
            class_name: class_name.into(),
            arguments: arguments.into(),
            named_fds,
        }
    }

    /// The loader kind
    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Package identity of the loader implementation
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Class identity of the loader implementation
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Free-form argument string
    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Named descriptors handed to the loader
    pub fn named_fds(&self) -> &[NamedFd] {
        &self.named_fds
    }
}

/// A file added to the image during preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationFile {
    /// File name inside the image
    pub name: String,
    /// Final size of the file in bytes
    pub size_bytes: u64,
    /// Opaque per-file metadata stored alongside the file
    pub metadata: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Ok(LoaderKind::None))]
    #[case(1, Ok(LoaderKind::Streaming))]
    #[case(2, Ok(LoaderKind::Incremental))]
    #[case(3, Err(3))]
    #[case(-1, Err(-1))]
    fn test_loader_kind_from_i32(#[case] value: i32, #[case] expected: Result<LoaderKind, i32>) {
        assert_eq!(LoaderKind::try_from(value), expected);
    }

    #[test]
    fn test_params_accessors() {
        let params = DataLoaderParams::new(
            LoaderKind::Streaming,
            "com.example.pkg",
            "com.example.pkg.Loader",
            "--level=3",
            Vec::new(),
        );
        assert_eq!(params.kind(), LoaderKind::Streaming);
        assert_eq!(params.package_name(), "com.example.pkg");
        assert_eq!(params.class_name(), "com.example.pkg.Loader");
        assert_eq!(params.arguments(), "--level=3");
        assert!(params.named_fds().is_empty());
    }
}

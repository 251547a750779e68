use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `repository[:tag][@digest]`, e.g. `python:3.11-slim` or
/// `registry.local:5000/base/python@sha256:...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl ImageRef {
    pub const DEFAULT_TAG: &'static str = "latest";

    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    /// Reference the daemon should pull: the digest pins it when present.
    pub fn pull_reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.repository, digest),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}

impl FromStr for ImageRef {
    type Err = BuildError;

    fn from_str(s: &str) -> BuildResult<Self> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(BuildError::InvalidImageRef(s.to_string()));
        }

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(BuildError::InvalidImageRef(s.to_string())),
            None => (s, None),
        };

        // A colon after the last slash separates the tag; earlier colons belong
        // to a registry host:port.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], &name[split + 1..])
            }
            None => (name, ImageRef::DEFAULT_TAG),
        };

        if repository.is_empty() || tag.is_empty() || repository.ends_with('/') {
            return Err(BuildError::InvalidImageRef(s.to_string()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_tag() {
        let image: ImageRef = "python:3.11-slim".parse().unwrap();
        assert_eq!(image.repository, "python");
        assert_eq!(image.tag, "3.11-slim");
        assert_eq!(image.digest, None);
        assert_eq!(image.to_string(), "python:3.11-slim");
    }

    #[test]
    fn tag_defaults_to_latest() {
        let image: ImageRef = "python".parse().unwrap();
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let image: ImageRef = "registry.local:5000/base/python".parse().unwrap();
        assert_eq!(image.repository, "registry.local:5000/base/python");
        assert_eq!(image.tag, "latest");

        let image: ImageRef = "registry.local:5000/base/python:3.12".parse().unwrap();
        assert_eq!(image.repository, "registry.local:5000/base/python");
        assert_eq!(image.tag, "3.12");
    }

    #[test]
    fn digest_pins_the_pull() {
        let image: ImageRef = "python:3.11@sha256:abc".parse().unwrap();
        assert_eq!(image.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(image.pull_reference(), "python@sha256:abc");
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<ImageRef>().is_err());
        assert!("python:".parse::<ImageRef>().is_err());
        assert!("py thon".parse::<ImageRef>().is_err());
        assert!("python@".parse::<ImageRef>().is_err());
    }
}

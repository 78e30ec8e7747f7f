//! Image references
//!
//! Parses container image names into registry domain, repository path, tag
//! and digest, applying the same normalization a Docker compatible runtime
//! does (`alpine` is `docker.io/library/alpine:latest`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Registry used when the reference names none
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Tag assumed when the reference carries neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_MAX_LEN: usize = 255;
const TAG_MAX_LEN: usize = 128;
const DIGEST_MIN_HEX: usize = 32;

/// Errors raised while parsing an image reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRefError {
    #[error("invalid image reference: empty reference")]
    Empty,

    #[error("invalid image reference '{0}': repository name must be lowercase")]
    Uppercase(String),

    #[error("invalid image reference '{0}': repository name too long")]
    NameTooLong(String),

    #[error("invalid image reference '{0}': cannot use a 64-byte hexadecimal image id")]
    ImageId(String),

    #[error("invalid image reference '{reference}': {reason}")]
    Format { reference: String, reason: String },
}

impl ImageRefError {
    fn format(reference: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

/// Normalized image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Parses and normalizes an image reference
    ///
    /// # Errors
    /// Returns `ImageRefError` when the string is not a valid reference
    pub fn parse(reference: &str) -> Result<Self, ImageRefError> {
        if reference.is_empty() {
            return Err(ImageRefError::Empty);
        }
        if reference.len() == 64 && reference.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ImageRefError::ImageId(reference.to_string()));
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((rest, digest)) => {
                validate_digest(reference, digest)?;
                (rest, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; an earlier colon
        // belongs to a registry port.
        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &rest[split + 1..];
                validate_tag(reference, tag)?;
                (&rest[..split], Some(tag.to_string()))
            }
            None => (rest, None),
        };

        if name.is_empty() {
            return Err(ImageRefError::format(reference, "missing repository name"));
        }
        if name.len() > NAME_MAX_LEN {
            return Err(ImageRefError::NameTooLong(reference.to_string()));
        }

        let (domain, path) = split_domain(name);
        if path.to_ascii_lowercase() != path {
            return Err(ImageRefError::Uppercase(reference.to_string()));
        }
        validate_domain(reference, &domain)?;
        for component in path.split('/') {
            validate_path_component(reference, component)?;
        }

        Ok(Self {
            domain,
            path,
            tag,
            digest,
        })
    }

    /// Registry domain, e.g. `docker.io` or `registry.local:5000`
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Repository path within the registry, e.g. `library/alpine`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Explicit tag, if any
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Tag the runtime will resolve: the explicit tag, or `latest` when the
    /// reference is not pinned by digest
    pub fn effective_tag(&self) -> Option<&str> {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some(DEFAULT_TAG),
            (None, Some(_)) => None,
        }
    }

    /// True when the reference resolves to the mutable `latest` tag
    pub fn is_latest(&self) -> bool {
        self.digest.is_none() && self.effective_tag() == Some(DEFAULT_TAG)
    }

    /// Repository name including the domain, without tag or digest
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }
}

impl FromStr for ImageRef {
    type Err = ImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(tag) = self.effective_tag() {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Splits a repository name into domain and path
fn split_domain(name: &str) -> (String, String) {
    let (domain, path) = match name.split_once('/') {
        Some((first, rest))
            if first.contains(['.', ':'])
                || first == "localhost"
                || first.to_ascii_lowercase() != first =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
    };

    let domain = if domain == LEGACY_DEFAULT_DOMAIN {
        DEFAULT_DOMAIN.to_string()
    } else {
        domain
    };

    if domain == DEFAULT_DOMAIN && !path.contains('/') {
        return (domain, format!("{}{}", OFFICIAL_REPO_PREFIX, path));
    }
    (domain, path)
}

fn validate_domain(reference: &str, domain: &str) -> Result<(), ImageRefError> {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };

    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ImageRefError::format(reference, "invalid registry port"));
        }
    }

    let valid = !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        });
    if !valid {
        return Err(ImageRefError::format(reference, "invalid registry domain"));
    }
    Ok(())
}

/// Path components are lowercase alphanumeric runs joined by `.`, `_`, `__`
/// or any number of `-`
fn validate_path_component(reference: &str, component: &str) -> Result<(), ImageRefError> {
    let invalid = || {
        ImageRefError::format(
            reference,
            format!("invalid path component '{}'", component),
        )
    };

    let bytes = component.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(&first), Some(&last)) if is_alnum(first) && is_alnum(last) => {}
        _ => return Err(invalid()),
    }

    let mut i = 0;
    while i < bytes.len() {
        if is_alnum(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !is_alnum(bytes[i]) {
            i += 1;
        }
        let separator = &component[start..i];
        let ok = matches!(separator, "." | "_" | "__") || separator.bytes().all(|b| b == b'-');
        if !ok {
            return Err(invalid());
        }
    }
    Ok(())
}

fn validate_tag(reference: &str, tag: &str) -> Result<(), ImageRefError> {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let valid = match tag.as_bytes().split_first() {
        Some((&first, rest)) => {
            tag.len() <= TAG_MAX_LEN
                && is_word(first)
                && rest.iter().all(|&b| is_word(b) || b == b'.' || b == b'-')
        }
        None => false,
    };
    if !valid {
        return Err(ImageRefError::format(reference, format!("invalid tag '{}'", tag)));
    }
    Ok(())
}

fn validate_digest(reference: &str, digest: &str) -> Result<(), ImageRefError> {
    let invalid = || ImageRefError::format(reference, format!("invalid digest '{}'", digest));

    let (algorithm, hex) = digest.split_once(':').ok_or_else(invalid)?;
    let algorithm_ok = algorithm.split(['-', '_', '+', '.']).all(|part| {
        part.as_bytes()
            .first()
            .is_some_and(|b| b.is_ascii_alphabetic())
            && part.bytes().all(|b| b.is_ascii_alphanumeric())
    });
    let hex_ok = hex.len() >= DIGEST_MIN_HEX && hex.bytes().all(|b| b.is_ascii_hexdigit());
    if !algorithm_ok || !hex_ok {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:e7d92cdc71feacf90708cb59182d0df1b911f8ae022d29e8e95d75ca6a99776a";

    #[test]
    fn test_official_image_defaults() {
        let image = ImageRef::parse("alpine").unwrap();
        assert_eq!(image.domain(), "docker.io");
        assert_eq!(image.path(), "library/alpine");
        assert_eq!(image.tag(), None);
        assert_eq!(image.effective_tag(), Some("latest"));
        assert!(image.is_latest());
        assert_eq!(image.to_string(), "docker.io/library/alpine:latest");
    }

    #[test]
    fn test_pinned_tag_is_not_latest() {
        let image = ImageRef::parse("app:1.4.0").unwrap();
        assert_eq!(image.path(), "library/app");
        assert_eq!(image.tag(), Some("1.4.0"));
        assert!(!image.is_latest());

        let image = ImageRef::parse("app:latest").unwrap();
        assert!(image.is_latest());
    }

    #[test]
    fn test_user_repository() {
        let image = ImageRef::parse("octocat/hello-world:v2").unwrap();
        assert_eq!(image.domain(), "docker.io");
        assert_eq!(image.path(), "octocat/hello-world");
        assert_eq!(image.name(), "docker.io/octocat/hello-world");
    }

    #[test]
    fn test_custom_registry_with_port() {
        let image = ImageRef::parse("registry.local:5000/team/app").unwrap();
        assert_eq!(image.domain(), "registry.local:5000");
        assert_eq!(image.path(), "team/app");
        assert_eq!(image.tag(), None);
        assert!(image.is_latest());

        let image = ImageRef::parse("localhost/app:dev").unwrap();
        assert_eq!(image.domain(), "localhost");
        assert_eq!(image.path(), "app");
        assert!(!image.is_latest());
    }

    #[test]
    fn test_legacy_index_domain_normalized() {
        let image = ImageRef::parse("index.docker.io/golang:1.22").unwrap();
        assert_eq!(image.domain(), "docker.io");
        assert_eq!(image.path(), "library/golang");
    }

    #[test]
    fn test_digest_pins_image() {
        let image = ImageRef::parse(&format!("alpine@{}", DIGEST)).unwrap();
        assert_eq!(image.digest(), Some(DIGEST));
        assert_eq!(image.effective_tag(), None);
        assert!(!image.is_latest());

        let image = ImageRef::parse(&format!("alpine:latest@{}", DIGEST)).unwrap();
        assert!(!image.is_latest());
        assert_eq!(
            image.to_string(),
            format!("docker.io/library/alpine:latest@{}", DIGEST)
        );
    }

    #[test]
    fn test_invalid_references() {
        assert_eq!(ImageRef::parse(""), Err(ImageRefError::Empty));
        assert!(matches!(
            ImageRef::parse("Alpine"),
            Err(ImageRefError::Uppercase(_))
        ));
        assert!(matches!(
            ImageRef::parse("alpine:"),
            Err(ImageRefError::Format { .. })
        ));
        assert!(matches!(
            ImageRef::parse("alpine:-bad"),
            Err(ImageRefError::Format { .. })
        ));
        assert!(matches!(
            ImageRef::parse("alpine@sha256:abc"),
            Err(ImageRefError::Format { .. })
        ));
        assert!(matches!(
            ImageRef::parse("team//app"),
            Err(ImageRefError::Format { .. })
        ));
        assert!(matches!(
            ImageRef::parse("app_:1"),
            Err(ImageRefError::Format { .. })
        ));
        assert!(matches!(
            ImageRef::parse(&"a".repeat(64).replace('a', "f")),
            Err(ImageRefError::ImageId(_))
        ));
    }

    #[test]
    fn test_separators() {
        assert!(ImageRef::parse("my-org/my__app.v2").is_ok());
        assert!(ImageRef::parse("my---org/app").is_ok());
        assert!(ImageRef::parse("my..org/app").is_err());
    }

    #[test]
    fn test_from_str() {
        let image: ImageRef = "quay.io/coreos/etcd:v3.5".parse().unwrap();
        assert_eq!(image.domain(), "quay.io");
        assert_eq!(image.tag(), Some("v3.5"));
    }
}

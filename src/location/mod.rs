//! Backup locations
//!
//! A `<location>` argument is either a local path or an `s3://bucket/key`
//! object reference. It is parsed once, at the CLI boundary, into a
//! [`Location`]; nothing downstream inspects the raw string again.

mod errors;

pub use errors::{LocationError, LocationResult};

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

/// Object in a bucket-like remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Creates a validated reference
    pub fn new(bucket: &str, key: &str) -> LocationResult<Self> {
        if bucket.is_empty() {
            return Err(LocationError::BucketRequired);
        }
        if !bucket_name_regex().is_match(bucket) {
            return Err(LocationError::InvalidBucketName(bucket.to_string()));
        }

        let key = key.trim_matches('/');
        if key.is_empty() {
            return Err(LocationError::KeyRequired);
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Where an archive is read from or written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(ObjectRef),
}

impl Location {
    /// Parses a raw location.
    ///
    /// Strings without a URL scheme are local paths. `s3://` URLs without a
    /// bucket fall back to `default_bucket`. Any other scheme is rejected.
    pub fn parse(raw: &str, default_bucket: Option<&str>) -> LocationResult<Self> {
        if raw.is_empty() {
            return Err(LocationError::Empty);
        }

        let Some(captures) = scheme_regex().captures(raw) else {
            return Ok(Location::Local(PathBuf::from(raw)));
        };

        let scheme = captures.get(1).map_or("", |m| m.as_str());
        if !scheme.eq_ignore_ascii_case("s3") {
            return Err(LocationError::UnsupportedScheme(scheme.to_string()));
        }

        let rest = captures.get(2).map_or("", |m| m.as_str());
        let (host, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };

        if path.trim_matches('/').is_empty() {
            return Err(LocationError::KeyRequired);
        }

        let bucket = if host.is_empty() {
            default_bucket.unwrap_or_default()
        } else {
            host
        };

        ObjectRef::new(bucket, path).map(Location::Remote)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(object) => write!(f, "{}", object),
        }
    }
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.\-]*)://(.*)$").expect("valid static regex"))
}

fn bucket_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.\-_]{1,255}$").expect("valid static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_paths() {
        assert_eq!(
            Location::parse("/var/backups/acme.tar", None).unwrap(),
            Location::Local(PathBuf::from("/var/backups/acme.tar"))
        );
        assert_eq!(
            Location::parse("acme.tar", None).unwrap(),
            Location::Local(PathBuf::from("acme.tar"))
        );
    }

    #[test]
    fn test_s3_url() {
        let location = Location::parse("s3://backups/tenants/acme.tar", None).unwrap();
        assert_eq!(
            location,
            Location::Remote(ObjectRef {
                bucket: "backups".into(),
                key: "tenants/acme.tar".into(),
            })
        );
        assert_eq!(location.to_string(), "s3://backups/tenants/acme.tar");
    }

    #[test]
    fn test_s3_default_bucket() {
        let location = Location::parse("s3:///acme.tar", Some("default-bucket")).unwrap();
        match location {
            Location::Remote(object) => {
                assert_eq!(object.bucket, "default-bucket");
                assert_eq!(object.key, "acme.tar");
                assert_eq!(object.file_name(), "acme.tar");
            }
            other => panic!("expected remote location, got {:?}", other),
        }
    }

    #[test]
    fn test_s3_trailing_slash_stripped() {
        let location = Location::parse("s3://backups/acme.tar/", None).unwrap();
        assert_eq!(location.to_string(), "s3://backups/acme.tar");
    }

    #[test]
    fn test_s3_without_bucket() {
        assert_eq!(
            Location::parse("s3:///acme.tar", None).unwrap_err(),
            LocationError::BucketRequired
        );
        assert_eq!(
            Location::parse("s3:///acme.tar", Some("")).unwrap_err(),
            LocationError::BucketRequired
        );
    }

    #[test]
    fn test_s3_without_key() {
        assert_eq!(
            Location::parse("s3://backups", None).unwrap_err(),
            LocationError::KeyRequired
        );
        assert_eq!(
            Location::parse("s3://backups/", None).unwrap_err(),
            LocationError::KeyRequired
        );
    }

    #[test]
    fn test_invalid_bucket() {
        assert_eq!(
            Location::parse("s3://bad!bucket/acme.tar", None).unwrap_err(),
            LocationError::InvalidBucketName("bad!bucket".into())
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        assert_eq!(
            Location::parse("https://example.com/acme.tar", None).unwrap_err(),
            LocationError::UnsupportedScheme("https".into())
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(Location::parse("", None).unwrap_err(), LocationError::Empty);
    }
}

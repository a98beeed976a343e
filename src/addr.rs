//! Resource identity and addressing
//!
//! A resource has two string forms: the compact, module-local *state key*
//! (`aws_instance.web.0`) used as the map key inside a module, and the
//! canonical *address* (`module.staging.aws_instance.web[0]`) that also
//! carries the module path. Transforms are keyed by addresses; the two forms
//! convert losslessly in both directions.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// Whether a resource is managed by the graph or only read from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceMode {
    Managed,
    Data,
}

/// Parsed form of a module-local state key
///
/// `index` is `None` for resources without a count. The string form is
/// `TYPE.NAME`, `TYPE.NAME.N`, or the same with a `data.` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
    pub index: Option<usize>,
}

impl ResourceKey {
    /// Parse a state key. Fails on the wrong number of segments, an empty
    /// type or name, or a non-numeric index.
    pub fn parse(key: &str) -> Result<Self> {
        let malformed = |reason| Error::KeyParse {
            key: key.to_string(),
            reason,
        };
        let mut parts: &[&str] = &key.split('.').collect::<Vec<_>>();
        let mode = if parts.len() > 1 && parts[0] == "data" {
            parts = &parts[1..];
            ResourceMode::Data
        } else {
            ResourceMode::Managed
        };
        let index = match parts.len() {
            2 => None,
            3 => Some(
                parts[2]
                    .parse::<usize>()
                    .map_err(|_| malformed("index is not a number"))?,
            ),
            _ => return Err(malformed("expected TYPE.NAME or TYPE.NAME.N")),
        };
        if parts[0].is_empty() {
            return Err(malformed("empty resource type"));
        }
        if parts[1].is_empty() {
            return Err(malformed("empty resource name"));
        }
        Ok(Self {
            mode,
            resource_type: parts[0].to_string(),
            name: parts[1].to_string(),
            index,
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.resource_type, self.name)?;
        if let Some(i) = self.index {
            write!(f, ".{i}")?;
        }
        Ok(())
    }
}

/// Canonical identity of a resource: module path plus parsed key
///
/// The path always starts with `root`. The string form omits module
/// qualification for the root module and renders the index as `[N]`:
/// `aws_instance.web[0]`, `module.staging.data.aws_ami.base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    pub path: Vec<String>,
    pub key: ResourceKey,
}

impl ResourceAddress {
    /// Parse a canonical address. A `module.root.` prefix is accepted and
    /// normalized away. Fails with [`Error::IncompleteAddress`] when the
    /// type or name is missing and [`Error::KeyParse`] on other malformed
    /// input.
    pub fn parse(addr: &str) -> Result<Self> {
        let malformed = |reason| Error::KeyParse {
            key: addr.to_string(),
            reason,
        };
        let tokens: Vec<&str> = addr.split('.').collect();
        let mut path = vec!["root".to_string()];
        let mut i = 0;
        while tokens.len() >= i + 4 && tokens[i] == "module" {
            let name = tokens[i + 1];
            if name.is_empty() {
                return Err(malformed("empty module name"));
            }
            if !(path.len() == 1 && name == "root") {
                path.push(name.to_string());
            }
            i += 2;
        }
        let mut mode = ResourceMode::Managed;
        if tokens.len() - i == 3 && tokens[i] == "data" {
            mode = ResourceMode::Data;
            i += 1;
        }
        let rest = &tokens[i..];
        match rest.len() {
            // A bare `data` prefix with no type and name behind it would
            // round-trip into a key that no longer parses.
            2 if rest[0] == "data" => {
                return Err(Error::IncompleteAddress(addr.to_string()));
            }
            2 => {}
            // A trailing module prefix with too few tokens for a key.
            3 if rest[0] == "module" => {
                return Err(Error::IncompleteAddress(addr.to_string()));
            }
            0 | 1 => return Err(Error::IncompleteAddress(addr.to_string())),
            _ => return Err(malformed("malformed resource address")),
        }
        let resource_type = rest[0];
        let (name, index) = match rest[1].find('[') {
            Some(p) => {
                let idx = rest[1][p + 1..]
                    .strip_suffix(']')
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| malformed("malformed index"))?;
                (&rest[1][..p], Some(idx))
            }
            None => (rest[1], None),
        };
        if resource_type.is_empty() || name.is_empty() {
            return Err(Error::IncompleteAddress(addr.to_string()));
        }
        Ok(Self {
            path,
            key: ResourceKey {
                mode,
                resource_type: resource_type.to_string(),
                name: name.to_string(),
                index,
            },
        })
    }

    /// True if the address lives in the root module
    pub fn is_root(&self) -> bool {
        self.path.len() == 1 && self.path[0] == "root"
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rest = match self.path.first() {
            Some(p) if p == "root" => &self.path[1..],
            _ => &self.path[..],
        };
        for p in rest {
            write!(f, "module.{p}.")?;
        }
        if self.key.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.key.resource_type, self.key.name)?;
        if let Some(i) = self.key.index {
            write!(f, "[{i}]")?;
        }
        Ok(())
    }
}

/// Return `path` with the implicit `root` element made explicit
pub fn normalize_path(path: &[String]) -> Vec<String> {
    match path.first() {
        Some(p) if p == "root" => path.to_vec(),
        Some(_) => {
            let mut full = Vec::with_capacity(path.len() + 1);
            full.push("root".to_string());
            full.extend_from_slice(path);
            full
        }
        None => vec!["root".to_string()],
    }
}

/// Convert a module path and state key into a canonical address
pub fn key_to_address(path: &[String], key: &str) -> Result<String> {
    let key = ResourceKey::parse(key)?;
    let addr = ResourceAddress {
        path: normalize_path(path),
        key,
    };
    Ok(addr.to_string())
}

/// Convert a canonical address back into a module path and state key
pub fn address_to_key(addr: &str) -> Result<(Vec<String>, String)> {
    let addr = ResourceAddress::parse(addr)?;
    let key = addr.key.to_string();
    Ok((addr.path, key))
}

/// Rewrites arbitrary strings into valid resource names
///
/// Runs of characters outside `[0-9A-Za-z-]` collapse into a single `_`, and
/// a leading character outside `[0-9A-Za-z]` is folded into the first run.
/// Constructed once by the caller and threaded through; there is no global
/// instance.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    re: Regex,
}

impl NameNormalizer {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^[^0-9A-Za-z][^0-9A-Za-z-]*|[^0-9A-Za-z-]+")
                .expect("invalid name pattern"),
        }
    }

    /// Normalize `s` into a valid resource name. Panics on an empty string,
    /// which is always a caller bug.
    pub fn normalize(&self, s: &str) -> String {
        assert!(!s.is_empty(), "empty resource name");
        self.re.replace_all(s, "_").into_owned()
    }
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_key_round_trip() {
        for key in [
            "aws_instance.web",
            "aws_instance.web.3",
            "data.aws_ami.base",
            "data.aws_ami.base.0",
        ] {
            let parsed = ResourceKey::parse(key).unwrap();
            assert_eq!(parsed.to_string(), key, "{key}");
        }
    }

    #[test]
    fn test_key_parse_errors() {
        for key in ["", "aws_instance", "a.b.c.d", "a.b.x", "a.", ".b", "data.a"] {
            assert!(
                matches!(ResourceKey::parse(key), Err(Error::KeyParse { .. })),
                "{key}"
            );
        }
    }

    #[test]
    fn test_address_round_trip() {
        let cases = [
            (path(&["root"]), "a.a", "a.a"),
            (path(&["root"]), "a.a.2", "a.a[2]"),
            (path(&["root"]), "data.a.a", "data.a.a"),
            (path(&["root", "x"]), "a.a", "module.x.a.a"),
            (path(&["root", "x", "y"]), "a.a.1", "module.x.module.y.a.a[1]"),
            (path(&["root", "x"]), "data.a.a", "module.x.data.a.a"),
        ];
        for (p, key, addr) in cases {
            assert_eq!(key_to_address(&p, key).unwrap(), addr);
            assert_eq!(address_to_key(addr).unwrap(), (p.clone(), key.to_string()));
        }
    }

    #[test]
    fn test_address_accepts_root_prefix() {
        let (p, key) = address_to_key("module.root.a.b").unwrap();
        assert_eq!(p, path(&["root"]));
        assert_eq!(key, "a.b");
    }

    #[test]
    fn test_address_normalizes_implicit_root() {
        // A caller-supplied path without the leading "root" still renders
        // the same canonical address.
        assert_eq!(
            key_to_address(&path(&["x"]), "a.a").unwrap(),
            "module.x.a.a"
        );
        assert_eq!(key_to_address(&[], "a.a").unwrap(), "a.a");
    }

    #[test]
    fn test_address_errors() {
        assert!(matches!(
            ResourceAddress::parse("a"),
            Err(Error::IncompleteAddress(_))
        ));
        assert!(matches!(
            ResourceAddress::parse("module.x.a"),
            Err(Error::IncompleteAddress(_))
        ));
        assert!(matches!(
            ResourceAddress::parse("a.b[x]"),
            Err(Error::KeyParse { .. })
        ));
        assert!(matches!(
            ResourceAddress::parse("a.b.c.d"),
            Err(Error::KeyParse { .. })
        ));
    }

    #[test]
    fn test_address_rejects_bare_data_type() {
        // `data` alone is a prefix, not a resource type; accepting it would
        // produce a key the other direction cannot parse back.
        for addr in ["data.a", "module.x.data.a"] {
            assert!(
                matches!(
                    ResourceAddress::parse(addr),
                    Err(Error::IncompleteAddress(_))
                ),
                "{addr}"
            );
        }
    }

    #[test]
    fn test_normalize_names() {
        let norm = NameNormalizer::new();
        let cases = [
            ("_", "_"),
            ("--", "_-"),
            ("-_-", "_-"),
            ("_--", "_--"),
            ("_/a/b-1//2.3$", "_a_b-1_2_3_"),
            ("provider.aws", "provider_aws"),
        ];
        for (have, want) in cases {
            assert_eq!(norm.normalize(have), want, "{have}");
        }
    }

    #[test]
    #[should_panic(expected = "empty resource name")]
    fn test_normalize_empty_panics() {
        NameNormalizer::new().normalize("");
    }
}

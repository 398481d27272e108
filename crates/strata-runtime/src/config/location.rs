//! Data source locations.
//!
//! A location starts out as configured (`original`) and resolves against
//! the interpolation scope and the entry's data root into zero or more
//! concrete addresses. Globs expand to one path per match; `mapped_paths`
//! templates one path per element of an array-valued scope variable.

use crate::error::LookupError;
use crate::explain::LocationDesc;
use crate::session::Invocation;
use std::path::{Path, PathBuf};
use strata_types::Value;

/// A data source address.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Path {
        original: String,
        resolved: PathBuf,
        exists: bool,
    },
    Glob {
        pattern: String,
    },
    Uri {
        original: String,
        resolved: String,
    },
    MappedPaths {
        scope_var: String,
        template_var: String,
        template: String,
    },
}

impl Location {
    pub fn path(original: impl Into<String>) -> Self {
        Self::Path {
            original: original.into(),
            resolved: PathBuf::new(),
            exists: false,
        }
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob {
            pattern: pattern.into(),
        }
    }

    pub fn uri(original: impl Into<String>) -> Self {
        Self::Uri {
            original: original.into(),
            resolved: String::new(),
        }
    }

    pub fn mapped_paths(
        scope_var: impl Into<String>,
        template_var: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::MappedPaths {
            scope_var: scope_var.into(),
            template_var: template_var.into(),
            template: template.into(),
        }
    }

    /// The as-configured address.
    #[must_use]
    pub fn original(&self) -> &str {
        match self {
            Self::Path { original, .. } | Self::Uri { original, .. } => original,
            Self::Glob { pattern } => pattern,
            Self::MappedPaths { template, .. } => template,
        }
    }

    /// The fully resolved address, as a string usable for cache keys.
    #[must_use]
    pub fn resolved_str(&self) -> String {
        match self {
            Self::Path { resolved, .. } => resolved.display().to_string(),
            Self::Uri { resolved, .. } => resolved.clone(),
            _ => String::new(),
        }
    }

    /// Whether the address points at something that exists. URIs are never
    /// checked and count as existing.
    #[must_use]
    pub fn exists(&self) -> bool {
        match self {
            Self::Path { exists, .. } => *exists,
            Self::Uri { .. } => true,
            _ => false,
        }
    }

    #[must_use]
    pub(crate) fn describe(&self) -> LocationDesc {
        match self {
            Self::Path {
                original,
                resolved,
                exists,
            } => LocationDesc {
                kind: "path",
                original: original.clone(),
                resolved: resolved.display().to_string(),
                exists: Some(*exists),
            },
            Self::Uri { original, resolved } => LocationDesc {
                kind: "uri",
                original: original.clone(),
                resolved: resolved.clone(),
                exists: None,
            },
            Self::Glob { pattern } => LocationDesc {
                kind: "glob",
                original: pattern.clone(),
                resolved: String::new(),
                exists: None,
            },
            Self::MappedPaths { template, .. } => LocationDesc {
                kind: "mapped_paths",
                original: template.clone(),
                resolved: String::new(),
                exists: None,
            },
        }
    }

    /// Resolves this location against the scope and `data_root`, producing
    /// a (possibly empty) ordered list of concrete locations.
    pub fn resolve(
        &self,
        invocation: &mut Invocation<'_>,
        data_root: &Path,
    ) -> Result<Vec<Location>, LookupError> {
        match self {
            Self::Path { original, .. } => {
                let interpolated = invocation.interpolate_string(original, false)?;
                Ok(vec![resolve_path(original, &interpolated, data_root)])
            }
            Self::Glob { pattern } => {
                let interpolated = invocation.interpolate_string(pattern, false)?;
                let full = join_unless_absolute(data_root, &interpolated);
                let full = full.to_string_lossy().into_owned();
                let mut matches = Vec::new();
                for entry in glob::glob(&full).map_err(|source| LookupError::GlobPattern {
                    pattern: full.clone(),
                    source,
                })? {
                    let path = entry.map_err(|source| LookupError::GlobWalk {
                        pattern: full.clone(),
                        source,
                    })?;
                    matches.push(path);
                }
                matches.sort();
                Ok(matches
                    .into_iter()
                    .map(|resolved| Self::Path {
                        original: pattern.clone(),
                        resolved,
                        exists: true,
                    })
                    .collect())
            }
            Self::Uri { original, .. } => {
                let resolved = invocation.interpolate_string(original, false)?;
                Ok(vec![Self::Uri {
                    original: original.clone(),
                    resolved,
                }])
            }
            Self::MappedPaths {
                scope_var,
                template_var,
                template,
            } => {
                let Some(mapped) = invocation.scope().get(scope_var).cloned() else {
                    return Ok(Vec::new());
                };
                let items = mapped
                    .expect_array()
                    .map_err(|_| LookupError::MappedPathsKind {
                        var: scope_var.clone(),
                    })?
                    .to_vec();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let Value::String(_) = item else {
                        return Err(LookupError::MappedPathsKind {
                            var: scope_var.clone(),
                        });
                    };
                    let interpolated = invocation.with_scope_var(template_var, item, |inv| {
                        inv.interpolate_string(template, false)
                    })?;
                    out.push(resolve_path(template, &interpolated, data_root));
                }
                Ok(out)
            }
        }
    }
}

fn join_unless_absolute(root: &Path, p: &str) -> PathBuf {
    let candidate = Path::new(p);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}

fn resolve_path(original: &str, interpolated: &str, data_root: &Path) -> Location {
    let resolved = join_unless_absolute(data_root, interpolated);
    let exists = resolved.exists();
    Location::Path {
        original: original.to_owned(),
        resolved,
        exists,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn path_resolves_and_stats() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "common.yaml", "a: 1\n");

        let session = Session::builder().with_config_root(tmp.path()).build();
        let mut inv = session.invocation(None, None);

        let resolved = Location::path("common.yaml")
            .resolve(&mut inv, tmp.path())
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].exists());
        assert_eq!(resolved[0].original(), "common.yaml");

        let missing = Location::path("nope.yaml")
            .resolve(&mut inv, tmp.path())
            .unwrap();
        assert!(!missing[0].exists());
    }

    #[test]
    fn glob_expands_in_lexicographic_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.yaml", "x: 1\n");
        write(tmp.path(), "a.yaml", "x: 2\n");
        write(tmp.path(), "c.txt", "not yaml");

        let session = Session::builder().with_config_root(tmp.path()).build();
        let mut inv = session.invocation(None, None);

        let resolved = Location::glob("*.yaml")
            .resolve(&mut inv, tmp.path())
            .unwrap();
        let names: Vec<String> = resolved
            .iter()
            .map(|l| {
                Path::new(&l.resolved_str())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, ["a.yaml", "b.yaml"]);
    }

    #[test]
    fn uri_is_not_statted() {
        let session = Session::builder().build();
        let mut inv = session.invocation(None, None);
        let resolved = Location::uri("https://example.com/data")
            .resolve(&mut inv, Path::new("/nowhere"))
            .unwrap();
        assert!(resolved[0].exists());
        assert_eq!(resolved[0].resolved_str(), "https://example.com/data");
    }

    #[test]
    fn mapped_paths_template_per_element() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "one.yaml", "a: 1\n");

        let mut scope = strata_types::Map::new();
        scope.insert(
            "services".into(),
            Value::Array(vec![Value::from("one"), Value::from("two")]),
        );
        let session = Session::builder()
            .with_config_root(tmp.path())
            .with_scope(scope)
            .build();
        let mut inv = session.invocation(None, None);

        let resolved = Location::mapped_paths("services", "service", "%{service}.yaml")
            .resolve(&mut inv, tmp.path())
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].exists());
        assert!(!resolved[1].exists());
    }

    #[test]
    fn mapped_paths_missing_var_is_empty() {
        let session = Session::builder().build();
        let mut inv = session.invocation(None, None);
        let resolved = Location::mapped_paths("absent", "v", "%{v}.yaml")
            .resolve(&mut inv, Path::new("/nowhere"))
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn mapped_paths_requires_string_array() {
        let mut scope = strata_types::Map::new();
        scope.insert("services".into(), Value::from("not-an-array"));
        let session = Session::builder().with_scope(scope).build();
        let mut inv = session.invocation(None, None);
        let err = Location::mapped_paths("services", "v", "%{v}.yaml")
            .resolve(&mut inv, Path::new("/nowhere"))
            .unwrap_err();
        assert!(matches!(err, LookupError::MappedPathsKind { .. }));
    }
}

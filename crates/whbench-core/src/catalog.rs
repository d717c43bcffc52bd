//! Query catalogs: ordered `(description, sql)` lists stored as YAML.
//!
//! SQL bodies may reference `${name}` placeholders which are substituted at
//! load time. The runner never parses or rewrites SQL beyond that.

use crate::errors::ConfigError;
use crate::model::QuerySpec;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    variables: BTreeMap<String, String>,
    queries: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    description: String,
    sql: String,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

pub fn load_catalog(
    path: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<QuerySpec>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(&raw, vars).map_err(|e| match e {
        ConfigError::Catalog(reason) => ConfigError::CatalogParse {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Parses catalog YAML. File-level `variables` are defaults; `vars` wins.
pub fn parse_catalog(
    raw: &str,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<QuerySpec>, ConfigError> {
    let mut ignored = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let file: CatalogFile = serde_ignored::deserialize(deserializer, |p| {
        ignored.push(p.to_string());
    })
    .map_err(|e| ConfigError::Catalog(e.to_string()))?;

    if !ignored.is_empty() {
        tracing::warn!(keys = ?ignored, "ignoring unknown catalog keys");
    }

    if file.queries.is_empty() {
        return Err(ConfigError::Catalog("catalog has no queries".into()));
    }

    let mut merged = file.variables;
    merged.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(file.queries.len());
    for entry in file.queries {
        let description = entry.description.trim().to_string();
        if description.is_empty() {
            return Err(ConfigError::Catalog("query with empty description".into()));
        }
        if !seen.insert(description.clone()) {
            return Err(ConfigError::Catalog(format!(
                "duplicate query description '{}'",
                description
            )));
        }
        if entry.sql.trim().is_empty() {
            return Err(ConfigError::Catalog(format!(
                "query '{}' has an empty sql body",
                description
            )));
        }
        let sql = substitute(&entry.sql, &merged)
            .map_err(|name| {
                ConfigError::Catalog(format!(
                    "query '{}' references unknown variable '${{{}}}'",
                    description, name
                ))
            })?;
        out.push(QuerySpec { description, sql });
    }
    Ok(out)
}

/// Replaces `${name}`; returns the first unknown name on failure.
pub fn substitute(sql: &str, vars: &BTreeMap<String, String>) -> Result<String, String> {
    let re = placeholder_re();
    if let Some(missing) = re
        .captures_iter(sql)
        .map(|c| c[1].to_string())
        .find(|name| !vars.contains_key(name))
    {
        return Err(missing);
    }
    Ok(re
        .replace_all(sql, |c: &regex::Captures| vars[&c[1]].clone())
        .into_owned())
}

/// Keeps only the named queries, in catalog order. Unknown names are an error.
pub fn select(queries: Vec<QuerySpec>, only: &[String]) -> Result<Vec<QuerySpec>, ConfigError> {
    if only.is_empty() {
        return Ok(queries);
    }
    let known: HashSet<&str> = queries.iter().map(|q| q.description.as_str()).collect();
    let unknown: Vec<&str> = only
        .iter()
        .map(String::as_str)
        .filter(|d| !known.contains(d))
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::Catalog(format!(
            "unknown query descriptions: {}",
            unknown.join(", ")
        )));
    }
    Ok(queries
        .into_iter()
        .filter(|q| only.iter().any(|o| o == &q.description))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitution_and_order() {
        let raw = r#"
queries:
  - description: Query-2
    sql: SELECT COUNT(*) FROM ${schema}.orders
  - description: Query-1
    sql: |
      SELECT SUM(l_extendedprice)
      FROM ${schema}.lineitem
"#;
        let qs = parse_catalog(raw, &vars(&[("schema", "tpch")])).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].description, "Query-2");
        assert_eq!(qs[0].sql, "SELECT COUNT(*) FROM tpch.orders");
        assert!(qs[1].sql.contains("FROM tpch.lineitem"));
    }

    #[test]
    fn test_json_paths_are_not_placeholders() {
        let raw = r#"
queries:
  - description: Q
    sql: "SELECT JSON_VALUE(j, '$.l_discount') FROM ${dataset}.t"
"#;
        let qs = parse_catalog(raw, &vars(&[("dataset", "p.d")])).unwrap();
        assert_eq!(qs[0].sql, "SELECT JSON_VALUE(j, '$.l_discount') FROM p.d.t");
    }

    #[test]
    fn test_file_variables_are_overridden() {
        let raw = r#"
variables:
  schema: default_schema
queries:
  - description: Q
    sql: SELECT 1 FROM ${schema}.t
"#;
        let qs = parse_catalog(raw, &vars(&[])).unwrap();
        assert_eq!(qs[0].sql, "SELECT 1 FROM default_schema.t");
        let qs = parse_catalog(raw, &vars(&[("schema", "cli")])).unwrap();
        assert_eq!(qs[0].sql, "SELECT 1 FROM cli.t");
    }

    #[test]
    fn test_rejects_unknown_variable_and_duplicates() {
        let raw = "queries:\n  - description: Q\n    sql: SELECT ${nope}\n";
        let err = parse_catalog(raw, &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("nope"), "{}", err);

        let raw = "queries:\n  - {description: Q, sql: SELECT 1}\n  - {description: Q, sql: SELECT 2}\n";
        assert!(parse_catalog(raw, &vars(&[])).unwrap_err().to_string().contains("duplicate"));

        assert!(parse_catalog("queries: []\n", &vars(&[])).is_err());
    }

    #[test]
    fn test_select_keeps_catalog_order() {
        let qs = vec![
            QuerySpec::new("A", "SELECT 1"),
            QuerySpec::new("B", "SELECT 2"),
            QuerySpec::new("C", "SELECT 3"),
        ];
        let picked = select(qs.clone(), &["C".into(), "A".into()]).unwrap();
        let names: Vec<_> = picked.iter().map(|q| q.description.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(select(qs, &["Z".into()]).is_err());
    }
}

//! Ontology model: versioned rule packs that drive tagging.
//!
//! An ontology is a JSON document of packs, each holding weighted match
//! rules. Validation is a pure pre-flight check with no store access, and
//! the document carries a content hash over its canonical serialization so
//! analysis runs can record exactly which rule set produced their state.

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{LeadscopeError, Result};

/// Record fields a rule may be scoped to.
pub const ALLOWED_FIELDS: [&str; 5] = ["snippet", "place_text", "doc_id", "source_url", "raw_json"];

/// Closed set of match kinds: adding a kind is a compile-time change,
/// not a string branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Phrase,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
    pub version: String,
    #[serde(default)]
    pub defaults: Defaults,
    pub packs: Vec<Pack>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            fields: default_fields(),
        }
    }
}

fn default_fields() -> Vec<String> {
    vec![
        "snippet".to_string(),
        "place_text".to_string(),
        "doc_id".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub kind: RuleKind,
    pub pattern: String,
    /// Field scope; falls back to `defaults.fields` when absent.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

/// A parsed ontology together with its content hash.
#[derive(Debug, Clone)]
pub struct ValidatedOntology {
    pub ontology: Ontology,
    pub hash: String,
}

/// Counts reported by `lsc ontology validate` and recorded on analysis runs.
#[derive(Debug, Clone, Serialize)]
pub struct OntologySummary {
    pub version: String,
    pub packs: usize,
    pub packs_enabled: usize,
    pub total_rules: usize,
    pub hash: String,
}

impl ValidatedOntology {
    pub fn summary(&self) -> OntologySummary {
        let packs_enabled = self.ontology.packs.iter().filter(|p| p.enabled).count();
        let total_rules = self.ontology.packs.iter().map(|p| p.rules.len()).sum();
        OntologySummary {
            version: self.ontology.version.clone(),
            packs: self.ontology.packs.len(),
            packs_enabled,
            total_rules,
            hash: self.hash.clone(),
        }
    }
}

pub fn load_and_validate(path: &Path) -> Result<ValidatedOntology> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        LeadscopeError::Validation(format!("cannot read ontology {}: {}", path.display(), e))
    })?;
    parse_and_validate(&text)
}

/// Parse and validate an ontology document. Pure: no store access, usable
/// as a pre-flight check before any tagging run.
pub fn parse_and_validate(text: &str) -> Result<ValidatedOntology> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| LeadscopeError::Validation(format!("ontology is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(LeadscopeError::Validation(
            "ontology root must be a JSON object".to_string(),
        ));
    }
    // Hash the document as written, canonicalized, so the hash tracks what
    // the operator provided rather than what serde materialized.
    let hash = content_hash(&value);

    let ontology: Ontology = serde_json::from_value(value)
        .map_err(|e| LeadscopeError::Validation(format!("malformed ontology: {}", e)))?;

    validate(&ontology)?;
    Ok(ValidatedOntology { ontology, hash })
}

/// Check structural invariants, collecting every problem before rejecting.
pub fn validate(ontology: &Ontology) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if ontology.version.trim().is_empty() {
        errors.push("version must be a non-empty string".to_string());
    }
    check_fields(&ontology.defaults.fields, "defaults", &mut errors);

    let mut pack_ids: HashSet<&str> = HashSet::new();
    for pack in &ontology.packs {
        if pack.id.trim().is_empty() {
            errors.push("pack with empty id".to_string());
            continue;
        }
        if !pack_ids.insert(pack.id.as_str()) {
            errors.push(format!("duplicate pack id '{}'", pack.id));
        }
        if pack.name.trim().is_empty() {
            errors.push(format!("pack '{}': name must be non-empty", pack.id));
        }
        if pack.rules.is_empty() {
            errors.push(format!("pack '{}': rules must be non-empty", pack.id));
        }

        let mut rule_ids: HashSet<&str> = HashSet::new();
        for rule in &pack.rules {
            let label = format!("pack '{}' rule '{}'", pack.id, rule.id);
            if rule.id.trim().is_empty() {
                errors.push(format!("pack '{}': rule with empty id", pack.id));
                continue;
            }
            if !rule_ids.insert(rule.id.as_str()) {
                errors.push(format!("pack '{}': duplicate rule id '{}'", pack.id, rule.id));
            }
            if rule.pattern.is_empty() {
                errors.push(format!("{}: pattern must be non-empty", label));
            }
            if !rule.weight.is_finite() {
                errors.push(format!("{}: weight must be finite", label));
            }
            if let Some(fields) = &rule.fields {
                check_fields(fields, &label, &mut errors);
            }
            if rule.kind == RuleKind::Regex && !rule.pattern.is_empty() {
                if let Err(e) = build_regex(&rule.pattern, rule.case_sensitive) {
                    errors.push(format!("{}: regex does not compile: {}", label, e));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LeadscopeError::OntologyValidation(errors))
    }
}

fn check_fields(fields: &[String], label: &str, errors: &mut Vec<String>) {
    for f in fields {
        if !ALLOWED_FIELDS.contains(&f.as_str()) {
            errors.push(format!("{}: unknown record field '{}'", label, f));
        }
    }
}

/// SHA-256 over the canonical (recursively key-sorted, compact) JSON form.
/// Key order in the source document does not affect the hash.
pub fn content_hash(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// One rule flattened for matching, with its regex pre-built.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub pack_id: String,
    pub rule_id: String,
    pub kind: RuleKind,
    pub pattern: String,
    pub weight: f64,
    pub fields: Vec<String>,
    pub case_sensitive: bool,
    pub regex: Option<Regex>,
}

impl CompiledRule {
    /// Keyword identifier recorded when this rule matches a record.
    pub fn keyword_id(&self) -> String {
        format!("{}:{}", self.pack_id, self.rule_id)
    }
}

/// Flatten enabled packs and rules into matchers. Assumes the ontology
/// already passed [`validate`]; a regex that fails here is still an error
/// rather than a panic.
pub fn compile(validated: &ValidatedOntology) -> Result<Vec<CompiledRule>> {
    let mut compiled = Vec::new();
    for pack in &validated.ontology.packs {
        if !pack.enabled {
            continue;
        }
        for rule in &pack.rules {
            if !rule.enabled {
                continue;
            }
            let regex = match rule.kind {
                RuleKind::Regex => Some(build_regex(&rule.pattern, rule.case_sensitive).map_err(
                    |e| {
                        LeadscopeError::Validation(format!(
                            "pack '{}' rule '{}': {}",
                            pack.id, rule.id, e
                        ))
                    },
                )?),
                RuleKind::Phrase => None,
            };
            compiled.push(CompiledRule {
                pack_id: pack.id.clone(),
                rule_id: rule.id.clone(),
                kind: rule.kind,
                pattern: rule.pattern.clone(),
                weight: rule.weight,
                fields: rule
                    .fields
                    .clone()
                    .unwrap_or_else(|| validated.ontology.defaults.fields.clone()),
                case_sensitive: rule.case_sensitive,
                regex,
            });
        }
    }
    Ok(compiled)
}

fn build_regex(pattern: &str, case_sensitive: bool) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "version": "2025.1",
            "defaults": {"fields": ["snippet", "place_text"]},
            "packs": [
                {
                    "id": "materials",
                    "name": "Exotic materials",
                    "rules": [
                        {"id": "meta", "kind": "phrase", "pattern": "metamaterial", "weight": 5},
                        {"id": "cloak", "kind": "regex", "pattern": "cloak(ing)?", "weight": 3.5, "fields": ["snippet"]}
                    ]
                }
            ]
        }"#
    }

    #[test]
    fn valid_document_parses_with_hash() {
        let v = parse_and_validate(sample()).unwrap();
        assert_eq!(v.ontology.version, "2025.1");
        assert_eq!(v.hash.len(), 64);
        let summary = v.summary();
        assert_eq!(summary.packs, 1);
        assert_eq!(summary.total_rules, 2);
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [{"id": "r", "kind": "phrase", "pattern": "x", "weight": 1}]}]}"#;
        let b = r#"{"packs": [{"name": "P", "rules": [{"weight": 1, "pattern": "x", "kind": "phrase", "id": "r"}], "id": "p"}], "version": "1"}"#;
        let ha = parse_and_validate(a).unwrap().hash;
        let hb = parse_and_validate(b).unwrap().hash;
        assert_eq!(ha, hb);
    }

    #[test]
    fn hash_tracks_content_changes() {
        let a = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [{"id": "r", "kind": "phrase", "pattern": "x", "weight": 1}]}]}"#;
        let b = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [{"id": "r", "kind": "phrase", "pattern": "x", "weight": 2}]}]}"#;
        assert_ne!(
            parse_and_validate(a).unwrap().hash,
            parse_and_validate(b).unwrap().hash
        );
    }

    #[test]
    fn duplicate_rule_id_names_the_pack() {
        let doc = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [
            {"id": "r", "kind": "phrase", "pattern": "x", "weight": 1},
            {"id": "r", "kind": "phrase", "pattern": "y", "weight": 1}
        ]}]}"#;
        match parse_and_validate(doc) {
            Err(LeadscopeError::OntologyValidation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("pack 'p'") && e.contains("'r'")));
            }
            other => panic!("expected OntologyValidation, got {:?}", other),
        }
    }

    #[test]
    fn bad_regex_is_rejected() {
        let doc = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [
            {"id": "r", "kind": "regex", "pattern": "(unclosed", "weight": 1}
        ]}]}"#;
        assert!(matches!(
            parse_and_validate(doc),
            Err(LeadscopeError::OntologyValidation(_))
        ));
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        let doc = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [
            {"id": "r", "kind": "phrase", "pattern": "x", "weight": 1e999}
        ]}]}"#;
        match parse_and_validate(doc) {
            Err(LeadscopeError::OntologyValidation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("finite")));
            }
            other => panic!("expected OntologyValidation, got {:?}", other),
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        let doc = r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [
            {"id": "r", "kind": "phrase", "pattern": "x", "weight": 1, "fields": ["body"]}
        ]}]}"#;
        match parse_and_validate(doc) {
            Err(LeadscopeError::OntologyValidation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("unknown record field 'body'")));
            }
            other => panic!("expected OntologyValidation, got {:?}", other),
        }
    }

    #[test]
    fn compile_skips_disabled_packs_and_rules() {
        let doc = r#"{"version": "1", "packs": [
            {"id": "off", "name": "Off", "enabled": false, "rules": [
                {"id": "r", "kind": "phrase", "pattern": "x", "weight": 1}
            ]},
            {"id": "on", "name": "On", "rules": [
                {"id": "live", "kind": "phrase", "pattern": "x", "weight": 1},
                {"id": "dead", "kind": "phrase", "pattern": "y", "weight": 1, "enabled": false}
            ]}
        ]}"#;
        let v = parse_and_validate(doc).unwrap();
        let rules = compile(&v).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keyword_id(), "on:live");
    }

    #[test]
    fn rule_without_fields_inherits_defaults() {
        let v = parse_and_validate(sample()).unwrap();
        let rules = compile(&v).unwrap();
        assert_eq!(rules[0].fields, vec!["snippet", "place_text"]);
        assert_eq!(rules[1].fields, vec!["snippet"]);
    }
}

//! Ontology-driven tagging.
//!
//! Applies every enabled rule of a validated ontology to the scoped fields
//! of every record in the selection window. Hits are persisted with a
//! replace-by-record write: the previous hit set for a record is fully
//! replaced in one UPDATE, never appended to, which is what makes re-running
//! the same ontology version over the same records idempotent.

use std::collections::BTreeSet;

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ClauseHit, STATUS_FAILED, STATUS_SUCCESS};
use crate::ontology::{compile, CompiledRule, OntologySummary, RuleKind, ValidatedOntology};
use crate::runs::{finish_analysis_run, start_analysis_run, AnalysisCounters};

/// The per-record field view rules are matched against.
#[derive(Debug, Clone, Default)]
pub struct FieldView<'a> {
    pub snippet: Option<&'a str>,
    pub place_text: Option<&'a str>,
    pub doc_id: Option<&'a str>,
    pub source_url: Option<&'a str>,
    pub raw_json: Option<&'a str>,
}

impl<'a> FieldView<'a> {
    fn get(&self, field: &str) -> &'a str {
        let value = match field {
            "snippet" => self.snippet,
            "place_text" => self.place_text,
            "doc_id" => self.doc_id,
            "source_url" => self.source_url,
            "raw_json" => self.raw_json,
            _ => None,
        };
        value.unwrap_or("")
    }
}

/// Deterministic tag set for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct TagResult {
    /// Sorted, deduplicated `pack:rule` ids — the coarse fallback signal.
    pub keywords: Vec<String>,
    /// Sorted by (pack, rule, field, matched).
    pub clauses: Vec<ClauseHit>,
}

/// Match every rule against the record's fields. Pure; re-applying the same
/// compiled rule set to the same fields yields an identical result.
pub fn tag_fields(rules: &[CompiledRule], fields: &FieldView) -> TagResult {
    let mut keywords: BTreeSet<String> = BTreeSet::new();
    let mut clauses: Vec<ClauseHit> = Vec::new();

    for rule in rules {
        let mut matched_rule = false;

        for field in &rule.fields {
            let text = fields.get(field);
            if text.is_empty() {
                continue;
            }

            let matched = match rule.kind {
                RuleKind::Phrase => {
                    let found = if rule.case_sensitive {
                        text.contains(&rule.pattern)
                    } else {
                        text.to_lowercase().contains(&rule.pattern.to_lowercase())
                    };
                    found.then(|| rule.pattern.clone())
                }
                RuleKind::Regex => rule
                    .regex
                    .as_ref()
                    .and_then(|re| re.find(text))
                    .map(|m| m.as_str().to_string()),
            };

            if let Some(sample) = matched {
                matched_rule = true;
                clauses.push(ClauseHit {
                    pack: rule.pack_id.clone(),
                    rule: rule.rule_id.clone(),
                    kind: rule.kind,
                    weight: rule.weight,
                    field: field.clone(),
                    matched: sample,
                });
            }
        }

        if matched_rule {
            keywords.insert(rule.keyword_id());
        }
    }

    clauses.sort_by(|a, b| {
        (&a.pack, &a.rule, &a.field, &a.matched).cmp(&(&b.pack, &b.rule, &b.field, &b.matched))
    });

    TagResult {
        keywords: keywords.into_iter().collect(),
        clauses,
    }
}

#[derive(Debug, Clone)]
pub struct ApplyParams {
    pub source: Option<String>,
    pub window_days: i64,
    pub batch: i64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApplyOutcome {
    pub analysis_run_id: i64,
    pub status: String,
    pub dry_run: bool,
    pub scanned: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub ontology: OntologySummary,
}

/// Apply an ontology to every record in the window.
///
/// Batches by ascending record id. Each record's hit set is replaced in a
/// single UPDATE, so the unit of atomicity is one record; a failure mid-run
/// leaves earlier records' committed hits in place. Exactly one analysis
/// run row is written per invocation, success or failure.
pub async fn apply_ontology(
    pool: &SqlitePool,
    validated: &ValidatedOntology,
    params: &ApplyParams,
) -> Result<ApplyOutcome> {
    let rules = compile(validated)?;
    let summary = validated.summary();
    let since = chrono::Utc::now().timestamp() - params.window_days.max(1) * 86_400;

    let run_id = start_analysis_run(
        pool,
        params.source.as_deref(),
        params.window_days,
        &summary.version,
        &summary.hash,
        params.dry_run,
    )
    .await?;

    let mut counters = AnalysisCounters::default();
    let outcome = tag_window(pool, &rules, params, since, &mut counters).await;

    match outcome {
        Ok(()) => {
            finish_analysis_run(pool, run_id, &counters, STATUS_SUCCESS, None).await?;
            info!(
                run_id,
                scanned = counters.scanned,
                updated = counters.updated,
                unchanged = counters.unchanged,
                ontology = %summary.hash,
                "tagging run complete"
            );
            Ok(ApplyOutcome {
                analysis_run_id: run_id,
                status: STATUS_SUCCESS.to_string(),
                dry_run: params.dry_run,
                scanned: counters.scanned,
                updated: counters.updated,
                unchanged: counters.unchanged,
                ontology: summary,
            })
        }
        Err(e) => {
            // Hits already committed for earlier records stay committed;
            // the run row records how far we got.
            warn!(run_id, error = %e, "tagging run failed");
            finish_analysis_run(pool, run_id, &counters, STATUS_FAILED, Some(&e.to_string()))
                .await?;
            Err(e)
        }
    }
}

async fn tag_window(
    pool: &SqlitePool,
    rules: &[CompiledRule],
    params: &ApplyParams,
    since: i64,
    counters: &mut AnalysisCounters,
) -> Result<()> {
    let mut last_id: i64 = 0;

    loop {
        let rows = sqlx::query(
            r#"
            SELECT id, doc_id, source_url, place_text, snippet, raw_json, keywords, clauses
            FROM records
            WHERE id > ?
              AND COALESCE(occurred_at, created_at) >= ?
              AND (? IS NULL OR source = ?)
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(last_id)
        .bind(since)
        .bind(&params.source)
        .bind(&params.source)
        .bind(params.batch)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Ok(());
        }

        for row in &rows {
            let id: i64 = row.get("id");
            last_id = id;
            counters.scanned += 1;

            let doc_id: String = row.get("doc_id");
            let source_url: Option<String> = row.get("source_url");
            let place_text: Option<String> = row.get("place_text");
            let snippet: Option<String> = row.get("snippet");
            let raw_json: Option<String> = row.get("raw_json");

            let fields = FieldView {
                snippet: snippet.as_deref(),
                place_text: place_text.as_deref(),
                doc_id: Some(&doc_id),
                source_url: source_url.as_deref(),
                raw_json: raw_json.as_deref(),
            };
            let result = tag_fields(rules, &fields);

            let new_keywords = serde_json::to_string(&result.keywords)?;
            let new_clauses = serde_json::to_string(&result.clauses)?;

            // Canonicalize the stored set through the same types so the
            // comparison is byte-for-byte against what we would write.
            let old_keywords: Vec<String> =
                serde_json::from_str(row.get::<String, _>("keywords").as_str()).unwrap_or_default();
            let old_clauses: Vec<ClauseHit> =
                serde_json::from_str(row.get::<String, _>("clauses").as_str()).unwrap_or_default();
            let old_keywords = serde_json::to_string(&old_keywords)?;
            let old_clauses = serde_json::to_string(&old_clauses)?;

            if new_keywords == old_keywords && new_clauses == old_clauses {
                counters.unchanged += 1;
                continue;
            }

            counters.updated += 1;
            if !params.dry_run {
                // Replace-by-record: one statement swaps the whole hit set.
                sqlx::query("UPDATE records SET keywords = ?, clauses = ? WHERE id = ?")
                    .bind(&new_keywords)
                    .bind(&new_clauses)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::parse_and_validate;

    fn compiled(doc: &str) -> Vec<CompiledRule> {
        compile(&parse_and_validate(doc).unwrap()).unwrap()
    }

    fn rules_sample() -> Vec<CompiledRule> {
        compiled(
            r#"{
            "version": "1",
            "defaults": {"fields": ["snippet", "place_text"]},
            "packs": [{"id": "materials", "name": "Materials", "rules": [
                {"id": "meta", "kind": "phrase", "pattern": "Metamaterial", "weight": 5},
                {"id": "cloak", "kind": "regex", "pattern": "cloak(ing)?", "weight": 3, "fields": ["snippet"]},
                {"id": "exact", "kind": "phrase", "pattern": "RF-X", "weight": 2, "case_sensitive": true}
            ]}]
        }"#,
        )
    }

    #[test]
    fn phrase_matching_is_case_insensitive_by_default() {
        let rules = rules_sample();
        let fields = FieldView {
            snippet: Some("novel METAMATERIAL antenna"),
            ..Default::default()
        };
        let result = tag_fields(&rules, &fields);
        assert_eq!(result.keywords, vec!["materials:meta"]);
        assert_eq!(result.clauses.len(), 1);
        assert_eq!(result.clauses[0].field, "snippet");
        assert_eq!(result.clauses[0].weight, 5.0);
    }

    #[test]
    fn case_sensitive_phrase_respects_the_flag() {
        let rules = rules_sample();
        let lower = FieldView {
            snippet: Some("rf-x prototype"),
            ..Default::default()
        };
        assert!(tag_fields(&rules, &lower).clauses.is_empty());

        let exact = FieldView {
            snippet: Some("RF-X prototype"),
            ..Default::default()
        };
        assert_eq!(tag_fields(&rules, &exact).keywords, vec!["materials:exact"]);
    }

    #[test]
    fn regex_records_the_matched_span() {
        let rules = rules_sample();
        let fields = FieldView {
            snippet: Some("adaptive Cloaking surfaces"),
            ..Default::default()
        };
        let result = tag_fields(&rules, &fields);
        assert_eq!(result.clauses[0].matched, "Cloaking");
    }

    #[test]
    fn one_rule_matching_two_fields_emits_two_clauses_one_keyword() {
        let rules = rules_sample();
        let fields = FieldView {
            snippet: Some("metamaterial sample"),
            place_text: Some("Metamaterial Labs, NM"),
            ..Default::default()
        };
        let result = tag_fields(&rules, &fields);
        assert_eq!(result.keywords, vec!["materials:meta"]);
        assert_eq!(result.clauses.len(), 2);
        let fields_hit: Vec<&str> = result.clauses.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields_hit, vec!["place_text", "snippet"]);
    }

    #[test]
    fn tagging_is_deterministic() {
        let rules = rules_sample();
        let fields = FieldView {
            snippet: Some("metamaterial cloaking for RF-X"),
            place_text: Some("metamaterial campus"),
            ..Default::default()
        };
        let a = tag_fields(&rules, &fields);
        let b = tag_fields(&rules, &fields);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.clauses).unwrap(),
            serde_json::to_string(&b.clauses).unwrap()
        );
    }

    #[test]
    fn no_match_yields_empty_sets() {
        let rules = rules_sample();
        let fields = FieldView {
            snippet: Some("routine office supplies"),
            ..Default::default()
        };
        let result = tag_fields(&rules, &fields);
        assert!(result.keywords.is_empty());
        assert!(result.clauses.is_empty());
    }
}

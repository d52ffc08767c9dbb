// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Company disambiguation among search results.
//!
//! Register numbers are not globally unique — the same `HRB 44343 B` can
//! exist at several register courts — so matching runs in tiers: an
//! optional name narrowing first, then register-number comparison of
//! decreasing strictness, then a best-effort pick among what remains.

use crate::model::CompanyRecord;

/// Result of a disambiguation attempt.
#[derive(Debug, Clone)]
pub struct MatchOutcome<'a> {
    /// The chosen record, `None` when nothing matched ("not found", not
    /// an error).
    pub record: Option<&'a CompanyRecord>,
    /// Several candidates remained and the pick is a heuristic. Advisory,
    /// never fatal.
    pub ambiguous: bool,
}

/// Pick the record matching `register_number`, optionally narrowed by
/// `company_name`.
pub fn match_company<'a>(
    companies: &'a [CompanyRecord],
    register_number: &str,
    company_name: Option<&str>,
) -> MatchOutcome<'a> {
    // 1. Name narrowing, only when it yields at least one candidate.
    let candidates: Vec<&CompanyRecord> = match company_name {
        Some(name) => {
            let narrowed = narrow_by_name(companies, name);
            if narrowed.is_empty() {
                companies.iter().collect()
            } else {
                narrowed
            }
        }
        None => companies.iter().collect(),
    };

    // 2. Register-number filter, strictest tier that yields anything.
    let matched = filter_by_register(&candidates, register_number);

    // 3. Resolve.
    match matched.len() {
        0 => MatchOutcome {
            record: None,
            ambiguous: false,
        },
        1 => MatchOutcome {
            record: Some(matched[0]),
            ambiguous: false,
        },
        _ => {
            if let Some(name) = company_name {
                let lower = name.to_lowercase();
                if let Some(by_name) = matched
                    .iter()
                    .copied()
                    .find(|c| c.name.to_lowercase().contains(&lower))
                {
                    return MatchOutcome {
                        record: Some(by_name),
                        ambiguous: false,
                    };
                }
            }
            tracing::warn!(
                register_number,
                candidates = matched.len(),
                "multiple candidates share the register number, picking the first"
            );
            MatchOutcome {
                record: Some(matched[0]),
                ambiguous: true,
            }
        }
    }
}

/// Exact match, then case-insensitive exact, then case-insensitive
/// containment in either direction.
fn narrow_by_name<'a>(companies: &'a [CompanyRecord], name: &str) -> Vec<&'a CompanyRecord> {
    let exact: Vec<&CompanyRecord> = companies.iter().filter(|c| c.name == name).collect();
    if !exact.is_empty() {
        return exact;
    }

    let lower = name.to_lowercase();
    let ci_exact: Vec<&CompanyRecord> = companies
        .iter()
        .filter(|c| c.name.to_lowercase() == lower)
        .collect();
    if !ci_exact.is_empty() {
        return ci_exact;
    }

    companies
        .iter()
        .filter(|c| {
            let candidate = c.name.to_lowercase();
            candidate.contains(&lower) || lower.contains(&candidate)
        })
        .collect()
}

/// Exact match, then whitespace-normalized match, then prefix match
/// (the returned value may extend the query with a suffix).
fn filter_by_register<'a>(
    candidates: &[&'a CompanyRecord],
    register_number: &str,
) -> Vec<&'a CompanyRecord> {
    let exact: Vec<&CompanyRecord> = candidates
        .iter()
        .filter(|c| c.register_number.as_deref() == Some(register_number))
        .copied()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let compact: String = register_number.split_whitespace().collect();
    let normalized: Vec<&CompanyRecord> = candidates
        .iter()
        .filter(|c| {
            c.register_number
                .as_deref()
                .map(|r| r.split_whitespace().collect::<String>() == compact)
                .unwrap_or(false)
        })
        .copied()
        .collect();
    if !normalized.is_empty() {
        return normalized;
    }

    candidates
        .iter()
        .filter(|c| {
            c.register_number
                .as_deref()
                .map(|r| r.starts_with(register_number))
                .unwrap_or(false)
        })
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(register: &str, name: &str) -> CompanyRecord {
        CompanyRecord {
            court: String::new(),
            register_number: Some(register.to_string()),
            name: name.to_string(),
            federal_state: "Berlin".to_string(),
            city: None,
            status_label: "currently registered".to_string(),
            status_code: "CURRENTLY_REGISTERED".to_string(),
            history: Vec::new(),
            document_handle: None,
            documents: Vec::new(),
        }
    }

    #[test]
    fn test_exact_register_match_without_name() {
        let companies = vec![
            company("HRB 1111", "Irrelevant GmbH"),
            company("HRB 44343 B", "Example GmbH"),
        ];
        let outcome = match_company(&companies, "HRB 44343 B", None);
        assert_eq!(outcome.record.unwrap().name, "Example GmbH");
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn test_name_resolves_shared_register_number() {
        let companies = vec![
            company("HRB 44343 B", "Other GmbH"),
            company("HRB 44343 B", "Example GmbH"),
        ];
        // The named record wins even though it is not first in the set.
        let outcome = match_company(&companies, "HRB 44343 B", Some("Example GmbH"));
        assert_eq!(outcome.record.unwrap().name, "Example GmbH");
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn test_shared_register_number_without_name_is_ambiguous() {
        let companies = vec![
            company("HRB 44343 B", "Erste GmbH"),
            company("HRB 44343 B", "Zweite GmbH"),
        ];
        let outcome = match_company(&companies, "HRB 44343 B", None);
        assert_eq!(outcome.record.unwrap().name, "Erste GmbH");
        assert!(outcome.ambiguous);
    }

    #[test]
    fn test_whitespace_normalized_match() {
        let companies = vec![company("HRB  44343  B", "Spaced GmbH")];
        let outcome = match_company(&companies, "HRB 44343 B", None);
        assert_eq!(outcome.record.unwrap().name, "Spaced GmbH");
    }

    #[test]
    fn test_prefix_match_handles_suffixed_result() {
        // The query lacks the suffix the portal appends.
        let companies = vec![company("HRB 44343 B", "Suffixed GmbH")];
        let outcome = match_company(&companies, "HRB 44343", None);
        assert_eq!(outcome.record.unwrap().name, "Suffixed GmbH");
    }

    #[test]
    fn test_case_insensitive_name_narrowing() {
        let companies = vec![
            company("HRB 1", "EXAMPLE GMBH"),
            company("HRB 1", "Beispiel AG"),
        ];
        let outcome = match_company(&companies, "HRB 1", Some("example gmbh"));
        assert_eq!(outcome.record.unwrap().name, "EXAMPLE GMBH");
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn test_substring_name_narrowing() {
        let companies = vec![
            company("HRB 1", "Example Holding GmbH"),
            company("HRB 1", "Beispiel AG"),
        ];
        let outcome = match_company(&companies, "HRB 1", Some("example holding"));
        assert_eq!(outcome.record.unwrap().name, "Example Holding GmbH");
    }

    #[test]
    fn test_no_match_is_not_found() {
        let companies = vec![company("HRB 1111", "Irrelevant GmbH")];
        let outcome = match_company(&companies, "VR 999", None);
        assert!(outcome.record.is_none());
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn test_unmatched_name_falls_back_to_register_tier() {
        let companies = vec![company("HRB 7", "Umbenannt GmbH")];
        // The supplied name matches nothing; register matching still runs
        // over the full set.
        let outcome = match_company(&companies, "HRB 7", Some("Alte Firma AG"));
        assert_eq!(outcome.record.unwrap().name, "Umbenannt GmbH");
    }
}

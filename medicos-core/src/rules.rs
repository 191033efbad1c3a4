//! Symptom rule table and the keyword matcher that runs in front of the model.
//!
//! Matching is plain case-insensitive substring containment evaluated in
//! declaration order: the first rule whose keyword occurs anywhere in the
//! lower-cased input wins. There is no tokenisation or scoring, so
//! "feverish" matches `fever`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// A canned answer for one symptom keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub keyword: String,
    pub initial_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_response: Option<String>,
}

impl SymptomEntry {
    pub fn new(keyword: impl Into<String>, initial_response: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            initial_response: initial_response.into(),
            treatment_response: None,
        }
    }

    pub fn with_treatment(mut self, treatment: impl Into<String>) -> Self {
        self.treatment_response = Some(treatment.into());
        self
    }

    /// Reply sent when this entry is matched.
    pub fn initial_reply(&self) -> String {
        format!(
            "I noticed you mentioned '{}'. {}",
            self.keyword, self.initial_response
        )
    }
}

/// Ordered, immutable rule table.
#[derive(Debug, Clone)]
pub struct SymptomRules {
    entries: Vec<SymptomEntry>,
}

impl SymptomRules {
    /// Builds a table, lower-casing keywords. Empty or duplicate keywords are rejected.
    pub fn new(entries: Vec<SymptomEntry>) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(entries.len());

        for mut entry in entries {
            let keyword = entry.keyword.trim().to_lowercase();
            if keyword.is_empty() {
                return Err(RuleError::EmptyKeyword);
            }
            if !seen.insert(keyword.clone()) {
                return Err(RuleError::DuplicateKeyword(keyword));
            }
            entry.keyword = keyword;
            normalized.push(entry);
        }

        Ok(Self {
            entries: normalized,
        })
    }

    /// Parses a JSON array of entries, e.g. loaded from `SYMPTOM_RULES_PATH`.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let entries: Vec<SymptomEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn builtin() -> Self {
        Self {
            entries: builtin_entries(),
        }
    }

    /// First entry, in declaration order, whose keyword is a substring of `text`.
    pub fn match_text(&self, text: &str) -> Option<&SymptomEntry> {
        if text.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        self.entries
            .iter()
            .find(|entry| lowered.contains(entry.keyword.as_str()))
    }

    pub fn get(&self, keyword: &str) -> Option<&SymptomEntry> {
        self.entries.iter().find(|entry| entry.keyword == keyword)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymptomRules {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_entries() -> Vec<SymptomEntry> {
    vec![
        SymptomEntry::new(
            "fever",
            "This might indicate an infection or flu. Consider taking paracetamol and staying hydrated. If it persists, consult a doctor.",
        )
        .with_treatment(
            "Here are some treatments for fever:
1. Take over-the-counter fever reducers like paracetamol or ibuprofen
2. Stay hydrated by drinking plenty of fluids
3. Get plenty of rest
4. Use a cool compress on your forehead
5. Wear light clothing and keep room temperature comfortable
6. If fever persists over 3 days or exceeds 39.4°C (103°F), consult a doctor immediately.",
        ),
        SymptomEntry::new(
            "cough",
            "This could be related to a cold, allergies, or bronchitis. Stay hydrated and consider consulting a doctor if it lasts more than a few days.",
        )
        .with_treatment(
            "Common treatments for cough include:
1. Over-the-counter cough suppressants
2. Honey and warm water
3. Stay hydrated
4. Use a humidifier
5. Get plenty of rest",
        ),
        SymptomEntry::new(
            "headache",
            "This could be due to stress, tension, or other factors. Try to rest and avoid bright lights.",
        )
        .with_treatment(
            "Here are some treatments for headache:
1. Take over-the-counter pain relievers
2. Rest in a quiet, dark room
3. Apply a cold or warm compress
4. Stay hydrated
5. Practice stress-relief techniques
6. If severe or persistent, consult a doctor",
        ),
        SymptomEntry::new(
            "stomach pain",
            "This might be due to indigestion, gas, or other digestive issues. Monitor your symptoms and avoid heavy foods.",
        )
        .with_treatment(
            "Here are some treatments for stomach pain:
1. Try over-the-counter antacids
2. Eat bland foods (BRAT diet)
3. Avoid spicy or fatty foods
4. Stay hydrated
5. Use a heating pad
6. If severe or persistent, seek medical attention",
        ),
        SymptomEntry::new(
            "sneezing",
            "Sneezing often indicates an allergy or the onset of a cold. Try to avoid allergens and rest well.",
        ),
        SymptomEntry::new(
            "body heating",
            "A feeling of overheating might be due to fever or dehydration. Ensure you drink enough water and rest.",
        ),
    ]
}

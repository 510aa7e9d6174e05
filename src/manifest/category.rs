//! Categorical vocabulary of a manifest.
//!
//! Every string threshold in a manifest gets a dense integer code, assigned
//! in first-appearance order. The codes are collision-free by construction,
//! which lets both the vectorized evaluator and the formal verifier treat
//! categorical equality as integer equality.

use std::collections::BTreeMap;

use crate::value::Value;

use super::DomainManifest;

/// Dense string → code table. Codes start at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTable {
    codes: BTreeMap<String, u32>,
    labels: Vec<String>,
}

impl CategoryTable {
    /// Builds the table from every string threshold in the manifest.
    #[must_use]
    pub fn from_manifest(manifest: &DomainManifest) -> Self {
        let mut table = Self::default();
        for constraint in manifest.constraints() {
            for value in constraint.threshold().values() {
                if let Value::Text(s) = value {
                    table.intern(s);
                }
            }
        }
        table
    }

    fn intern(&mut self, label: &str) -> u32 {
        if let Some(&code) = self.codes.get(label) {
            return code;
        }
        self.labels.push(label.to_string());
        #[allow(clippy::cast_possible_truncation)]
        let code = self.labels.len() as u32;
        self.codes.insert(label.to_string(), code);
        code
    }

    /// Code of a known label.
    #[must_use]
    pub fn code(&self, label: &str) -> Option<u32> {
        self.codes.get(label).copied()
    }

    /// Label of a known code.
    #[must_use]
    pub fn label(&self, code: u32) -> Option<&str> {
        let idx = usize::try_from(code).ok()?.checked_sub(1)?;
        self.labels.get(idx).map(String::as_str)
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if no rule uses a text threshold.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

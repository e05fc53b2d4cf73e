//! Source catalog lookups and display reconciliation.
//!
//! The catalog is rebuilt from the `rag sources` rows on every cache refresh.
//! Two sources sharing a display name resolve last-write-wins in catalog
//! order; the collision is logged, never "fixed".

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{KnowledgeBaseSource, SourceCode, TenantMapping};

/// `CodeToName` and `NameToCode`, built in one pass.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    code_to_name: HashMap<SourceCode, String>,
    /// Ordered by display name, which gives the sorted option list for free.
    name_to_code: BTreeMap<String, SourceCode>,
}

impl SourceCatalog {
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = KnowledgeBaseSource>,
    {
        let mut catalog = Self::default();
        for source in sources {
            if let Some(previous) = catalog
                .name_to_code
                .insert(source.display_name.clone(), source.code.clone())
            {
                if previous != source.code {
                    tracing::warn!(
                        name = %source.display_name,
                        dropped = %previous,
                        kept = %source.code,
                        "duplicate source display name; last entry wins"
                    );
                }
            }
            catalog.code_to_name.insert(source.code, source.display_name);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.code_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_name.is_empty()
    }

    pub fn name_for(&self, code: &SourceCode) -> Option<&str> {
        self.code_to_name.get(code).map(String::as_str)
    }

    pub fn code_for(&self, name: &str) -> Option<&SourceCode> {
        self.name_to_code.get(name)
    }

    /// Name → code, falling back to the raw name when the catalog has no
    /// such entry (mirrors the display fallback).
    pub fn resolve_code(&self, name: &str) -> SourceCode {
        self.code_for(name)
            .cloned()
            .unwrap_or_else(|| SourceCode::new(name))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_to_code.contains_key(name)
    }

    /// Display names for a choice widget, ascending, each listed once.
    pub fn display_options(&self) -> Vec<String> {
        self.name_to_code.keys().cloned().collect()
    }
}

/// Display name for the tenant's stored code, or the raw code itself when
/// the catalog does not know it.
pub fn resolve_display(tenant: &TenantMapping, catalog: &SourceCatalog) -> String {
    catalog
        .name_for(&tenant.source_code)
        .map(str::to_string)
        .unwrap_or_else(|| tenant.source_code.as_str().to_string())
}

/// Sorts (code-point order) and de-duplicates an arbitrary set of names.
pub fn display_options<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    names.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Index of the pre-seeded selection: `current` when it is one of the
/// options, otherwise the first option. `None` only for an empty list.
pub fn default_selection(current: &str, options: &[String]) -> Option<usize> {
    if options.is_empty() {
        return None;
    }
    Some(options.iter().position(|o| o == current).unwrap_or(0))
}

/// Per-row display state for the "existing mappings" section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantView<'a> {
    pub tenant: &'a TenantMapping,
    pub display_name: String,
    pub selected: Option<usize>,
}

/// Resolves every tenant against the catalog. `options` must be the list the
/// page will render, so that `selected` indexes into it.
pub fn reconcile<'a>(
    tenants: &'a [TenantMapping],
    catalog: &SourceCatalog,
    options: &[String],
) -> Vec<TenantView<'a>> {
    tenants
        .iter()
        .map(|tenant| {
            let display_name = resolve_display(tenant, catalog);
            let selected = default_selection(&display_name, options);
            TenantView {
                tenant,
                display_name,
                selected,
            }
        })
        .collect()
}

//! Reference dictionaries (types of assistance, natures of donation,
//! campaigns), supplied by the backend and cached in memory.
//!
//! The store is hydrated once at startup and refreshed on demand; lookups
//! are cheap clones, matching how the rest of the service treats backend
//! data as authoritative snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAssistance {
    pub id: i64,
    pub libelle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatureDon {
    pub id: i64,
    pub libelle: String,
    /// Explicit loan marker. Older backends do not send it, in which case
    /// classification falls back to the label heuristic in [`crate::loan`].
    #[serde(default)]
    pub is_loan: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campagne {
    pub id: i64,
    pub libelle: String,
    /// Label of the campaign's type of assistance, used as a fallback when
    /// an intake form has a campaign but no direct type selection.
    #[serde(default)]
    pub type_assistance_libelle: Option<String>,
}

/// Full dictionary payload as served by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dictionaries {
    #[serde(default)]
    pub types_assistance: Vec<TypeAssistance>,
    #[serde(default)]
    pub natures_don: Vec<NatureDon>,
    #[serde(default)]
    pub campagnes: Vec<Campagne>,
}

/// Shared, refreshable dictionary cache.
#[derive(Debug, Clone, Default)]
pub struct RefData {
    inner: Arc<RwLock<Indexed>>,
}

#[derive(Debug, Default)]
struct Indexed {
    types_assistance: HashMap<i64, TypeAssistance>,
    natures_don: HashMap<i64, NatureDon>,
    campagnes: HashMap<i64, Campagne>,
}

impl RefData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached dictionaries with a fresh snapshot.
    pub fn replace(&self, dict: Dictionaries) {
        info!(
            "Dictionaries loaded: {} types, {} natures, {} campaigns",
            dict.types_assistance.len(),
            dict.natures_don.len(),
            dict.campagnes.len()
        );
        let indexed = Indexed {
            types_assistance: dict.types_assistance.into_iter().map(|t| (t.id, t)).collect(),
            natures_don: dict.natures_don.into_iter().map(|n| (n.id, n)).collect(),
            campagnes: dict.campagnes.into_iter().map(|c| (c.id, c)).collect(),
        };
        *self.inner.write().unwrap() = indexed;
    }

    pub fn type_assistance(&self, id: i64) -> Option<TypeAssistance> {
        self.inner.read().unwrap().types_assistance.get(&id).cloned()
    }

    pub fn nature_don(&self, id: i64) -> Option<NatureDon> {
        self.inner.read().unwrap().natures_don.get(&id).cloned()
    }

    pub fn campagne(&self, id: i64) -> Option<Campagne> {
        self.inner.read().unwrap().campagnes.get(&id).cloned()
    }

    /// Label of a type of assistance, if known.
    pub fn type_assistance_label(&self, id: i64) -> Option<String> {
        self.type_assistance(id).map(|t| t.libelle)
    }

    /// Type-of-assistance label carried by a campaign, if any.
    pub fn campagne_type_label(&self, id: i64) -> Option<String> {
        self.campagne(id).and_then(|c| c.type_assistance_libelle)
    }
}

#[cfg(test)]
pub(crate) fn sample() -> RefData {
    let refdata = RefData::new();
    refdata.replace(Dictionaries {
        types_assistance: vec![
            TypeAssistance { id: 5, libelle: "Lunettes de vue".to_string() },
            TypeAssistance { id: 7, libelle: "Appareil auditif".to_string() },
            TypeAssistance { id: 9, libelle: "Aide financière".to_string() },
            TypeAssistance { id: 11, libelle: "Appareil orthopédique".to_string() },
        ],
        natures_don: vec![
            NatureDon { id: 1, libelle: "Don définitif".to_string(), is_loan: Some(false) },
            NatureDon { id: 2, libelle: "Prêt temporaire".to_string(), is_loan: Some(true) },
            NatureDon { id: 3, libelle: "Pour une durée déterminée".to_string(), is_loan: None },
        ],
        campagnes: vec![
            Campagne {
                id: 100,
                libelle: "Campagne lunettes 2024".to_string(),
                type_assistance_libelle: Some("Lunettes de vue".to_string()),
            },
            Campagne {
                id: 101,
                libelle: "Campagne auditive 2024".to_string(),
                type_assistance_libelle: Some("Appareil auditif".to_string()),
            },
        ],
    });
    refdata
}

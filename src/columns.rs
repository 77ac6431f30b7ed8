//! Header-to-field mapping for bulk beneficiary imports.
//!
//! Uploaded spreadsheets come with locale-specific, free-form column
//! headers. This module normalizes those headers and maps them onto the
//! fixed set of canonical beneficiary fields via a synonym table.

use serde::{Deserialize, Serialize};

/// A canonical beneficiary import column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Nom,
    Prenom,
    Sexe,
    Telephone,
    Adresse,
    DateNaissance,
    Email,
    Cin,
    Commentaire,
    Decision,
    Cote,
    Lateralite,
    EnfantsScolarises,
}

impl CanonicalField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nom => "nom",
            Self::Prenom => "prenom",
            Self::Sexe => "sexe",
            Self::Telephone => "telephone",
            Self::Adresse => "adresse",
            Self::DateNaissance => "date_naissance",
            Self::Email => "email",
            Self::Cin => "cin",
            Self::Commentaire => "commentaire",
            Self::Decision => "decision",
            Self::Cote => "cote",
            Self::Lateralite => "lateralite",
            Self::EnfantsScolarises => "enfants_scolarises",
        }
    }

    /// Accepted header spellings, canonical name first.
    fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::Nom => &["nom", "nom_famille", "nom de famille", "lastname", "last_name"],
            Self::Prenom => &["prenom", "prénom", "firstname", "first_name"],
            Self::Sexe => &["sexe", "genre", "sex", "gender"],
            Self::Telephone => &["telephone", "téléphone", "phone", "tel", "gsm"],
            Self::Adresse => &["adresse", "address", "addr"],
            Self::DateNaissance => &[
                "date_naissance",
                "date de naissance",
                "date naissance",
                "naissance",
                "birthdate",
                "date_of_birth",
            ],
            Self::Email => &["email", "e-mail", "mail", "courriel"],
            Self::Cin => &["cin", "c.i.n", "carte identite", "carte d'identite"],
            Self::Commentaire => &["commentaire", "commentaires", "remarque", "observation"],
            Self::Decision => &["decision", "décision"],
            Self::Cote => &["cote", "côté"],
            Self::Lateralite => &["lateralite", "latéralité"],
            Self::EnfantsScolarises => &[
                "enfants_scolarises",
                "enfants scolarises",
                "enfants scolarisés",
                "scolarise",
            ],
        }
    }
}

/// All canonical fields, in detection priority order.
pub const ALL_FIELDS: [CanonicalField; 13] = [
    CanonicalField::Nom,
    CanonicalField::Prenom,
    CanonicalField::Sexe,
    CanonicalField::Telephone,
    CanonicalField::Adresse,
    CanonicalField::DateNaissance,
    CanonicalField::Email,
    CanonicalField::Cin,
    CanonicalField::Commentaire,
    CanonicalField::Decision,
    CanonicalField::Cote,
    CanonicalField::Lateralite,
    CanonicalField::EnfantsScolarises,
];

/// Columns that must be present for an import to be accepted.
pub const REQUIRED_FIELDS: [CanonicalField; 5] = [
    CanonicalField::Nom,
    CanonicalField::Prenom,
    CanonicalField::Sexe,
    CanonicalField::Adresse,
    CanonicalField::Telephone,
];

/// A header that matched no canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownColumn {
    pub header: String,
    pub index: usize,
}

/// Result of header detection: canonical field → column index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub fields: Vec<(CanonicalField, usize)>,
    pub unknown: Vec<UnknownColumn>,
}

impl ColumnMapping {
    pub fn index_of(&self, field: CanonicalField) -> Option<usize> {
        self.fields.iter().find(|(f, _)| *f == field).map(|(_, i)| *i)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.index_of(field).is_some()
    }

    /// Required fields not detected in the headers.
    pub fn missing_required(&self) -> Vec<CanonicalField> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| !self.contains(*f))
            .collect()
    }

    pub fn has_required(&self) -> bool {
        self.missing_required().is_empty()
    }
}

/// Map raw headers onto canonical fields, first match wins.
///
/// Headers must already be lowercased and trimmed (see [`normalize_header`]).
/// Each canonical field binds to at most one column; a header whose field is
/// already bound, or that matches nothing, lands in `unknown` with its
/// original text and index.
pub fn map_headers(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();

    for (index, header) in headers.iter().enumerate() {
        let matched = ALL_FIELDS
            .iter()
            .copied()
            .find(|f| f.synonyms().contains(&header.as_str()));

        match matched {
            Some(field) if !mapping.contains(field) => {
                mapping.fields.push((field, index));
            }
            _ => mapping.unknown.push(UnknownColumn {
                header: header.clone(),
                index,
            }),
        }
    }

    mapping
}

/// Lowercase, trim, and fold the diacritics that show up in real exports.
///
/// Folding is a fixed table, not full Unicode normalization: the synonym
/// lists carry the accented spellings seen in the field, and this catches
/// the rest (mixed-case "Téléphone", trailing spaces from Excel).
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_canonical_names_map_to_themselves() {
        let input: Vec<String> = ALL_FIELDS.iter().map(|f| f.name().to_string()).collect();
        let mapping = map_headers(&input);
        assert!(mapping.unknown.is_empty());
        for (i, field) in ALL_FIELDS.iter().enumerate() {
            assert_eq!(mapping.index_of(*field), Some(i));
        }
    }

    #[test]
    fn test_first_match_wins_on_duplicate() {
        let mapping = map_headers(&headers(&["nom", "nom_famille"]));
        assert_eq!(mapping.index_of(CanonicalField::Nom), Some(0));
        assert_eq!(mapping.unknown.len(), 1);
        assert_eq!(mapping.unknown[0].header, "nom_famille");
        assert_eq!(mapping.unknown[0].index, 1);
    }

    #[test]
    fn test_unmatched_header_recorded_as_unknown() {
        let mapping = map_headers(&headers(&["nom", "couleur_preferee"]));
        assert_eq!(mapping.unknown.len(), 1);
        assert_eq!(mapping.unknown[0].header, "couleur_preferee");
    }

    #[test]
    fn test_missing_required_columns() {
        let mapping = map_headers(&headers(&["nom", "prenom", "sexe", "adresse"]));
        assert!(!mapping.has_required());
        assert_eq!(mapping.missing_required(), vec![CanonicalField::Telephone]);
    }

    #[test]
    fn test_synonym_detection() {
        let mapping = map_headers(&headers(&["gsm", "prénom"]));
        assert_eq!(mapping.index_of(CanonicalField::Telephone), Some(0));
        assert_eq!(mapping.index_of(CanonicalField::Prenom), Some(1));
    }

    #[test]
    fn test_normalize_header_folds_accents_and_case() {
        assert_eq!(normalize_header("  Téléphone "), "telephone");
        assert_eq!(normalize_header("Décision"), "decision");
    }
}

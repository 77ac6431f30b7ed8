//! Intake form state for beneficiaries and medical-assistance records.
//!
//! The drafts are explicit typed records (every optional field a nullable
//! member) mutated through setters so that the dependent-field rules hold
//! by construction: changing the type of assistance clears stale
//! conditional answers, campaign and hors-campagne are mutually exclusive,
//! and the loan-return date is rederived on every relevant change.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::loan;
use crate::refdata::RefData;

/// Adult threshold in years.
const MAJORITY_AGE: i32 = 18;

/// Label fragments (accented and plain spellings) driving conditional fields.
const MARKERS_ENFANTS: [&str; 3] = ["lunette", "auditif", "appareil auditif"];
const MARKERS_COTE: [&str; 2] = ["auditif", "appareil auditif"];
const MARKERS_LATERALITE: [&str; 6] = [
    "auditif",
    "appareil auditif",
    "orthopedique",
    "orthopédique",
    "prothese",
    "prothèse",
];

// ============================================================================
// Beneficiary draft
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeneficiaryDraft {
    pub nom: String,
    pub prenom: String,
    pub sexe: String,
    pub date_naissance: Option<NaiveDate>,
    pub telephone: String,
    pub adresse: String,
    pub cin: Option<String>,
    pub email: Option<String>,
    pub type_assistance_id: Option<i64>,
    pub campagne_id: Option<i64>,
    pub hors_campagne: bool,
    pub enfants_scolarises: Option<bool>,
    pub cote: String,
    pub lateralite: String,
    pub decision: Option<String>,
    pub a_beneficie: bool,
    pub commentaire: Option<String>,
}

impl BeneficiaryDraft {
    /// Change the type of assistance. Conditional answers belong to the
    /// previous type and must not survive the change.
    pub fn set_type_assistance(&mut self, id: Option<i64>) {
        if self.type_assistance_id == id {
            return;
        }
        self.type_assistance_id = id;
        self.enfants_scolarises = None;
        self.cote.clear();
        self.lateralite.clear();
    }

    /// Select a campaign. A concrete campaign and the hors-campagne flag
    /// are never simultaneously meaningful.
    pub fn set_campagne(&mut self, id: Option<i64>) {
        self.campagne_id = id;
        if id.is_some() {
            self.hors_campagne = false;
        }
    }

    pub fn set_hors_campagne(&mut self, hors_campagne: bool) {
        self.hors_campagne = hors_campagne;
        if hors_campagne {
            self.campagne_id = None;
        }
    }
}

// ============================================================================
// Derived state
// ============================================================================

/// Fields the required-field predicate can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Nom,
    Prenom,
    Sexe,
    DateNaissance,
    Telephone,
    Adresse,
    Cin,
    Email,
    TypeAssistance,
    Campagne,
    EnfantsScolarises,
    Cote,
    Lateralite,
    Decision,
    Commentaire,
}

/// Derivations recomputed from the draft on every input change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Derived {
    pub age: Option<i32>,
    pub is_minor: bool,
    pub effective_label: String,
    pub requires_enfants_scolarises: bool,
    pub requires_cote: bool,
    pub requires_lateralite: bool,
}

/// Evaluate the conditional-field rules against today's date.
pub fn evaluate(draft: &BeneficiaryDraft, refdata: &RefData) -> Derived {
    evaluate_at(draft, refdata, Local::now().date_naive())
}

/// Evaluate against an explicit "today", so boundaries are testable.
pub fn evaluate_at(draft: &BeneficiaryDraft, refdata: &RefData, today: NaiveDate) -> Derived {
    let age = draft.date_naissance.map(|born| age_on(born, today));
    let is_minor = age.map(|a| a < MAJORITY_AGE).unwrap_or(false);

    let effective_label = effective_type_label(draft, refdata);

    let requires_enfants_scolarises =
        is_minor && contains_any(&effective_label, &MARKERS_ENFANTS);
    let requires_cote = contains_any(&effective_label, &MARKERS_COTE);
    let requires_lateralite = contains_any(&effective_label, &MARKERS_LATERALITE);

    Derived {
        age,
        is_minor,
        effective_label,
        requires_enfants_scolarises,
        requires_cote,
        requires_lateralite,
    }
}

/// Whether a field must be filled for this draft to be submittable.
pub fn is_field_required(field: FormField, draft: &BeneficiaryDraft, refdata: &RefData) -> bool {
    let derived = evaluate(draft, refdata);
    match field {
        FormField::Nom
        | FormField::Prenom
        | FormField::Sexe
        | FormField::DateNaissance
        | FormField::Telephone
        | FormField::Adresse
        | FormField::TypeAssistance => true,
        FormField::Campagne => !draft.hors_campagne,
        FormField::EnfantsScolarises => derived.requires_enfants_scolarises,
        FormField::Cote => derived.requires_cote,
        // Laterality is surfaced when the type calls for it
        // (`requires_lateralite`) but never blocks submission.
        FormField::Lateralite
        | FormField::Cin
        | FormField::Email
        | FormField::Decision
        | FormField::Commentaire => false,
    }
}

/// All fields currently required, for the form payload.
pub fn required_fields(draft: &BeneficiaryDraft, refdata: &RefData) -> Vec<FormField> {
    use FormField::*;
    [
        Nom, Prenom, Sexe, DateNaissance, Telephone, Adresse, Cin, Email, TypeAssistance,
        Campagne, EnfantsScolarises, Cote, Lateralite, Decision, Commentaire,
    ]
    .into_iter()
    .filter(|f| is_field_required(*f, draft, refdata))
    .collect()
}

/// Completed years between birth and `today`: calendar arithmetic, one
/// year subtracted when the birthday has not yet passed this year.
fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    age
}

/// Lowercased type-of-assistance label: the direct selection when present
/// and non-empty, else the label carried by the selected campaign.
fn effective_type_label(draft: &BeneficiaryDraft, refdata: &RefData) -> String {
    let direct = draft
        .type_assistance_id
        .and_then(|id| refdata.type_assistance_label(id))
        .filter(|l| !l.is_empty());
    let fallback = draft
        .campagne_id
        .and_then(|id| refdata.campagne_type_label(id));

    direct.or(fallback).unwrap_or_default().to_lowercase()
}

fn contains_any(label: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| label.contains(m))
}

// ============================================================================
// Assistance draft
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistanceDraft {
    pub beneficiaire_id: Option<i64>,
    pub type_assistance_id: Option<i64>,
    pub nature_done_id: Option<i64>,
    pub etat_don_id: Option<i64>,
    pub situation_id: Option<i64>,
    pub campagne_id: Option<i64>,
    pub date_assistance: Option<NaiveDate>,
    pub montant: Option<f64>,
    pub priorite: Option<String>,
    pub duree_utilisation: Option<i64>,
    /// Derived, never set directly: see [`AssistanceDraft::recompute`].
    pub date_fin_prevue: Option<NaiveDate>,
    pub observations: Option<String>,
}

impl AssistanceDraft {
    /// Loan classification of the selected nature of donation.
    pub fn is_pret(&self, refdata: &RefData) -> bool {
        self.nature_done_id
            .and_then(|id| refdata.nature_don(id))
            .map(|n| loan::is_loan(&n))
            .unwrap_or(false)
    }

    /// Change the nature of donation. Moving to a non-loan nature clears
    /// the loan fields regardless of their prior values.
    pub fn set_nature_don(&mut self, id: Option<i64>, refdata: &RefData) {
        self.nature_done_id = id;
        if !self.is_pret(refdata) {
            self.duree_utilisation = None;
            self.date_fin_prevue = None;
        }
        self.recompute(refdata);
    }

    pub fn set_date_assistance(&mut self, date: Option<NaiveDate>, refdata: &RefData) {
        self.date_assistance = date;
        self.recompute(refdata);
    }

    pub fn set_duree_utilisation(&mut self, duree: Option<i64>, refdata: &RefData) {
        self.duree_utilisation = duree;
        self.recompute(refdata);
    }

    /// Rederive the expected return date from the current inputs.
    pub fn recompute(&mut self, refdata: &RefData) {
        self.date_fin_prevue = loan::date_fin_prevue(
            self.is_pret(refdata),
            self.date_assistance,
            self.duree_utilisation,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refdata;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let born = date(2006, 3, 10);
        assert_eq!(age_on(born, date(2024, 3, 10)), 18);
        assert_eq!(age_on(born, date(2024, 3, 9)), 17);
        assert_eq!(age_on(born, date(2024, 3, 11)), 18);
    }

    #[test]
    fn test_minor_boundary_at_exactly_18_years() {
        let refs = refdata::sample();
        let today = date(2024, 6, 1);

        let mut draft = BeneficiaryDraft::default();
        draft.date_naissance = Some(date(2006, 6, 1));
        assert!(!evaluate_at(&draft, &refs, today).is_minor);

        draft.date_naissance = Some(date(2006, 6, 2));
        assert!(evaluate_at(&draft, &refs, today).is_minor);
    }

    #[test]
    fn test_no_birth_date_means_not_minor() {
        let refs = refdata::sample();
        let draft = BeneficiaryDraft::default();
        let derived = evaluate_at(&draft, &refs, date(2024, 6, 1));
        assert_eq!(derived.age, None);
        assert!(!derived.is_minor);
    }

    #[test]
    fn test_campaign_label_fallback() {
        let refs = refdata::sample();
        let mut draft = BeneficiaryDraft::default();
        draft.set_campagne(Some(101)); // Campagne auditive
        let derived = evaluate_at(&draft, &refs, date(2024, 6, 1));
        assert_eq!(derived.effective_label, "appareil auditif");
        assert!(derived.requires_cote);
        assert!(derived.requires_lateralite);
    }

    #[test]
    fn test_direct_type_wins_over_campaign() {
        let refs = refdata::sample();
        let mut draft = BeneficiaryDraft::default();
        draft.set_campagne(Some(101));
        draft.set_type_assistance(Some(5)); // Lunettes
        let derived = evaluate_at(&draft, &refs, date(2024, 6, 1));
        assert_eq!(derived.effective_label, "lunettes de vue");
        assert!(!derived.requires_cote);
    }

    #[test]
    fn test_enfants_scolarises_requires_minor_and_matching_type() {
        let refs = refdata::sample();
        let today = date(2024, 6, 1);

        let mut draft = BeneficiaryDraft::default();
        draft.set_type_assistance(Some(5)); // Lunettes
        draft.date_naissance = Some(date(2015, 1, 1));
        assert!(evaluate_at(&draft, &refs, today).requires_enfants_scolarises);

        // Adult with the same type: not required.
        draft.date_naissance = Some(date(1990, 1, 1));
        assert!(!evaluate_at(&draft, &refs, today).requires_enfants_scolarises);

        // Minor with a non-matching type: not required.
        draft.date_naissance = Some(date(2015, 1, 1));
        draft.set_type_assistance(Some(9)); // Aide financière
        assert!(!evaluate_at(&draft, &refs, today).requires_enfants_scolarises);
    }

    #[test]
    fn test_lateralite_for_orthopedic_type() {
        let refs = refdata::sample();
        let mut draft = BeneficiaryDraft::default();
        draft.set_type_assistance(Some(11)); // Appareil orthopédique
        let derived = evaluate_at(&draft, &refs, date(2024, 6, 1));
        assert!(derived.requires_lateralite);
        assert!(!derived.requires_cote);
    }

    #[test]
    fn test_type_change_resets_conditional_answers() {
        let mut draft = BeneficiaryDraft::default();
        draft.set_type_assistance(Some(5));
        draft.cote = "bilatéral".to_string();
        draft.lateralite = "gauche".to_string();
        draft.enfants_scolarises = Some(true);

        draft.set_type_assistance(Some(7));
        assert_eq!(draft.cote, "");
        assert_eq!(draft.lateralite, "");
        assert_eq!(draft.enfants_scolarises, None);
    }

    #[test]
    fn test_same_type_does_not_reset() {
        let mut draft = BeneficiaryDraft::default();
        draft.set_type_assistance(Some(5));
        draft.cote = "droit".to_string();
        draft.set_type_assistance(Some(5));
        assert_eq!(draft.cote, "droit");
    }

    #[test]
    fn test_campagne_and_hors_campagne_are_exclusive() {
        let mut draft = BeneficiaryDraft::default();
        draft.set_campagne(Some(100));
        draft.set_hors_campagne(true);
        assert_eq!(draft.campagne_id, None);

        draft.set_campagne(Some(100));
        assert!(!draft.hors_campagne);
        assert_eq!(draft.campagne_id, Some(100));
    }

    #[test]
    fn test_required_field_predicate() {
        let refs = refdata::sample();
        let mut draft = BeneficiaryDraft::default();

        assert!(is_field_required(FormField::Nom, &draft, &refs));
        assert!(is_field_required(FormField::TypeAssistance, &draft, &refs));
        assert!(is_field_required(FormField::Campagne, &draft, &refs));
        assert!(!is_field_required(FormField::Email, &draft, &refs));
        assert!(!is_field_required(FormField::Cote, &draft, &refs));

        draft.set_hors_campagne(true);
        assert!(!is_field_required(FormField::Campagne, &draft, &refs));

        draft.set_type_assistance(Some(7)); // Appareil auditif
        assert!(is_field_required(FormField::Cote, &draft, &refs));
    }

    #[test]
    fn test_lateralite_is_shown_but_never_required() {
        let refs = refdata::sample();
        let mut draft = BeneficiaryDraft::default();
        draft.set_type_assistance(Some(7)); // Appareil auditif

        // The form surfaces the field for this type...
        let derived = evaluate(&draft, &refs);
        assert!(derived.requires_lateralite);
        // ...but submission never blocks on it.
        assert!(!is_field_required(FormField::Lateralite, &draft, &refs));
        assert!(!required_fields(&draft, &refs).contains(&FormField::Lateralite));
    }

    #[test]
    fn test_assistance_loan_derivation() {
        let refs = refdata::sample();
        let mut draft = AssistanceDraft::default();
        draft.set_nature_don(Some(2), &refs); // Prêt temporaire
        draft.set_date_assistance(Some(date(2024, 1, 15)), &refs);
        draft.set_duree_utilisation(Some(30), &refs);

        assert!(draft.is_pret(&refs));
        assert_eq!(draft.date_fin_prevue, Some(date(2024, 2, 14)));
    }

    #[test]
    fn test_switch_to_non_loan_clears_loan_fields() {
        let refs = refdata::sample();
        let mut draft = AssistanceDraft::default();
        draft.set_nature_don(Some(2), &refs);
        draft.set_date_assistance(Some(date(2024, 1, 15)), &refs);
        draft.set_duree_utilisation(Some(30), &refs);
        assert!(draft.date_fin_prevue.is_some());

        draft.set_nature_don(Some(1), &refs); // Don définitif
        assert_eq!(draft.duree_utilisation, None);
        assert_eq!(draft.date_fin_prevue, None);
    }

    #[test]
    fn test_heuristic_nature_without_flag_counts_as_loan() {
        let refs = refdata::sample();
        let mut draft = AssistanceDraft::default();
        draft.set_nature_don(Some(3), &refs); // "Pour une durée déterminée", no flag
        assert!(draft.is_pret(&refs));
    }
}

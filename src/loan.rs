//! Loan classification and expected-return-date arithmetic for medical
//! equipment assistance.

use chrono::{Duration, NaiveDate};

use crate::refdata::NatureDon;

/// Label fragments that mark a nature of donation as a loan.
const LOAN_MARKERS: [&str; 3] = ["prêt", "pret", "durée"];

/// Whether a nature-of-donation label reads as a loan.
///
/// A substring heuristic over free text, kept for backends whose
/// dictionaries predate the explicit flag. A mislabeled dictionary entry
/// silently changes form behavior, which is why [`is_loan`] prefers the
/// flag when present.
pub fn label_reads_as_loan(libelle: &str) -> bool {
    let lower = libelle.to_lowercase();
    LOAN_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a nature of donation. The explicit `is_loan` flag is
/// authoritative; the label heuristic is the fallback.
pub fn is_loan(nature: &NatureDon) -> bool {
    match nature.is_loan {
        Some(flag) => flag,
        None => label_reads_as_loan(&nature.libelle),
    }
}

/// Expected return date for a loan: assistance date plus usage duration.
///
/// Calendar-day addition, no business-day logic. Returns `None` unless the
/// record is a loan and both the assistance date and a positive duration
/// are present.
pub fn date_fin_prevue(
    loan: bool,
    date_assistance: Option<NaiveDate>,
    duree_utilisation: Option<i64>,
) -> Option<NaiveDate> {
    if !loan {
        return None;
    }
    let date = date_assistance?;
    let duree = duree_utilisation.filter(|d| *d > 0)?;
    date.checked_add_signed(Duration::days(duree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nature(libelle: &str, is_loan: Option<bool>) -> NatureDon {
        NatureDon {
            id: 1,
            libelle: libelle.to_string(),
            is_loan,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_label_heuristic() {
        assert!(label_reads_as_loan("Prêt temporaire"));
        assert!(label_reads_as_loan("pret de materiel"));
        assert!(label_reads_as_loan("Pour une durée déterminée"));
        assert!(!label_reads_as_loan("Don définitif"));
    }

    #[test]
    fn test_explicit_flag_overrides_label() {
        // Label says loan, flag says no: flag wins.
        assert!(!is_loan(&nature("Prêt spécial", Some(false))));
        assert!(is_loan(&nature("Don longue durée?", Some(true))));
    }

    #[test]
    fn test_flag_absent_falls_back_to_label() {
        assert!(is_loan(&nature("Prêt temporaire", None)));
        assert!(!is_loan(&nature("Don définitif", None)));
    }

    #[test]
    fn test_return_date_arithmetic() {
        let result = date_fin_prevue(true, Some(date(2024, 1, 15)), Some(30));
        assert_eq!(result, Some(date(2024, 2, 14)));
    }

    #[test]
    fn test_no_return_date_for_non_loan() {
        assert_eq!(date_fin_prevue(false, Some(date(2024, 1, 15)), Some(30)), None);
    }

    #[test]
    fn test_no_return_date_without_inputs() {
        assert_eq!(date_fin_prevue(true, None, Some(30)), None);
        assert_eq!(date_fin_prevue(true, Some(date(2024, 1, 15)), None), None);
        assert_eq!(date_fin_prevue(true, Some(date(2024, 1, 15)), Some(0)), None);
        assert_eq!(date_fin_prevue(true, Some(date(2024, 1, 15)), Some(-5)), None);
    }
}
